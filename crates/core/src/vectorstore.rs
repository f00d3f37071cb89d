//! Vector store adapter (C10): a remote HTTP client speaking the Chroma-like
//! contract in `serde_json`, with an automatic fallback to a flat-file local
//! store when the remote is unreachable — no example in this pack carries a
//! dedicated vector-database client crate, so both sides are hand-built here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{Result, VectorStoreError};
use crate::types::{CollectionRecord, EmbeddedChunk, Point};

/// Replaces any character outside `[A-Za-z0-9._-]` with `_`, ensures the
/// first/last characters are alphanumeric, and truncates to 63 characters —
/// the exact rule the original's `sanitize_collection_name` applies so
/// ChromaDB (and this crate's local fallback) accept the name.
pub fn sanitize_collection_name(name: &str) -> String {
    if name.is_empty() {
        return "default_collection".to_string();
    }

    let mut sanitized: String =
        name.chars().map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' }).collect();

    if let Some(first) = sanitized.chars().next() {
        if !first.is_alphanumeric() {
            sanitized = format!("c{sanitized}");
        }
    }
    if let Some(last) = sanitized.chars().last() {
        if !last.is_alphanumeric() {
            sanitized.push('0');
        }
    }

    if sanitized.is_empty() {
        "default_collection".to_string()
    } else {
        sanitized.chars().take(63).collect()
    }
}

/// Scalar-only metadata map a vector store accepts; lists/objects are
/// serialized to JSON strings, matching `_sanitize_metadata`.
fn sanitize_metadata(metadata: serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
    let mut out = serde_json::Map::new();
    for (key, value) in metadata {
        let clean_key = key.replace(['.', ' '], "_");
        let clean_value = match &value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => value,
            Value::Null => Value::String(String::new()),
            other => Value::String(other.to_string()),
        };
        out.insert(clean_key, clean_value);
    }
    out
}

/// Builds the stored point for one embedded chunk: metadata is every Chunk
/// field except `content` and `enriched_content` (both excluded from
/// metadata — the original only excludes `embedding`+`enriched_content` and
/// keeps `content`, but this crate is explicit that `content` stays out of
/// metadata too, since it's already the point's `document`).
fn to_point(embedded: &EmbeddedChunk) -> Result<Point> {
    let chunk_json = serde_json::to_value(&embedded.chunk)
        .map_err(|e| VectorStoreError::Operation { operation: "prepare", collection: String::new(), detail: e.to_string() })?;
    let mut metadata = match chunk_json {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    metadata.remove("content");
    metadata.remove("enriched_content");
    metadata.insert("embedding_model".to_string(), json!(embedded.embedding_model));

    Ok(Point {
        id: embedded.chunk.id.clone(),
        vector: embedded.embedding.clone(),
        metadata: sanitize_metadata(metadata),
        document: embedded.chunk.content.clone(),
    })
}

/// Which backend an adapter is actually using, surfaced in stats the way the
/// original reports `using_server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Remote,
    Local,
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub stored_count: usize,
    pub failed_batches: usize,
    pub collection_count: usize,
    pub backend: Backend,
}

/// A remote-or-local vector store for one repository's collection.
pub struct VectorStore {
    backend: Backend,
    remote: Option<RemoteClient>,
    local_dir: PathBuf,
}

impl VectorStore {
    /// Heartbeats the remote if configured; falls back to the local on-disk
    /// store on any failure, matching `_initialize_client`'s try-then-fallback.
    pub async fn connect(use_remote: bool, server_url: &str, auth_token: Option<&str>, local_dir: PathBuf) -> Self {
        if use_remote {
            let remote = RemoteClient::new(server_url, auth_token);
            match remote.heartbeat().await {
                Ok(()) => {
                    info!(server_url, "connected to remote vector store");
                    return VectorStore { backend: Backend::Remote, remote: Some(remote), local_dir };
                }
                Err(err) => warn!(server_url, error = %err, "remote vector store unreachable, falling back to local"),
            }
        }
        let _ = std::fs::create_dir_all(&local_dir);
        VectorStore { backend: Backend::Local, remote: None, local_dir }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Upserts embedded chunks into `collection_name`, batching by
    /// `batch_size`. A batch that fails is skipped; the call only fails if
    /// every batch failed. If `clear_existing`, the collection is recreated
    /// empty first.
    pub async fn store_embeddings(
        &self,
        embedded: &[EmbeddedChunk],
        collection_name: &str,
        batch_size: usize,
        clear_existing: bool,
    ) -> Result<StoreStats> {
        let safe_name = sanitize_collection_name(collection_name);
        if embedded.is_empty() {
            return Ok(StoreStats { stored_count: 0, failed_batches: 0, collection_count: 0, backend: self.backend });
        }

        if clear_existing {
            self.delete_collection(&safe_name).await.ok();
        }
        self.create_collection(&safe_name).await?;

        let mut stored = 0usize;
        let mut failed_batches = 0usize;
        for batch in embedded.chunks(batch_size.max(1)) {
            let points: Result<Vec<Point>> = batch.iter().map(to_point).collect();
            let points = match points {
                Ok(p) => p,
                Err(_) => {
                    failed_batches += 1;
                    continue;
                }
            };
            match self.add_points(&safe_name, &points).await {
                Ok(()) => stored += batch.len(),
                Err(err) => {
                    warn!(collection = safe_name, error = %err, "batch failed, skipping");
                    failed_batches += 1;
                }
            }
        }

        if stored == 0 {
            return Err(VectorStoreError::Operation {
                operation: "store",
                collection: safe_name,
                detail: "all batches failed, nothing stored".to_string(),
            }
            .into());
        }

        let collection_count = self.count(&safe_name).await.unwrap_or(stored);
        Ok(StoreStats { stored_count: stored, failed_batches, collection_count, backend: self.backend })
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        match &self.remote {
            Some(remote) => remote.create_collection(name).await,
            None => local::create_collection(&self.local_dir, name),
        }
    }

    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        let safe_name = sanitize_collection_name(name);
        match &self.remote {
            Some(remote) => remote.delete_collection(&safe_name).await,
            None => local::delete_collection(&self.local_dir, &safe_name),
        }
    }

    async fn add_points(&self, collection: &str, points: &[Point]) -> Result<()> {
        match &self.remote {
            Some(remote) => remote.add_points(collection, points).await,
            None => local::add_points(&self.local_dir, collection, points),
        }
    }

    pub async fn count(&self, collection: &str) -> Result<usize> {
        let safe_name = sanitize_collection_name(collection);
        match &self.remote {
            Some(remote) => remote.count(&safe_name).await,
            None => local::count(&self.local_dir, &safe_name),
        }
    }

    pub async fn get(&self, collection: &str, where_: Option<&HashMap<String, String>>) -> Result<Vec<Point>> {
        let safe_name = sanitize_collection_name(collection);
        match &self.remote {
            Some(remote) => remote.get(&safe_name, where_).await,
            None => local::get(&self.local_dir, &safe_name, where_),
        }
    }

    /// Cosine-similarity query over `query_embedding`, returning the
    /// `n_results` closest points with `where_` equality filters applied
    /// first (both backends filter the same way the original's adapters do
    /// when the store's own `where` support falls short of a given filter).
    pub async fn query(
        &self,
        collection: &str,
        query_embedding: &[f32],
        n_results: usize,
        where_: Option<&HashMap<String, String>>,
    ) -> Result<Vec<(Point, f32)>> {
        let safe_name = sanitize_collection_name(collection);
        let candidates = match &self.remote {
            Some(remote) => remote.get(&safe_name, where_).await?,
            None => local::get(&self.local_dir, &safe_name, where_)?,
        };

        let mut scored: Vec<(Point, f32)> =
            candidates.into_iter().map(|p| { let sim = cosine_similarity(query_embedding, &p.vector); (p, sim) }).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n_results);
        Ok(scored)
    }

    pub async fn collection_info(&self, collection: &str) -> Result<CollectionRecord> {
        let safe_name = sanitize_collection_name(collection);
        let count = self.count(&safe_name).await?;
        Ok(CollectionRecord { name: safe_name, description: None, count })
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionRecord>> {
        match &self.remote {
            Some(remote) => remote.list_collections().await,
            None => local::list_collections(&self.local_dir),
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn matches_where(point: &Point, where_: Option<&HashMap<String, String>>) -> bool {
    let Some(filters) = where_ else { return true };
    filters.iter().all(|(key, value)| point.metadata.get(key).map(|v| v.as_str() == Some(value)).unwrap_or(false))
}

// ---------------------------------------------------------------------------
// Remote: a Chroma-like HTTP API over reqwest.
// ---------------------------------------------------------------------------

struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl RemoteClient {
    fn new(base_url: &str, auth_token: Option<&str>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.trim_end_matches('/').to_string(), auth_token: auth_token.map(String::from) }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn heartbeat(&self) -> Result<()> {
        self.request(reqwest::Method::GET, "/api/v1/heartbeat")
            .send()
            .await
            .map_err(|e| VectorStoreError::Operation { operation: "heartbeat", collection: String::new(), detail: e.to_string() })?;
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        self.request(reqwest::Method::POST, "/api/v1/collections")
            .json(&json!({"name": name, "get_or_create": true}))
            .send()
            .await
            .map_err(|e| VectorStoreError::Operation { operation: "create_collection", collection: name.to_string(), detail: e.to_string() })?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.request(reqwest::Method::DELETE, &format!("/api/v1/collections/{name}"))
            .send()
            .await
            .map_err(|e| VectorStoreError::Operation { operation: "delete_collection", collection: name.to_string(), detail: e.to_string() })?;
        Ok(())
    }

    async fn add_points(&self, collection: &str, points: &[Point]) -> Result<()> {
        let ids: Vec<&str> = points.iter().map(|p| p.id.as_str()).collect();
        let embeddings: Vec<&[f32]> = points.iter().map(|p| p.vector.as_slice()).collect();
        let documents: Vec<&str> = points.iter().map(|p| p.document.as_str()).collect();
        let metadatas_owned: Vec<Value> = points.iter().map(|p| Value::Object(p.metadata.clone())).collect();

        let response = self
            .request(reqwest::Method::POST, &format!("/api/v1/collections/{collection}/add"))
            .json(&json!({"ids": ids, "embeddings": embeddings, "metadatas": metadatas_owned, "documents": documents}))
            .send()
            .await
            .map_err(|e| VectorStoreError::Operation { operation: "add", collection: collection.to_string(), detail: e.to_string() })?;

        if !response.status().is_success() {
            return Err(VectorStoreError::Operation {
                operation: "add",
                collection: collection.to_string(),
                detail: format!("status {}", response.status()),
            }
            .into());
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/v1/collections/{collection}/count"))
            .send()
            .await
            .map_err(|e| VectorStoreError::Operation { operation: "count", collection: collection.to_string(), detail: e.to_string() })?;
        response
            .json::<usize>()
            .await
            .map_err(|e| VectorStoreError::Operation { operation: "count", collection: collection.to_string(), detail: e.to_string() }.into())
    }

    async fn get(&self, collection: &str, where_: Option<&HashMap<String, String>>) -> Result<Vec<Point>> {
        let body = json!({"where": where_.cloned_or_null(), "include": ["documents", "metadatas", "embeddings"]});
        let response = self
            .request(reqwest::Method::POST, &format!("/api/v1/collections/{collection}/get"))
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorStoreError::Operation { operation: "get", collection: collection.to_string(), detail: e.to_string() })?;

        let parsed: GetResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::Operation { operation: "get", collection: collection.to_string(), detail: e.to_string() })?;
        Ok(parsed.into_points())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionRecord>> {
        let response = self
            .request(reqwest::Method::GET, "/api/v1/collections")
            .send()
            .await
            .map_err(|e| VectorStoreError::Operation { operation: "list_collections", collection: String::new(), detail: e.to_string() })?;
        let names: Vec<RemoteCollectionSummary> = response
            .json()
            .await
            .map_err(|e| VectorStoreError::Operation { operation: "list_collections", collection: String::new(), detail: e.to_string() })?;
        let mut out = Vec::new();
        for summary in names {
            let count = self.count(&summary.name).await.unwrap_or(0);
            out.push(CollectionRecord { name: summary.name, description: None, count });
        }
        Ok(out)
    }
}

trait OptionExt {
    fn cloned_or_null(self) -> Value;
}

impl OptionExt for Option<&HashMap<String, String>> {
    fn cloned_or_null(self) -> Value {
        match self {
            Some(map) => json!(map),
            None => Value::Null,
        }
    }
}

#[derive(Deserialize)]
struct RemoteCollectionSummary {
    name: String,
}

#[derive(Deserialize, Default)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Vec<String>,
    #[serde(default)]
    metadatas: Vec<serde_json::Map<String, Value>>,
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl GetResponse {
    fn into_points(self) -> Vec<Point> {
        let mut out = Vec::new();
        for i in 0..self.ids.len() {
            out.push(Point {
                id: self.ids[i].clone(),
                vector: self.embeddings.get(i).cloned().unwrap_or_default(),
                metadata: self.metadatas.get(i).cloned().unwrap_or_default(),
                document: self.documents.get(i).cloned().unwrap_or_default(),
            });
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Local fallback: flat-file JSON store with brute-force linear scan.
// ---------------------------------------------------------------------------

mod local {
    use super::*;

    #[derive(Serialize, Deserialize, Default)]
    struct LocalCollection {
        points: Vec<Point>,
    }

    fn collection_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.json"))
    }

    fn load(dir: &Path, name: &str) -> LocalCollection {
        let path = collection_path(dir, name);
        std::fs::read_to_string(path).ok().and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
    }

    fn save(dir: &Path, name: &str, collection: &LocalCollection) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|source| crate::error::FileSystemError::Io {
            operation: "create_dir",
            path: dir.to_path_buf(),
            source,
        })?;
        let path = collection_path(dir, name);
        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(collection).map_err(|e| VectorStoreError::Operation {
            operation: "save",
            collection: name.to_string(),
            detail: e.to_string(),
        })?;
        std::fs::write(&tmp_path, body).map_err(|source| crate::error::FileSystemError::Io {
            operation: "write",
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| crate::error::FileSystemError::Io {
            operation: "rename",
            path,
            source,
        })?;
        Ok(())
    }

    pub fn create_collection(dir: &Path, name: &str) -> Result<()> {
        if collection_path(dir, name).exists() {
            return Ok(());
        }
        save(dir, name, &LocalCollection::default())
    }

    pub fn delete_collection(dir: &Path, name: &str) -> Result<()> {
        let path = collection_path(dir, name);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|source| crate::error::FileSystemError::Io { operation: "remove", path, source })?;
        }
        Ok(())
    }

    pub fn add_points(dir: &Path, name: &str, points: &[Point]) -> Result<()> {
        let mut collection = load(dir, name);
        collection.points.extend(points.iter().cloned());
        save(dir, name, &collection)
    }

    pub fn count(dir: &Path, name: &str) -> Result<usize> {
        Ok(load(dir, name).points.len())
    }

    pub fn get(dir: &Path, name: &str, where_: Option<&HashMap<String, String>>) -> Result<Vec<Point>> {
        Ok(load(dir, name).points.into_iter().filter(|p| super::matches_where(p, where_)).collect())
    }

    pub fn list_collections(dir: &Path) -> Result<Vec<CollectionRecord>> {
        let mut out = Vec::new();
        let Ok(entries) = std::fs::read_dir(dir) else { return Ok(out) };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let count = count(dir, stem)?;
            out.push(CollectionRecord { name: stem.to_string(), description: None, count });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collection_name_replaces_invalid_chars() {
        assert_eq!(sanitize_collection_name("my repo/name"), "my_repo_name");
    }

    #[test]
    fn sanitize_collection_name_prefixes_when_first_char_not_alnum() {
        let sanitized = sanitize_collection_name("_leading");
        assert!(sanitized.chars().next().unwrap().is_alphanumeric());
    }

    #[test]
    fn sanitize_collection_name_suffixes_when_last_char_not_alnum() {
        let sanitized = sanitize_collection_name("trailing_");
        assert!(sanitized.chars().last().unwrap().is_alphanumeric());
    }

    #[test]
    fn sanitize_collection_name_empty_becomes_default() {
        assert_eq!(sanitize_collection_name(""), "default_collection");
    }

    #[test]
    fn sanitize_collection_name_truncates_to_63_chars() {
        let long_name = "a".repeat(100);
        assert_eq!(sanitize_collection_name(&long_name).len(), 63);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[tokio::test]
    async fn local_store_round_trips_points() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::connect(false, "http://unused", None, dir.path().to_path_buf()).await;
        assert_eq!(store.backend(), Backend::Local);

        let embedded = EmbeddedChunk {
            chunk: crate::types::Chunk {
                id: "a".into(),
                content: "fn f() {}".into(),
                enriched_content: "fn f() {}".into(),
                file_path: "x.rs".into(),
                language: "rust".into(),
                node_type: "function_item".into(),
                node_name: "f".into(),
                start_line: 1,
                end_line: 1,
                start_byte: 0,
                end_byte: 9,
                hash: "h".into(),
                parent_id: None,
                parent_type: None,
                parent_name: None,
                children_ids: vec![],
                is_parent: false,
                locations: vec![],
                is_split: false,
                split_index: None,
                original_id: None,
                original_hash: None,
                token_count: None,
            },
            embedding: vec![1.0, 0.0, 0.0],
            embedding_model: "test-model".into(),
            original_index: 0,
        };

        let stats = store.store_embeddings(&[embedded], "my-repo", 100, true).await.unwrap();
        assert_eq!(stats.stored_count, 1);

        let results = store.query("my-repo", &[1.0, 0.0, 0.0], 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1 > 0.99);
    }
}
