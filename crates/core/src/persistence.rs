//! On-disk manifests (C12): atomic JSON read/write for the per-repo chunk and
//! embedding files under `.contextinator/`, matching the original's
//! write-temp-then-rename save discipline so a crash never leaves a half
//! written manifest behind.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FileSystemError, Result};
use crate::types::{Chunk, EmbeddedChunk, IngestStats};

/// Declares that parent/child linkage was tracked and names the Chunk fields
/// carrying it, so a downstream reader can tell a legacy flat manifest (no
/// hierarchy) from one produced by this pipeline without inspecting chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSchema {
    pub parent_child_enabled: bool,
    pub hierarchy_fields: Vec<String>,
}

impl Default for ManifestSchema {
    fn default() -> Self {
        Self {
            parent_child_enabled: true,
            hierarchy_fields: vec![
                "parent_id".to_string(),
                "parent_type".to_string(),
                "parent_name".to_string(),
                "children_ids".to_string(),
                "is_parent".to_string(),
            ],
        }
    }
}

/// `chunks.json`'s shape. Older manifests were a bare JSON array; `chunks`
/// tolerates that via [`read_chunks_manifest`]'s fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunksManifest {
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub statistics: IngestStats,
    pub repository: String,
    pub version: u32,
    pub total_chunks: usize,
    #[serde(default)]
    pub schema: ManifestSchema,
}

/// `embeddings.json`'s shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsManifest {
    pub embeddings: Vec<EmbeddedChunk>,
    pub model: String,
    pub total_chunks: usize,
    pub repository: String,
    pub version: u32,
}

const MANIFEST_VERSION: u32 = 1;

/// Writes `body` to `path` by first writing to a sibling `.tmp` file and
/// renaming it over the target, so readers never observe a partial write.
fn write_atomic(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| FileSystemError::Io {
            operation: "create_dir",
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, body).map_err(|source| FileSystemError::Io {
        operation: "write",
        path: tmp_path.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| FileSystemError::Io {
        operation: "rename",
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn manifest_error(path: &Path, detail: impl std::fmt::Display) -> crate::error::ContextinatorError {
    FileSystemError::Io {
        operation: "parse_manifest",
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, detail.to_string()),
    }
    .into()
}

pub fn write_chunks_manifest(path: &Path, chunks: &[Chunk], statistics: &IngestStats, repository: &str) -> Result<()> {
    let manifest = ChunksManifest {
        chunks: chunks.to_vec(),
        statistics: statistics.clone(),
        repository: repository.to_string(),
        version: MANIFEST_VERSION,
        total_chunks: chunks.len(),
        schema: ManifestSchema::default(),
    };
    let body = serde_json::to_string_pretty(&manifest).map_err(|e| manifest_error(path, e))?;
    write_atomic(path, &body)
}

/// Reads `chunks.json`, tolerating the legacy bare-array format (no wrapper
/// object, no `repository`/`total_chunks`/`schema`) some earlier manifests used.
pub fn read_chunks_manifest(path: &Path) -> Result<ChunksManifest> {
    let body = std::fs::read_to_string(path).map_err(|source| FileSystemError::Io {
        operation: "read",
        path: path.to_path_buf(),
        source,
    })?;

    if let Ok(manifest) = serde_json::from_str::<ChunksManifest>(&body) {
        return Ok(manifest);
    }
    if let Ok(chunks) = serde_json::from_str::<Vec<Chunk>>(&body) {
        return Ok(ChunksManifest {
            total_chunks: chunks.len(),
            chunks,
            statistics: IngestStats::default(),
            repository: String::new(),
            version: 0,
            schema: ManifestSchema::default(),
        });
    }
    Err(manifest_error(path, "not a recognized chunks manifest"))
}

pub fn write_embeddings_manifest(
    path: &Path,
    embeddings: &[EmbeddedChunk],
    model: &str,
    repository: &str,
) -> Result<()> {
    let manifest = EmbeddingsManifest {
        embeddings: embeddings.to_vec(),
        model: model.to_string(),
        total_chunks: embeddings.len(),
        repository: repository.to_string(),
        version: MANIFEST_VERSION,
    };
    let body = serde_json::to_string_pretty(&manifest).map_err(|e| manifest_error(path, e))?;
    write_atomic(path, &body)
}

pub fn read_embeddings_manifest(path: &Path) -> Result<EmbeddingsManifest> {
    let body = std::fs::read_to_string(path).map_err(|source| FileSystemError::Io {
        operation: "read",
        path: path.to_path_buf(),
        source,
    })?;

    if let Ok(manifest) = serde_json::from_str::<EmbeddingsManifest>(&body) {
        return Ok(manifest);
    }
    if let Ok(embeddings) = serde_json::from_str::<Vec<EmbeddedChunk>>(&body) {
        return Ok(EmbeddingsManifest {
            total_chunks: embeddings.len(),
            embeddings,
            model: String::new(),
            repository: String::new(),
            version: 0,
        });
    }
    Err(manifest_error(path, "not a recognized embeddings manifest"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(id: &str) -> Chunk {
        Chunk {
            id: id.into(),
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
        }
    }

    #[test]
    fn chunks_manifest_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks.json");
        let stats = IngestStats { unique_chunks: 2, ..IngestStats::default() };
        write_chunks_manifest(&path, &[chunk("a"), chunk("b")], &stats, "my-repo").unwrap();
        let manifest = read_chunks_manifest(&path).unwrap();
        assert_eq!(manifest.chunks.len(), 2);
        assert_eq!(manifest.repository, "my-repo");
        assert_eq!(manifest.total_chunks, 2);
        assert_eq!(manifest.statistics.unique_chunks, 2);
        assert!(manifest.schema.parent_child_enabled);
        assert_eq!(manifest.version, MANIFEST_VERSION);
    }

    #[test]
    fn chunks_manifest_reads_legacy_bare_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks.json");
        std::fs::write(&path, serde_json::to_string(&vec![chunk("a")]).unwrap()).unwrap();
        let manifest = read_chunks_manifest(&path).unwrap();
        assert_eq!(manifest.chunks.len(), 1);
        assert_eq!(manifest.repository, "");
    }

    #[test]
    fn write_atomic_leaves_no_tmp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks.json");
        write_chunks_manifest(&path, &[chunk("a")], &IngestStats::default(), "repo").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn embeddings_manifest_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        let embedded = EmbeddedChunk {
            chunk: chunk("a"),
            embedding: vec![0.1, 0.2],
            embedding_model: "text-embedding-3-large".into(),
            original_index: 0,
        };
        write_embeddings_manifest(&path, &[embedded], "text-embedding-3-large", "my-repo").unwrap();
        let manifest = read_embeddings_manifest(&path).unwrap();
        assert_eq!(manifest.embeddings.len(), 1);
        assert_eq!(manifest.model, "text-embedding-3-large");
        assert_eq!(manifest.version, MANIFEST_VERSION);
    }
}
