//! Ingestion orchestrator (C11): drives a single repository (or a batch of
//! them) through clone → discover → parse+extract → collect → split → embed
//! → upsert, the way the teacher's `git.rs` opens a [`git2::Repository`] for
//! its own commands — here extended to cloning one, with bounded concurrency
//! over both per-repo parsing and the whole batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::collector::NodeCollector;
use crate::config::Config;
use crate::embedding::{embed_async, EmbeddingClient};
use crate::error::{ContextinatorError, FileSystemError, ParsingError, Result};
use crate::notebook::parse_notebook;
use crate::parser::parse_file;
use crate::splitter::split_chunk;
use crate::types::{Chunk, EmbeddedChunk, IngestStats};
use crate::vectorstore::{sanitize_collection_name, VectorStore};

const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// Where a single repo's source actually lives once discovery can run: a
/// path the caller owns, or one this orchestrator cloned and must clean up.
enum RepoSource {
    Existing(PathBuf),
    Cloned { path: PathBuf },
}

impl RepoSource {
    fn path(&self) -> &Path {
        match self {
            RepoSource::Existing(p) => p,
            RepoSource::Cloned { path } => path,
        }
    }
}

/// Options controlling one repo's pipeline run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub max_concurrent_embeddings: usize,
    pub clear_existing: bool,
    pub clone_timeout: Duration,
    /// Delete a cloned repo's temp directory once the pipeline finishes.
    pub cleanup_clone: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_concurrent_embeddings: 5,
            clear_existing: false,
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
            cleanup_clone: true,
        }
    }
}

/// Outcome of ingesting one repository.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub repository: String,
    pub collection_name: String,
    pub stats: IngestStats,
    pub stored_count: usize,
}

/// True if `repo_url_or_path` looks like something `git clone` can fetch
/// rather than a path already on disk.
fn is_remote_url(repo_url_or_path: &str) -> bool {
    repo_url_or_path.starts_with("http://")
        || repo_url_or_path.starts_with("https://")
        || repo_url_or_path.starts_with("git@")
        || repo_url_or_path.starts_with("ssh://")
}

/// Shallow-clones `url` (depth 1) into a fresh temp directory, bounded by
/// `timeout`. Deletes the partial directory on timeout or clone failure.
async fn shallow_clone(url: &str, timeout: Duration) -> Result<PathBuf> {
    let dest = std::env::temp_dir().join(format!("contextinator-clone-{}", uuid::Uuid::new_v4()));
    let dest_for_clone = dest.clone();
    let url_owned = url.to_string();

    let clone_task = tokio::task::spawn_blocking(move || -> Result<()> {
        let mut fetch_opts = git2::FetchOptions::new();
        fetch_opts.depth(1);
        git2::build::RepoBuilder::new()
            .fetch_options(fetch_opts)
            .clone(&url_owned, &dest_for_clone)
            .map_err(|e| FileSystemError::Clone { url: url_owned.clone(), detail: e.to_string() })?;
        Ok(())
    });

    match tokio::time::timeout(timeout, clone_task).await {
        Ok(Ok(Ok(()))) => Ok(dest),
        Ok(Ok(Err(err))) => {
            cleanup_dir(&dest);
            Err(err)
        }
        Ok(Err(join_err)) => {
            cleanup_dir(&dest);
            Err(FileSystemError::Clone { url: url.to_string(), detail: join_err.to_string() }.into())
        }
        Err(_) => {
            cleanup_dir(&dest);
            Err(FileSystemError::CloneTimeout { url: url.to_string(), seconds: timeout.as_secs() }.into())
        }
    }
}

fn cleanup_dir(path: &Path) {
    if path.exists() {
        if let Err(err) = std::fs::remove_dir_all(path) {
            warn!(path = %path.display(), error = %err, "failed to clean up temp directory");
        }
    }
}

/// Parses and extracts every discovered file into deduplicated, split
/// [`Chunk`]s, isolating per-file failures (logged and skipped) so one bad
/// file never aborts the whole repo.
///
/// Per §5: CPU-bound parsing is pooled across available cores (rayon, the
/// way the teacher's `scan.rs` parallelizes file processing) while the
/// Node Collector stays a single-writer stream over the parsed results, in
/// discovery order, so dedup's first-seen-wins rule stays deterministic.
fn parse_and_collect(root: &Path, config: &Config) -> Result<(Vec<Chunk>, IngestStats)> {
    let files = crate::discovery::discover(root, &[]);

    let parsed: Vec<(&crate::types::FileRecord, Result<Vec<crate::types::RawNode>>)> = files
        .par_iter()
        .map(|file| {
            let result = if file.language == "notebook" {
                std::fs::read(&file.abs_path)
                    .map_err(|e| {
                        ContextinatorError::from(FileSystemError::Io {
                            operation: "read",
                            path: file.abs_path.clone(),
                            source: e,
                        })
                    })
                    .map(|bytes| {
                        let content = String::from_utf8_lossy(&bytes).into_owned();
                        parse_notebook(&content, &file.rel_path).nodes
                    })
            } else {
                parse_file(&file.abs_path, &file.rel_path, &file.language).map(|r| r.nodes)
            };
            (file, result)
        })
        .collect();

    let mut collector = NodeCollector::new();
    let mut stats = IngestStats::default();
    let mut collected = Vec::new();

    for (file, result) in parsed {
        match result {
            Ok(nodes) => {
                stats.files_ok += 1;
                let chunks = collector.collect_nodes(&file.rel_path, &file.language, &nodes);
                collected.extend(chunks);
            }
            Err(err) => {
                stats.files_failed += 1;
                warn!(path = file.rel_path, error = %err, "skipping file after parse failure");
            }
        }
    }

    stats.unique_chunks = collected.len();
    stats.duplicates = collector.duplicate_count();

    let mut split_chunks = Vec::new();
    for chunk in collected {
        let before_split = split_chunk(chunk, config.max_tokens, config.chunk_overlap)?;
        if before_split.len() > 1 {
            stats.split_chunks += before_split.len();
        }
        split_chunks.extend(before_split);
    }

    Ok((split_chunks, stats))
}

/// Runs only discover → parse+extract → collect → split for one repo, for
/// the `chunk`-only CLI path that never needs an API key or vector store.
pub async fn chunk_repo(
    repo_url_or_path: &str,
    config: &Config,
    opts: &IngestOptions,
) -> Result<(Vec<Chunk>, IngestStats)> {
    let source = if is_remote_url(repo_url_or_path) {
        let path = shallow_clone(repo_url_or_path, opts.clone_timeout).await?;
        RepoSource::Cloned { path }
    } else {
        RepoSource::Existing(PathBuf::from(repo_url_or_path))
    };

    let root_owned = source.path().to_path_buf();
    let root_for_error = root_owned.clone();
    let config_clone = config.clone();
    let result = match tokio::task::spawn_blocking(move || parse_and_collect(&root_owned, &config_clone)).await {
        Ok(inner) => inner,
        Err(e) => Err(ParsingError::Failed { path: root_for_error, detail: e.to_string() }.into()),
    };

    if opts.cleanup_clone {
        if let RepoSource::Cloned { path } = &source {
            cleanup_dir(path);
        }
    }

    result
}

/// Runs the full single-repo pipeline: clone (if `repo_url_or_path` is a
/// URL), discover, parse+extract, collect, split, embed, upsert.
pub async fn process_repo(
    repo_url_or_path: &str,
    collection_name: &str,
    config: &Config,
    opts: &IngestOptions,
) -> Result<IngestReport> {
    let source = if is_remote_url(repo_url_or_path) {
        let path = shallow_clone(repo_url_or_path, opts.clone_timeout).await?;
        RepoSource::Cloned { path }
    } else {
        RepoSource::Existing(PathBuf::from(repo_url_or_path))
    };

    let result = run_pipeline(source.path(), collection_name, config, opts).await;

    if opts.cleanup_clone {
        if let RepoSource::Cloned { path } = &source {
            cleanup_dir(path);
        }
    }

    result
}

async fn run_pipeline(
    root: &Path,
    collection_name: &str,
    config: &Config,
    opts: &IngestOptions,
) -> Result<IngestReport> {
    let root_owned = root.to_path_buf();
    let root_for_error = root.to_path_buf();
    let config_clone = config.clone();
    let (chunks, stats) = match tokio::task::spawn_blocking(move || parse_and_collect(&root_owned, &config_clone)).await
    {
        Ok(inner) => inner?,
        Err(e) => return Err(ParsingError::Failed { path: root_for_error, detail: e.to_string() }.into()),
    };

    info!(
        files_ok = stats.files_ok,
        files_failed = stats.files_failed,
        unique_chunks = stats.unique_chunks,
        duplicates = stats.duplicates,
        split_chunks = stats.split_chunks,
        "parsed repository"
    );

    let api_key = config.require_api_key()?.to_string();
    let client = EmbeddingClient::new(api_key, config.openai_embedding_model.clone());
    let embedded: Vec<EmbeddedChunk> = embed_async(
        &client,
        &chunks,
        config.openai_max_tokens,
        config.embedding_batch_size,
        opts.max_concurrent_embeddings,
    )
    .await?;

    let safe_name = sanitize_collection_name(collection_name);
    let store = VectorStore::connect(
        config.use_chroma_server,
        &config.chroma_server_url,
        config.chroma_server_auth_token.as_deref(),
        config.chromadb_dir(&safe_name),
    )
    .await;

    let store_stats = store
        .store_embeddings(&embedded, &safe_name, config.chroma_batch_size, opts.clear_existing)
        .await?;

    Ok(IngestReport {
        repository: collection_name.to_string(),
        collection_name: safe_name,
        stats,
        stored_count: store_stats.stored_count,
    })
}

/// One repo's entry in a batch run: the url/path plus the collection it
/// should land in.
#[derive(Debug, Clone)]
pub struct BatchRepo {
    pub repo_url_or_path: String,
    pub collection_name: String,
}

/// Result of one repo within a batch: `Ok` on success, `Err` carrying the
/// repo's own error without aborting its peers.
pub type BatchOutcome = (BatchRepo, std::result::Result<IngestReport, ContextinatorError>);

/// Runs [`process_repo`] for every entry in `repos` concurrently, bounded by
/// `max_concurrent` permits. Each repo's failure is captured independently;
/// the batch itself never fails.
pub async fn process_batch(
    repos: Vec<BatchRepo>,
    max_concurrent: usize,
    config: Arc<Config>,
    opts: Arc<IngestOptions>,
) -> Vec<BatchOutcome> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let tasks = repos.into_iter().map(|repo| {
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        let opts = Arc::clone(&opts);
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore is never closed");
            let result = process_repo(&repo.repo_url_or_path, &repo.collection_name, &config, &opts).await;
            (repo, result)
        }
    });

    futures::future::join_all(tasks).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_remote_url_detects_common_schemes() {
        assert!(is_remote_url("https://github.com/foo/bar.git"));
        assert!(is_remote_url("git@github.com:foo/bar.git"));
        assert!(!is_remote_url("/local/path/to/repo"));
        assert!(!is_remote_url("relative/repo"));
    }

    #[test]
    fn ingest_options_defaults_are_sane() {
        let opts = IngestOptions::default();
        assert_eq!(opts.max_concurrent_embeddings, 5);
        assert!(opts.cleanup_clone);
        assert_eq!(opts.clone_timeout, DEFAULT_CLONE_TIMEOUT);
    }

    #[test]
    fn parse_and_collect_handles_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (chunks, stats) = parse_and_collect(dir.path(), &config).unwrap();
        assert!(chunks.is_empty());
        assert_eq!(stats.files_ok, 0);
        assert_eq!(stats.files_failed, 0);
    }

    #[test]
    fn parse_and_collect_extracts_chunks_from_a_rust_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        let config = Config::default();
        let (chunks, stats) = parse_and_collect(dir.path(), &config).unwrap();
        assert_eq!(stats.files_ok, 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].node_name, "main");
    }

    #[test]
    fn parse_and_collect_rejects_overlap_not_less_than_max_tokens() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}\n").unwrap();
        let config = Config { chunk_overlap: 512, max_tokens: 512, ..Config::default() };
        assert!(parse_and_collect(dir.path(), &config).is_err());
    }
}
