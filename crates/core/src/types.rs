//! The chunk model: raw extracted nodes, persisted chunks, and embedded chunks.
//!
//! See [`crate::collector`], [`crate::splitter`], and [`crate::embedding`] for the
//! stages that produce and transform these types.

use serde::{Deserialize, Serialize};

/// A file discovered by [`crate::discovery`], before parsing.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub abs_path: std::path::PathBuf,
    /// Forward-slash normalized, relative to the repo root.
    pub rel_path: String,
    pub language: String,
}

/// One cell of a notebook-style file, classified by [`crate::notebook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

impl CellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Code => "code",
            CellType::Markdown => "markdown",
            CellType::Raw => "raw",
        }
    }
}

/// Output of the AST extractor (C4): a semantic unit with byte/line spans and
/// parent linkage, still living only inside a single parse.
#[derive(Debug, Clone)]
pub struct RawNode {
    pub id: String,
    pub node_type: String,
    pub name: String,
    pub content: String,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub parent_id: Option<String>,
    pub parent_type: Option<String>,
    pub parent_name: Option<String>,
    pub children_ids: Vec<String>,
    pub is_parent: bool,
    pub language: String,
    pub cell_index: Option<usize>,
    pub cell_type: Option<CellType>,
}

impl RawNode {
    /// `"file:start-end"`, used both as the collector's first-seen location and
    /// as a duplicate-location entry.
    pub fn location(&self, file_path: &str) -> String {
        format!("{file_path}:{}-{}", self.start_line, self.end_line)
    }
}

/// A persistent semantic unit: the record stored in the vector store and on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub enriched_content: String,
    pub file_path: String,
    pub language: String,
    pub node_type: String,
    pub node_name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
    #[serde(default)]
    pub is_parent: bool,
    pub locations: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_split: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Chunk {
    /// True if `other` fully contains this chunk's byte range in the same
    /// file — used by `read-file` (C13) to drop redundant split overlap.
    pub fn contained_in(&self, other: &Chunk) -> bool {
        self.file_path == other.file_path
            && other.start_byte <= self.start_byte
            && self.end_byte <= other.end_byte
            && other.id != self.id
    }
}

/// A [`Chunk`] plus the vector produced by the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub embedding_model: String,
    pub original_index: usize,
}

/// A point as stored by the vector store adapter (C10): id + vector + scalar
/// metadata + the human-readable document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub document: String,
}

/// Metadata record for a vector-store collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub count: usize,
}

/// Per-repo ingestion statistics, surfaced by the orchestrator (C11).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub files_ok: usize,
    pub files_failed: usize,
    pub unique_chunks: usize,
    pub duplicates: usize,
    pub split_chunks: usize,
}

/// Validate and canonicalize a repo-relative path, rejecting traversal attacks
/// and paths that escape the root. Used by `read-file` (C13) and `structure` (C13).
pub fn validate_path(
    root: &std::path::Path,
    rel_path: &str,
) -> Result<std::path::PathBuf, &'static str> {
    if rel_path.is_empty() || rel_path.contains("..") || rel_path.starts_with('/') {
        return Err("invalid path");
    }
    let full = root.join(rel_path);
    let canonical = full.canonicalize().map_err(|_| "file not found")?;
    let root_canonical = root.canonicalize().map_err(|_| "root not found")?;
    if !canonical.starts_with(&root_canonical) {
        return Err("path traversal detected");
    }
    Ok(canonical)
}
