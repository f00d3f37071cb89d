//! Error taxonomy (C15): one `thiserror` enum per failure category, aggregated
//! into [`ContextinatorError`] at component boundaries.

use std::path::PathBuf;
use thiserror::Error;

/// Missing env var or invalid constant.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("[CONFIG] missing required setting: {0}")]
    Missing(&'static str),
    #[error("[CONFIG] invalid value for {key}: {detail}")]
    Invalid { key: &'static str, detail: String },
}

/// Invalid input at a component boundary.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("[VALIDATE] {0}")]
    InvalidInput(String),
}

/// Read/write/clone/scan failure.
#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("[FS] {operation} failed for {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("[FS] git clone failed for {url}: {detail}")]
    Clone { url: String, detail: String },
    #[error("[FS] git clone timed out after {seconds}s for {url}")]
    CloneTimeout { url: String, seconds: u64 },
}

/// AST parse failure after all fallback tiers are exhausted.
#[derive(Debug, Error)]
pub enum ParsingError {
    #[error("[PARSE] {path}: {detail}")]
    Failed { path: PathBuf, detail: String },
}

/// Embedding provider failure after retries.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("[EMBED] provider request failed: {detail}")]
    Provider { detail: String },
    #[error("[EMBED] batch exhausted retries: {detail}")]
    RetriesExhausted { detail: String },
    #[error("[EMBED] no embeddings produced")]
    EmptyOutput,
}

/// Vector store operation failure.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("[VSTORE] {operation} failed for collection {collection}: {detail}")]
    Operation {
        operation: &'static str,
        collection: String,
        detail: String,
    },
}

/// Search query failure.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("[SEARCH] {0}")]
    Failed(String),
}

/// Top-level aggregating error, returned by every public fallible function at
/// a crate boundary (orchestrator, search API, CLI).
#[derive(Debug, Error)]
pub enum ContextinatorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),
    #[error(transparent)]
    Parsing(#[from] ParsingError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),
    #[error(transparent)]
    Search(#[from] SearchError),
}

impl ContextinatorError {
    /// Short bracketed code prefix, e.g. `[EMBED]`, for log lines and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            ContextinatorError::Configuration(_) => "CONFIG",
            ContextinatorError::Validation(_) => "VALIDATE",
            ContextinatorError::FileSystem(_) => "FS",
            ContextinatorError::Parsing(_) => "PARSE",
            ContextinatorError::Embedding(_) => "EMBED",
            ContextinatorError::VectorStore(_) => "VSTORE",
            ContextinatorError::Search(_) => "SEARCH",
        }
    }
}

pub type Result<T> = std::result::Result<T, ContextinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_category() {
        let e: ContextinatorError = ConfigurationError::Missing("OPENAI_API_KEY").into();
        assert_eq!(e.code(), "CONFIG");
        let e: ContextinatorError = EmbeddingError::EmptyOutput.into();
        assert_eq!(e.code(), "EMBED");
    }

    #[test]
    fn display_includes_code_prefix() {
        let e = ConfigurationError::Missing("OPENAI_API_KEY");
        assert!(e.to_string().starts_with("[CONFIG]"));
    }
}
