//! Runtime configuration (C14): resolved once at startup from `.env` + environment,
//! matching the teacher's `main.rs` style of settling flags/env before dispatch.

use std::path::PathBuf;

use crate::error::{ConfigurationError, Result};

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";
const DEFAULT_CHROMA_URL: &str = "http://localhost:8000";

/// Process-wide settings for the ingestion pipeline and search API.
///
/// `openai_api_key` is intentionally not validated here — a `chunk`-only run
/// never touches the embedding provider and should not fail for lacking one.
/// C9 validates it lazily on first use.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub embedding_batch_size: usize,
    pub openai_embedding_model: String,
    pub openai_max_tokens: usize,
    pub chroma_server_url: String,
    pub chroma_server_auth_token: Option<String>,
    pub use_chroma_server: bool,
    pub chroma_batch_size: usize,
    pub max_tokens: usize,
    pub chunk_overlap: usize,
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            embedding_batch_size: 250,
            openai_embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            openai_max_tokens: 8191,
            chroma_server_url: DEFAULT_CHROMA_URL.to_string(),
            chroma_server_auth_token: None,
            use_chroma_server: true,
            chroma_batch_size: 100,
            max_tokens: 512,
            chunk_overlap: 50,
            base_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Loads `.env` (if present) via `dotenvy`, then reads environment variables
    /// over the defaults above. Never fails on a missing `OPENAI_API_KEY`.
    pub fn from_env(base_dir: PathBuf) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Config {
            base_dir,
            ..Config::default()
        };

        cfg.openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        if let Some(raw) = std::env::var("EMBEDDING_BATCH_SIZE").ok() {
            cfg.embedding_batch_size = parse_usize("EMBEDDING_BATCH_SIZE", &raw)?;
        }
        if let Ok(raw) = std::env::var("OPENAI_EMBEDDING_MODEL") {
            cfg.openai_embedding_model = raw;
        }
        if let Some(raw) = std::env::var("OPENAI_MAX_TOKENS").ok() {
            cfg.openai_max_tokens = parse_usize("OPENAI_MAX_TOKENS", &raw)?;
        }
        if let Ok(raw) = std::env::var("CHROMA_SERVER_URL") {
            cfg.chroma_server_url = raw;
        }
        cfg.chroma_server_auth_token = std::env::var("CHROMA_SERVER_AUTH_TOKEN").ok();
        if let Ok(raw) = std::env::var("USE_CHROMA_SERVER") {
            cfg.use_chroma_server = parse_bool("USE_CHROMA_SERVER", &raw)?;
        }
        if let Some(raw) = std::env::var("CHROMA_BATCH_SIZE").ok() {
            cfg.chroma_batch_size = parse_usize("CHROMA_BATCH_SIZE", &raw)?;
        }

        Ok(cfg)
    }

    /// Returns the configured key or a [`ConfigurationError`] — called by C9
    /// right before the first provider request, not at load time.
    pub fn require_api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigurationError::Missing("OPENAI_API_KEY").into())
    }

    pub fn chunks_dir(&self, sanitized_repo: &str) -> PathBuf {
        self.base_dir
            .join(".contextinator")
            .join("chunks")
            .join(sanitized_repo)
    }

    pub fn embeddings_dir(&self, sanitized_repo: &str) -> PathBuf {
        self.base_dir
            .join(".contextinator")
            .join("embeddings")
            .join(sanitized_repo)
    }

    pub fn chromadb_dir(&self, sanitized_repo: &str) -> PathBuf {
        self.base_dir
            .join(".contextinator")
            .join("chromadb")
            .join(sanitized_repo)
    }
}

fn parse_usize(key: &'static str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigurationError::Invalid {
            key,
            detail: format!("expected a positive integer, got {raw:?}"),
        }.into())
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigurationError::Invalid {
            key,
            detail: format!("expected a boolean, got {raw:?}"),
        }
        .into()),
    }
}
