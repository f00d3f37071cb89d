//! Embedding client (C9): validates and batches chunk content, calls the
//! provider's embeddings endpoint with bounded concurrency and retry/backoff,
//! and returns [`EmbeddedChunk`]s in their original order.
//!
//! Two distinct entry points — [`embed_sync`] and [`embed_async`] — rather
//! than one function that detects its caller's context: Rust has nothing
//! like `asyncio.get_running_loop()` to guard a blocking call from being
//! made inside an already-running reactor, so the split is the API itself.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::error::{EmbeddingError, Result};
use crate::types::{Chunk, EmbeddedChunk};

const RETRYABLE_STATUSES: &[StatusCode] = &[
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::REQUEST_TIMEOUT,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

const NON_RETRYABLE_STATUSES: &[StatusCode] =
    &[StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN, StatusCode::BAD_REQUEST];

/// Picks the content actually sent to the provider: `enriched_content` if
/// non-empty, else `content`, matching `_get_embedding_content`'s preference.
fn embedding_content(chunk: &Chunk) -> &str {
    if !chunk.enriched_content.trim().is_empty() {
        &chunk.enriched_content
    } else {
        &chunk.content
    }
}

/// Drops chunks with empty/whitespace-only embedding text and truncates ones
/// that blow past the provider's token budget using the original's rough
/// 4-chars-per-token heuristic (the real tokenizer is a BPE cost too high to
/// pay per-chunk here, and the original deliberately avoids it for this check).
fn validate_and_truncate(chunk: &Chunk, max_tokens: usize) -> Option<Chunk> {
    let content = embedding_content(chunk);
    if content.trim().is_empty() {
        return None;
    }

    let estimated_tokens = content.len() / 4;
    if estimated_tokens <= max_tokens {
        return Some(chunk.clone());
    }

    warn!(estimated_tokens, max_tokens, "chunk exceeds token limit, truncating");
    let max_chars = ((max_tokens * 4) as f64 * 0.9) as usize;
    let truncated: String = content.chars().take(max_chars).collect();
    let truncated = format!("{truncated}\n... (truncated)");

    let mut fixed = chunk.clone();
    if !fixed.enriched_content.trim().is_empty() {
        fixed.enriched_content = truncated;
    } else {
        fixed.content = truncated;
    }
    Some(fixed)
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Thin reqwest-based client for the provider's embeddings endpoint; no
/// example repo in this pack carries a dedicated OpenAI SDK dependency, so
/// this talks HTTP directly.
pub struct EmbeddingClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self { http: reqwest::Client::new(), api_key, model }
    }

    async fn call(&self, inputs: &[&str]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let body = EmbeddingRequest { model: &self.model, input: inputs.to_vec() };
        let response = self
            .http
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError { detail: e.to_string(), status: None })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError { detail, status: Some(status) });
        }

        let parsed: EmbeddingResponse =
            response.json().await.map_err(|e| ProviderError { detail: e.to_string(), status: None })?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl EmbeddingClient {
    /// Embeds a single piece of query text, e.g. for semantic search — the
    /// one-item-batch special case the original's search tools hit when they
    /// embed a user's query string rather than a document.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = call_with_retry(self, &[text])
            .await
            .map_err(|err| EmbeddingError::Provider { detail: err.detail })?;
        vectors.pop().ok_or_else(|| EmbeddingError::EmptyOutput.into())
    }
}

struct ProviderError {
    detail: String,
    status: Option<StatusCode>,
}

fn is_retryable(err: &ProviderError) -> bool {
    match err.status {
        Some(status) if NON_RETRYABLE_STATUSES.contains(&status) => false,
        Some(status) if RETRYABLE_STATUSES.contains(&status) => true,
        Some(_) => true,
        None => true,
    }
}

async fn call_with_retry(
    client: &EmbeddingClient,
    inputs: &[&str],
) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
    let mut last_err = None;
    for attempt in 0..3u32 {
        match client.call(inputs).await {
            Ok(embeddings) => return Ok(embeddings),
            Err(err) => {
                let retryable = is_retryable(&err);
                if attempt < 2 && retryable {
                    let wait = Duration::from_secs(2u64.pow(attempt));
                    warn!(attempt, wait_secs = wait.as_secs(), detail = %err.detail, "embedding call failed, retrying");
                    tokio::time::sleep(wait).await;
                    last_err = Some(err);
                } else {
                    return Err(err);
                }
            }
        }
    }
    Err(last_err.expect("loop always sets last_err before exhausting retries"))
}

fn validate_chunks(chunks: &[Chunk], max_tokens: usize) -> Vec<(usize, Chunk)> {
    chunks
        .iter()
        .enumerate()
        .filter_map(|(i, c)| validate_and_truncate(c, max_tokens).map(|c| (i, c)))
        .collect()
}

fn to_embedded(chunk: Chunk, embedding: Vec<f32>, model: &str, original_index: usize) -> EmbeddedChunk {
    EmbeddedChunk { chunk, embedding, embedding_model: model.to_string(), original_index }
}

/// Sequential batches with per-batch retry. A batch that exhausts retries is
/// **skipped** — its chunks are absent from the output but the call
/// continues; only an entirely empty result raises [`EmbeddingError`].
pub async fn embed_sync(
    client: &EmbeddingClient,
    chunks: &[Chunk],
    max_tokens: usize,
    batch_size: usize,
) -> Result<Vec<EmbeddedChunk>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let valid = validate_chunks(chunks, max_tokens);
    if valid.is_empty() {
        return Err(EmbeddingError::EmptyOutput.into());
    }

    info!(count = valid.len(), batch_size, "starting synchronous embedding");
    let mut embedded = Vec::new();

    for batch in valid.chunks(batch_size) {
        let contents: Vec<&str> = batch.iter().map(|(_, c)| embedding_content(c)).collect();
        match call_with_retry(client, &contents).await {
            Ok(vectors) => {
                for ((index, chunk), vector) in batch.iter().cloned().zip(vectors) {
                    embedded.push(to_embedded(chunk, vector, &client.model, index));
                }
            }
            Err(err) => {
                error!(detail = %err.detail, "batch exhausted retries, skipping");
            }
        }
    }

    if embedded.is_empty() {
        return Err(EmbeddingError::EmptyOutput.into());
    }
    Ok(embedded)
}

/// Concurrent batches bounded by a [`Semaphore`]. Any batch that exhausts
/// retries fails the whole call (fail-fast) rather than silently dropping
/// chunks, since partial success under concurrency is harder to reason about.
pub async fn embed_async(
    client: &EmbeddingClient,
    chunks: &[Chunk],
    max_tokens: usize,
    batch_size: usize,
    max_concurrent: usize,
) -> Result<Vec<EmbeddedChunk>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let valid = validate_chunks(chunks, max_tokens);
    if valid.is_empty() {
        return Err(EmbeddingError::EmptyOutput.into());
    }

    let semaphore = Semaphore::new(max_concurrent);
    let batches: Vec<&[(usize, Chunk)]> = valid.chunks(batch_size).collect();
    info!(count = valid.len(), batches = batches.len(), max_concurrent, "starting async embedding");

    let results = futures::future::join_all(batches.iter().map(|batch| async {
        let _permit = semaphore.acquire().await.expect("semaphore is never closed");
        let contents: Vec<&str> = batch.iter().map(|(_, c)| embedding_content(c)).collect();
        call_with_retry(client, &contents).await.map(|vectors| {
            batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|((index, chunk), vector)| to_embedded(chunk, vector, &client.model, index))
                .collect::<Vec<_>>()
        })
    }))
    .await;

    let mut embedded = Vec::new();
    let mut failures = 0usize;
    let total = results.len();
    for result in results {
        match result {
            Ok(chunks) => embedded.extend(chunks),
            Err(err) => {
                failures += 1;
                error!(detail = %err.detail, "batch failed");
            }
        }
    }

    if failures > 0 {
        return Err(EmbeddingError::RetriesExhausted {
            detail: format!("{failures}/{total} batches failed"),
        }
        .into());
    }
    if embedded.is_empty() {
        return Err(EmbeddingError::EmptyOutput.into());
    }
    Ok(embedded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, enriched: &str) -> Chunk {
        Chunk {
            id: "a".into(),
            content: content.into(),
            enriched_content: enriched.into(),
            file_path: "x.rs".into(),
            language: "rust".into(),
            node_type: "function_item".into(),
            node_name: "f".into(),
            start_line: 1,
            end_line: 1,
            start_byte: 0,
            end_byte: content.len(),
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
    fn embedding_content_prefers_enriched() {
        let c = chunk("plain", "enriched");
        assert_eq!(embedding_content(&c), "enriched");
    }

    #[test]
    fn embedding_content_falls_back_to_content_when_enriched_empty() {
        let c = chunk("plain", "");
        assert_eq!(embedding_content(&c), "plain");
    }

    #[test]
    fn validate_and_truncate_drops_empty_content() {
        let c = chunk("", "   ");
        assert!(validate_and_truncate(&c, 100).is_none());
    }

    #[test]
    fn validate_and_truncate_passes_through_small_content() {
        let c = chunk("hello", "hello");
        let validated = validate_and_truncate(&c, 100).unwrap();
        assert_eq!(validated.enriched_content, "hello");
    }

    #[test]
    fn validate_and_truncate_truncates_oversized_content() {
        let big = "x".repeat(10_000);
        let c = chunk(&big, &big);
        let validated = validate_and_truncate(&c, 10).unwrap();
        assert!(validated.enriched_content.ends_with("\n... (truncated)"));
        assert!(validated.enriched_content.len() < big.len());
    }

    #[test]
    fn is_retryable_classifies_rate_limit_as_retryable() {
        let err = ProviderError { detail: "rate limited".into(), status: Some(StatusCode::TOO_MANY_REQUESTS) };
        assert!(is_retryable(&err));
    }

    #[test]
    fn is_retryable_classifies_auth_failure_as_fatal() {
        let err = ProviderError { detail: "bad key".into(), status: Some(StatusCode::UNAUTHORIZED) };
        assert!(!is_retryable(&err));
    }

    #[test]
    fn is_retryable_defaults_unknown_errors_to_retryable() {
        let err = ProviderError { detail: "network blip".into(), status: None };
        assert!(is_retryable(&err));
    }
}
