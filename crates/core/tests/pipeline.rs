//! End-to-end scenarios over the ingestion pipeline and the thin search API,
//! against throwaway repos built with `tempfile` — the counterpart of the
//! teacher's `server/tests/mcp_tools.rs` harness, minus the MCP transport.

use std::path::Path;

use contextinator_core::config::Config;
use contextinator_core::orchestrator::{chunk_repo, IngestOptions};
use contextinator_core::search::{grep_search, read_file, symbol_search};
use contextinator_core::types::EmbeddedChunk;
use contextinator_core::vectorstore::VectorStore;
use contextinator_core::Chunk;

fn write_file(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Wraps chunks in embeddings with a trivial deterministic vector, since
/// these scenarios exercise storage/search, not the embedding provider.
fn fake_embed(chunks: Vec<Chunk>) -> Vec<EmbeddedChunk> {
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| EmbeddedChunk {
            chunk,
            embedding: vec![i as f32, 0.0, 0.0],
            embedding_model: "test-fake".to_string(),
            original_index: i,
        })
        .collect()
}

async fn local_store() -> (VectorStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = VectorStore::connect(false, "http://localhost:0", None, dir.path().to_path_buf()).await;
    (store, dir)
}

#[tokio::test]
async fn s1_exact_name_symbol_search_finds_one_hit() {
    let repo = tempfile::tempdir().unwrap();
    write_file(repo.path(), "main.py", "def authenticate_user(u, p): return True\n");

    let config = Config::default();
    let (chunks, _stats) = chunk_repo(repo.path().to_str().unwrap(), &config, &IngestOptions::default())
        .await
        .unwrap();

    let (store, _dir) = local_store().await;
    let embedded = fake_embed(chunks);
    store.store_embeddings(&embedded, "s1", 100, true).await.unwrap();

    let hits = symbol_search(&store, "s1", "authenticate_user", None, None, true).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node_type, "function_definition");
    assert!(hits[0].file_path.ends_with("main.py"));
}

#[tokio::test]
async fn s2_duplicate_function_across_files_dedupes() {
    let repo = tempfile::tempdir().unwrap();
    let body = "def shared():\n    return 1\n";
    write_file(repo.path(), "a/util.py", body);
    write_file(repo.path(), "b/util.py", body);

    let config = Config::default();
    let (chunks, stats) = chunk_repo(repo.path().to_str().unwrap(), &config, &IngestOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.unique_chunks, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].locations.len(), 1);
}

#[tokio::test]
async fn s3_over_budget_function_splits_into_multiple_bounded_chunks() {
    let repo = tempfile::tempdir().unwrap();
    let mut body = String::from("def big():\n");
    for i in 0..400 {
        body.push_str(&format!("    x{i} = {i}\n"));
    }
    write_file(repo.path(), "big.py", &body);

    let config = Config { max_tokens: 512, chunk_overlap: 50, ..Config::default() };
    let (chunks, stats) = chunk_repo(repo.path().to_str().unwrap(), &config, &IngestOptions::default())
        .await
        .unwrap();

    assert!(chunks.len() >= 3, "expected at least 3 splits, got {}", chunks.len());
    assert!(stats.split_chunks >= 3);
    for (i, chunk) in chunks.iter().enumerate() {
        assert!(chunk.is_split);
        assert_eq!(chunk.split_index, Some(i));
        assert!(chunk.token_count.unwrap() <= 512);
    }
}

#[tokio::test]
async fn s4_notebook_cells_produce_prefixed_chunk_names() {
    let repo = tempfile::tempdir().unwrap();
    let notebook = serde_json::json!({
        "cells": [
            { "cell_type": "code", "source": ["def one():\n", "    pass\n"] },
            { "cell_type": "code", "source": ["def two():\n", "    pass\n"] },
            { "cell_type": "code", "source": ["def three():\n", "    pass\n"] },
            { "cell_type": "markdown", "source": ["# Section\n"] }
        ],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5
    });
    write_file(repo.path(), "analysis.ipynb", &serde_json::to_string(&notebook).unwrap());

    let config = Config::default();
    let (chunks, _stats) = chunk_repo(repo.path().to_str().unwrap(), &config, &IngestOptions::default())
        .await
        .unwrap();

    for prefix in ["cell_1:", "cell_2:", "cell_3:", "cell_4:"] {
        assert!(
            chunks.iter().any(|c| c.node_name.starts_with(prefix)),
            "missing chunk with prefix {prefix}, got names: {:?}",
            chunks.iter().map(|c| &c.node_name).collect::<Vec<_>>()
        );
    }
}

#[tokio::test]
async fn s5_grep_whole_word_excludes_prefix_matches() {
    let repo = tempfile::tempdir().unwrap();
    write_file(
        repo.path(),
        "auth.py",
        "def authenticate_user():\n    auth = True\n    return auth\n",
    );

    let config = Config::default();
    let (chunks, _stats) = chunk_repo(repo.path().to_str().unwrap(), &config, &IngestOptions::default())
        .await
        .unwrap();

    let (store, _dir) = local_store().await;
    store.store_embeddings(&fake_embed(chunks), "s5", 100, true).await.unwrap();

    let result = grep_search(&store, "s5", "auth", 100, false, true, 0, None).await.unwrap();
    for file in &result.files {
        for m in &file.matches {
            assert!(
                !m.content.contains("authenticate_user"),
                "whole-word match for 'auth' should not include 'authenticate_user': {}",
                m.content
            );
        }
    }
    assert!(result.total_matches >= 2);
}

#[tokio::test]
async fn s6_read_file_reconstructs_every_line_without_duplicates() {
    let repo = tempfile::tempdir().unwrap();
    let mut body = String::new();
    for i in 0..80 {
        body.push_str(&format!("line_{i}\n"));
    }
    write_file(repo.path(), "long.py", &body);

    let config = Config { max_tokens: 40, chunk_overlap: 5, ..Config::default() };
    let (chunks, _stats) = chunk_repo(repo.path().to_str().unwrap(), &config, &IngestOptions::default())
        .await
        .unwrap();
    assert!(chunks.len() >= 2, "expected the file-level chunk to split");

    let (store, _dir) = local_store().await;
    store.store_embeddings(&fake_embed(chunks), "s6", 100, true).await.unwrap();

    let result = read_file(&store, "s6", "long.py", None, true).await.unwrap();
    let content = result.content.unwrap();
    for i in 0..80 {
        assert!(content.contains(&format!("line_{i}\n")) || content.contains(&format!("line_{i}")), "missing line_{i}");
    }
}

#[tokio::test]
async fn empty_file_is_skipped_without_crashing() {
    let repo = tempfile::tempdir().unwrap();
    write_file(repo.path(), "empty.py", "");

    let config = Config::default();
    let (_chunks, stats) = chunk_repo(repo.path().to_str().unwrap(), &config, &IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(stats.files_failed, 0);
}

#[tokio::test]
async fn unknown_extension_is_not_discovered() {
    let repo = tempfile::tempdir().unwrap();
    write_file(repo.path(), "data.xyz123", "not a known language\n");

    let config = Config::default();
    let (chunks, stats) = chunk_repo(repo.path().to_str().unwrap(), &config, &IngestOptions::default())
        .await
        .unwrap();
    assert_eq!(chunks.len(), 0);
    assert_eq!(stats.files_ok, 0);
}

#[tokio::test]
async fn chunk_overlap_equal_to_max_tokens_is_rejected_by_validation() {
    let repo = tempfile::tempdir().unwrap();
    write_file(repo.path(), "f.py", "def f():\n    pass\n");

    let config = Config { max_tokens: 100, chunk_overlap: 100, ..Config::default() };
    let result = chunk_repo(repo.path().to_str().unwrap(), &config, &IngestOptions::default()).await;
    assert!(result.is_err());
}
