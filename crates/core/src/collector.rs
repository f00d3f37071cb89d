//! Node collection and deduplication (C6): turns a file's [`RawNode`]s into
//! [`Chunk`]s, hashing content to drop exact duplicates across the whole repo
//! while tracking every location a duplicate was seen at — the Rust
//! counterpart of `NodeCollector`/`build_enriched_content`.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::types::{Chunk, RawNode};

/// Builds the header lines prepended to a chunk's content for embedding,
/// matching `build_context`'s exact field order and join behavior.
fn build_context(
    parent_name: Option<&str>,
    parent_type: Option<&str>,
    file_path: &str,
    language: &str,
    node_type: &str,
    node_name: &str,
    start_line: usize,
    end_line: usize,
) -> String {
    let mut parts = Vec::new();
    if let Some(name) = parent_name {
        let kind = parent_type.unwrap_or("unknown");
        parts.push(format!("Parent: {name} ({kind})"));
    }
    if !file_path.is_empty() {
        parts.push(format!("File: {file_path}"));
    }
    if !language.is_empty() {
        parts.push(format!("Language: {language}"));
    }
    if !node_type.is_empty() {
        parts.push(format!("Type: {node_type}"));
    }
    if !node_name.is_empty() {
        parts.push(format!("Symbol: {node_name}"));
    }
    parts.push(format!("Lines: {start_line}-{end_line}"));
    parts.join("\n")
}

/// Prepends the context header to `content`, separated by a blank line.
fn build_enriched_content(header: &str, content: &str) -> String {
    if header.is_empty() {
        content.to_string()
    } else {
        format!("{header}\n\n{content}")
    }
}

pub fn hash_content(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

/// Accumulates unique chunks across a repository scan, deduplicating by
/// content hash and tracking where each duplicate reappeared.
#[derive(Default)]
pub struct NodeCollector {
    seen_hashes: HashSet<String>,
    chunks: Vec<Chunk>,
    duplicate_locations: HashMap<String, Vec<String>>,
}

impl NodeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns `nodes` (from one file) into chunks, returning only the ones
    /// that were new (first time this content hash was seen).
    pub fn collect_nodes(&mut self, file_path: &str, language: &str, nodes: &[RawNode]) -> Vec<Chunk> {
        let mut collected = Vec::new();

        for node in nodes {
            let content_hash = hash_content(&node.content);
            let location = node.location(file_path);

            if self.seen_hashes.contains(&content_hash) {
                self.duplicate_locations.entry(content_hash).or_default().push(location);
                continue;
            }

            let header = build_context(
                node.parent_name.as_deref(),
                node.parent_type.as_deref(),
                file_path,
                language,
                &node.node_type,
                &node.name,
                node.start_line,
                node.end_line,
            );
            let enriched_content = build_enriched_content(&header, &node.content);

            let chunk = Chunk {
                id: node.id.clone(),
                content: node.content.clone(),
                enriched_content,
                file_path: file_path.to_string(),
                language: language.to_string(),
                node_type: node.node_type.clone(),
                node_name: node.name.clone(),
                start_line: node.start_line,
                end_line: node.end_line,
                start_byte: node.start_byte,
                end_byte: node.end_byte,
                hash: content_hash.clone(),
                parent_id: node.parent_id.clone(),
                parent_type: node.parent_type.clone(),
                parent_name: node.parent_name.clone(),
                children_ids: node.children_ids.clone(),
                is_parent: node.is_parent,
                locations: vec![location],
                is_split: false,
                split_index: None,
                original_id: None,
                original_hash: None,
                token_count: None,
            };

            self.seen_hashes.insert(content_hash);
            self.chunks.push(chunk.clone());
            collected.push(chunk);
        }

        collected
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            total_chunks: self.chunks.len(),
            unique_hashes: self.seen_hashes.len(),
            duplicates_found: self.duplicate_locations.len(),
        }
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicate_locations.values().map(|v| v.len()).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollectorStats {
    pub total_chunks: usize,
    pub unique_hashes: usize,
    pub duplicates_found: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellType;

    fn node(id: &str, content: &str, start: usize, end: usize) -> RawNode {
        RawNode {
            id: id.into(),
            node_type: "function_item".into(),
            name: "f".into(),
            content: content.into(),
            start_byte: 0,
            end_byte: content.len(),
            start_line: start,
            end_line: end,
            parent_id: None,
            parent_type: None,
            parent_name: None,
            children_ids: vec![],
            is_parent: false,
            language: "rust".into(),
            cell_index: None,
            cell_type: None::<CellType>,
        }
    }

    #[test]
    fn collect_nodes_dedupes_identical_content() {
        let mut collector = NodeCollector::new();
        let a = node("a", "fn f() {}", 1, 1);
        let b = node("b", "fn f() {}", 10, 10);
        let collected_a = collector.collect_nodes("x.rs", "rust", &[a]);
        let collected_b = collector.collect_nodes("x.rs", "rust", &[b]);
        assert_eq!(collected_a.len(), 1);
        assert!(collected_b.is_empty());
        assert_eq!(collector.stats().total_chunks, 1);
        assert_eq!(collector.duplicate_count(), 1);
    }

    #[test]
    fn collect_nodes_enriched_content_has_header_and_blank_line() {
        let mut collector = NodeCollector::new();
        let n = node("a", "fn f() {}", 3, 5);
        let collected = collector.collect_nodes("x.rs", "rust", &[n]);
        let enriched = &collected[0].enriched_content;
        assert!(enriched.starts_with("File: x.rs"));
        assert!(enriched.contains("Lines: 3-5"));
        assert!(enriched.ends_with("fn f() {}"));
    }

    #[test]
    fn collect_nodes_tracks_locations_for_new_chunk() {
        let mut collector = NodeCollector::new();
        let n = node("a", "fn f() {}", 1, 2);
        let collected = collector.collect_nodes("x.rs", "rust", &[n]);
        assert_eq!(collected[0].locations, vec!["x.rs:1-2".to_string()]);
    }
}
