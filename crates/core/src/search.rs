//! Search API (C13): thin read-side operations over a collection's vector
//! store — semantic, symbol, grep, regex, read-file, and on-disk structure —
//! the Rust counterpart of the `tools/` package's `SearchTool` subclasses.

use std::collections::HashMap;
use std::path::Path;

use regex::RegexBuilder;
use serde::Serialize;

use crate::embedding::EmbeddingClient;
use crate::error::{Result, SearchError};
use crate::vectorstore::VectorStore;

/// Normalizes a stored path match: exact (case-insensitive), basename (only
/// when `search_path` has no `/`), or suffix — matching `_matches_file_path`.
fn matches_file_path(stored_path: &str, search_path: &str) -> bool {
    let stored = stored_path.replace('\\', "/").to_lowercase();
    let search = search_path.replace('\\', "/").to_lowercase();

    if stored == search {
        return true;
    }

    if !search.contains('/') {
        let stored_basename = stored.rsplit('/').next().unwrap_or(&stored);
        if stored_basename == search && !search.is_empty() {
            return true;
        }
    }

    stored.ends_with(&format!("/{search}")) || stored.ends_with(&search)
}

fn metadata_str<'a>(metadata: &'a serde_json::Map<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(|v| v.as_str())
}

fn metadata_usize(metadata: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<usize> {
    metadata.get(key).and_then(|v| v.as_u64()).map(|n| n as usize)
}

// ---------------------------------------------------------------------------
// Semantic search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SemanticHit {
    pub id: String,
    pub content: String,
    pub similarity: f32,
    pub file_path: String,
    pub node_type: String,
    pub node_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct SemanticFilters {
    pub language: Option<String>,
    pub file_path_contains: Option<String>,
    pub node_type: Option<String>,
    /// Drop chunks whose `node_type` marks them as parent/container nodes
    /// rather than leaf symbols, unless explicitly allowed.
    pub exclude_parents: bool,
}

/// Embeds `query` (optionally prefixed with a language hint, matching the
/// original's `"Language: <lang>\n\n"` convention) and ranks `top_n`
/// candidates by cosine similarity (`1 - distance` against a provider that
/// reports distance; this crate's [`VectorStore::query`] already returns
/// similarity directly).
pub async fn semantic_search(
    store: &VectorStore,
    client: &EmbeddingClient,
    collection: &str,
    query: &str,
    top_n: usize,
    filters: &SemanticFilters,
) -> Result<Vec<SemanticHit>> {
    let prefixed = match &filters.language {
        Some(lang) => format!("Language: {lang}\n\n{query}"),
        None => query.to_string(),
    };

    let embedding = client
        .embed_query(&prefixed)
        .await
        .map_err(|e| SearchError::Failed(format!("failed to embed query: {e}")))?;

    let mut where_: HashMap<String, String> = HashMap::new();
    if let Some(lang) = &filters.language {
        where_.insert("language".to_string(), lang.clone());
    }
    if let Some(node_type) = &filters.node_type {
        where_.insert("node_type".to_string(), node_type.clone());
    }
    let where_filter = if where_.is_empty() { None } else { Some(&where_) };

    let overfetch = top_n.saturating_mul(3).max(top_n + 10);
    let scored = store.query(collection, &embedding, overfetch, where_filter).await?;

    let mut hits = Vec::new();
    for (point, similarity) in scored {
        let file_path = metadata_str(&point.metadata, "file_path").unwrap_or("").to_string();
        if let Some(substr) = &filters.file_path_contains {
            if !file_path.to_lowercase().contains(&substr.to_lowercase()) {
                continue;
            }
        }
        let node_type = metadata_str(&point.metadata, "node_type").unwrap_or("").to_string();
        if filters.exclude_parents && metadata_str(&point.metadata, "is_parent") == Some("true") {
            continue;
        }

        hits.push(SemanticHit {
            id: point.id,
            content: point.document,
            similarity,
            file_path,
            node_type,
            node_name: metadata_str(&point.metadata, "node_name").unwrap_or("").to_string(),
        });
        if hits.len() >= top_n {
            break;
        }
    }
    Ok(hits)
}

// ---------------------------------------------------------------------------
// Symbol search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SymbolHit {
    pub id: String,
    pub content: String,
    pub file_path: String,
    pub node_type: String,
    pub node_name: String,
}

/// Looks up symbols by name: exact match filters at the store, substring
/// match filters in-process; either way results are deduplicated by content
/// hash, matching `symbol_search`'s dedup-by-hash pass.
pub async fn symbol_search(
    store: &VectorStore,
    collection: &str,
    symbol_name: &str,
    symbol_type: Option<&str>,
    language: Option<&str>,
    exact_match: bool,
) -> Result<Vec<SymbolHit>> {
    let mut where_: HashMap<String, String> = HashMap::new();
    if let Some(lang) = language {
        where_.insert("language".to_string(), lang.to_string());
    }
    if let Some(t) = symbol_type {
        where_.insert("node_type".to_string(), t.to_string());
    }
    if exact_match {
        where_.insert("node_name".to_string(), symbol_name.to_string());
    }
    let where_filter = if where_.is_empty() { None } else { Some(&where_) };

    let points = store.get(collection, where_filter).await?;

    let mut seen_hashes = std::collections::HashSet::new();
    let mut hits = Vec::new();
    for point in points {
        let node_name = metadata_str(&point.metadata, "node_name").unwrap_or("");
        if !exact_match && !node_name.to_lowercase().contains(&symbol_name.to_lowercase()) {
            continue;
        }

        if let Some(hash) = metadata_str(&point.metadata, "hash") {
            if !seen_hashes.insert(hash.to_string()) {
                continue;
            }
        }

        hits.push(SymbolHit {
            id: point.id,
            content: point.document,
            file_path: metadata_str(&point.metadata, "file_path").unwrap_or("").to_string(),
            node_type: metadata_str(&point.metadata, "node_type").unwrap_or("").to_string(),
            node_name: node_name.to_string(),
        });
    }
    Ok(hits)
}

// ---------------------------------------------------------------------------
// Grep / regex search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LineMatch {
    pub line_number: usize,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileMatches {
    pub path: String,
    pub matches: Vec<LineMatch>,
    pub match_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrepResult {
    pub files: Vec<FileMatches>,
    pub total_matches: usize,
    pub total_files: usize,
}

/// Literal or whole-word line matching over every document in `collection`
/// (optionally filtered by language), capped at `max_chunks` documents —
/// the Rust counterpart of `grep_search`'s non-regex path. `context_lines`
/// pulls in up to that many lines before/after each match.
pub async fn grep_search(
    store: &VectorStore,
    collection: &str,
    pattern: &str,
    max_chunks: usize,
    case_sensitive: bool,
    whole_word: bool,
    context_lines: usize,
    language: Option<&str>,
) -> Result<GrepResult> {
    let mut where_: HashMap<String, String> = HashMap::new();
    if let Some(lang) = language {
        where_.insert("language".to_string(), lang.to_string());
    }
    let where_filter = if where_.is_empty() { None } else { Some(&where_) };

    let points = store.get(collection, where_filter).await?;
    let word_re = whole_word
        .then(|| RegexBuilder::new(&format!(r"\b{}\b", regex::escape(pattern))).case_insensitive(!case_sensitive).build().ok())
        .flatten();

    let mut file_matches: std::collections::BTreeMap<String, Vec<LineMatch>> = std::collections::BTreeMap::new();
    let mut total_matches = 0usize;

    for point in points.into_iter().take(max_chunks) {
        let file_path = metadata_str(&point.metadata, "file_path").unwrap_or("unknown").to_string();
        let start_line = metadata_usize(&point.metadata, "start_line").unwrap_or(1);
        let lines: Vec<&str> = point.document.split('\n').collect();

        for (i, line) in lines.iter().enumerate() {
            let matched = if let Some(re) = &word_re {
                re.is_match(line)
            } else if case_sensitive {
                line.contains(pattern)
            } else {
                line.to_lowercase().contains(&pattern.to_lowercase())
            };

            if !matched {
                continue;
            }

            let display_line = if context_lines == 0 {
                line.trim().to_string()
            } else {
                let start = i.saturating_sub(context_lines);
                let end = (i + context_lines + 1).min(lines.len());
                lines[start..end].join("\n")
            };

            file_matches.entry(file_path.clone()).or_default().push(LineMatch {
                line_number: start_line + i,
                content: display_line,
            });
            total_matches += 1;
        }
    }

    let mut files: Vec<FileMatches> = file_matches
        .into_iter()
        .map(|(path, mut matches)| {
            matches.sort_by_key(|m| m.line_number);
            let match_count = matches.len();
            FileMatches { path, matches, match_count }
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(GrepResult { total_files: files.len(), files, total_matches })
}

#[derive(Debug, Clone, Serialize)]
pub struct RegexHit {
    pub id: String,
    pub content: String,
    pub file_path: String,
    pub match_spans: Vec<(usize, usize)>,
}

/// Compiles `pattern` and scans each document's full text, matching
/// `regex_search`'s file_path-filter-then-finditer approach; `limit` caps
/// the number of matching chunks returned (not the number of matches within
/// one chunk).
pub fn regex_search(
    store_points: &[crate::types::Point],
    pattern: &str,
    case_sensitive: bool,
    file_path: Option<&str>,
    limit: usize,
) -> Result<Vec<RegexHit>> {
    let compiled = RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| SearchError::Failed(format!("invalid regex pattern: {e}")))?;

    let mut hits = Vec::new();
    for point in store_points {
        if hits.len() >= limit {
            break;
        }
        let path = metadata_str(&point.metadata, "file_path").unwrap_or("");
        if let Some(filter) = file_path {
            if !matches_file_path(path, filter) {
                continue;
            }
        }

        let spans: Vec<(usize, usize)> = compiled.find_iter(&point.document).map(|m| (m.start(), m.end())).collect();
        if !spans.is_empty() {
            hits.push(RegexHit { id: point.id.clone(), content: point.document.clone(), file_path: path.to_string(), match_spans: spans });
        }
    }
    Ok(hits)
}

// ---------------------------------------------------------------------------
// Read file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReadFileResult {
    pub file_path: String,
    pub total_chunks: usize,
    pub content: Option<String>,
}

/// Reconstructs a file from its stored chunks: filters by smart path
/// matching, sorts by `(start_line, split_index, end_line)`, drops chunks
/// fully contained in another kept chunk's byte range, then joins contents
/// with a blank line — the Rust counterpart of `read_file`.
pub async fn read_file(
    store: &VectorStore,
    collection: &str,
    file_path: &str,
    node_type: Option<&str>,
    join_chunks: bool,
) -> Result<ReadFileResult> {
    let mut where_: HashMap<String, String> = HashMap::new();
    if let Some(t) = node_type {
        where_.insert("node_type".to_string(), t.to_string());
    }
    let where_filter = if where_.is_empty() { None } else { Some(&where_) };

    let mut points = store.get(collection, where_filter).await?;
    points.retain(|p| matches_file_path(metadata_str(&p.metadata, "file_path").unwrap_or(""), file_path));

    points.sort_by_key(|p| {
        (
            metadata_usize(&p.metadata, "start_line").unwrap_or(0),
            metadata_usize(&p.metadata, "split_index").unwrap_or(0),
            metadata_usize(&p.metadata, "end_line").unwrap_or(0),
        )
    });

    let spans: Vec<(usize, usize)> = points
        .iter()
        .map(|p| (metadata_usize(&p.metadata, "start_byte").unwrap_or(0), metadata_usize(&p.metadata, "end_byte").unwrap_or(0)))
        .collect();

    let mut kept = Vec::new();
    for (i, point) in points.into_iter().enumerate() {
        let (start, end) = spans[i];
        let contained = spans.iter().enumerate().any(|(j, (other_start, other_end))| {
            i != j && *other_start <= start && end <= *other_end && !(start == *other_start && end == *other_end)
        });
        if !contained {
            kept.push(point);
        }
    }

    let total_chunks = kept.len();
    let content = if join_chunks && !kept.is_empty() {
        Some(kept.iter().map(|p| p.document.as_str()).collect::<Vec<_>>().join("\n\n"))
    } else {
        None
    };

    Ok(ReadFileResult { file_path: file_path.to_string(), total_chunks, content })
}

// ---------------------------------------------------------------------------
// Repository structure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StructureNode {
    pub name: String,
    pub is_dir: bool,
    pub children: Vec<StructureNode>,
}

/// Walks the repository on disk (not the vector store), honoring the same
/// ignore rules as discovery, down to `max_depth` directories.
pub fn repo_structure(root: &Path, max_depth: usize) -> StructureNode {
    build_tree(root, root, max_depth, 0)
}

fn build_tree(root: &Path, path: &Path, max_depth: usize, depth: usize) -> StructureNode {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_else(|| path.to_str().unwrap_or("."))
        .to_string();

    let is_dir = path.is_dir();
    let mut children = Vec::new();

    if is_dir && depth < max_depth {
        if let Ok(entries) = std::fs::read_dir(path) {
            let mut paths: Vec<_> = entries.flatten().map(|e| e.path()).collect();
            paths.sort();
            for child_path in paths {
                let rel = child_path.strip_prefix(root).unwrap_or(&child_path);
                let rel_str = rel.to_string_lossy().replace('\\', "/");
                if crate::discovery::DEFAULT_IGNORE_PATTERNS
                    .iter()
                    .any(|p| rel_str.split('/').any(|component| component == *p))
                {
                    continue;
                }
                if child_path.is_file() && crate::discovery::language_for_path(&child_path).is_none() {
                    continue;
                }
                children.push(build_tree(root, &child_path, max_depth, depth + 1));
            }
        }
    }

    StructureNode { name, is_dir, children }
}
