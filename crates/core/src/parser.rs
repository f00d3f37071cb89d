//! Parsing pipeline (C3): turns one [`FileRecord`] into a list of [`RawNode`]s,
//! degrading through three tiers exactly like the original's `parse_file` —
//! grammar success, then parse failure, then no-grammar-available — all three
//! of the latter two collapsing to a single file-level node.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{FileSystemError, Result};
use crate::extractor::{extract_nodes, file_level_node};
use crate::grammar::get_parser;
use crate::types::RawNode;

/// The outcome of parsing one file: its nodes plus whether a grammar actually
/// ran, surfaced so callers/tests can distinguish "genuinely one big file
/// chunk" from "AST extraction yielded one semantic unit".
pub struct ParseResult {
    pub nodes: Vec<RawNode>,
    pub has_ast: bool,
    pub fallback_reason: Option<&'static str>,
}

/// Reads `abs_path` and extracts its semantic nodes for `language`.
///
/// Three fallback tiers, each degrading to a single file-level [`RawNode`]:
/// no grammar compiled/registered for the language, the grammar parsed but
/// the tree hands back zero target nodes, or parsing itself is impossible to
/// run (caught defensively — tree-sitter's `parse` does not itself error,
/// but a missing/failed `set_language` does).
pub fn parse_file(abs_path: &Path, rel_path: &str, language: &str) -> Result<ParseResult> {
    let bytes = std::fs::read(abs_path).map_err(|source| FileSystemError::Io {
        operation: "read",
        path: abs_path.to_path_buf(),
        source,
    })?;
    // Invalid byte sequences are replaced rather than rejected: parsing is
    // pure over bytes and must never fail a file just because it isn't
    // strictly valid UTF-8 (binaries-that-slipped-through, mixed encodings).
    let content = String::from_utf8_lossy(&bytes).into_owned();

    let Some(mut parser) = get_parser(language) else {
        warn!(path = rel_path, language, "no grammar available, using file-level fallback");
        let node = file_level_node(file_name(abs_path), &content);
        return Ok(ParseResult {
            nodes: vec![tag_language(node, language)],
            has_ast: false,
            fallback_reason: Some("no grammar registered or compiled for this language"),
        });
    };

    let tree = match parser.parse(&content, None) {
        Some(tree) => tree,
        None => {
            warn!(path = rel_path, language, "parse failed, using file-level fallback");
            let node = file_level_node(file_name(abs_path), &content);
            return Ok(ParseResult {
                nodes: vec![tag_language(node, language)],
                has_ast: false,
                fallback_reason: Some("tree-sitter returned no tree"),
            });
        }
    };

    let nodes = extract_nodes(tree.root_node(), &content, language);
    if nodes.is_empty() {
        warn!(path = rel_path, "no semantic nodes found, using file-level chunking");
        let node = file_level_node(file_name(abs_path), &content);
        return Ok(ParseResult {
            nodes: vec![tag_language(node, language)],
            has_ast: false,
            fallback_reason: Some("grammar produced zero target nodes"),
        });
    }

    debug!(path = rel_path, count = nodes.len(), "parsed semantic nodes");
    Ok(ParseResult { nodes, has_ast: true, fallback_reason: None })
}

fn tag_language(mut node: RawNode, language: &str) -> RawNode {
    node.language = language.to_string();
    node
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_file_rust_function_produces_ast_nodes() {
        let mut file = NamedTempFile::with_suffix(".rs").unwrap();
        write!(file, "fn greet() {{}}").unwrap();
        let result = parse_file(file.path(), "greet.rs", "rust").unwrap();
        assert!(result.has_ast);
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].node_type, "function_item");
    }

    #[test]
    fn parse_file_unknown_language_falls_back_to_file_level() {
        let mut file = NamedTempFile::with_suffix(".xyz").unwrap();
        write!(file, "some content\nmore content\n").unwrap();
        let result = parse_file(file.path(), "f.xyz", "made-up-language").unwrap();
        assert!(!result.has_ast);
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].node_type, "file");
    }

    #[test]
    fn parse_file_no_target_nodes_falls_back() {
        let mut file = NamedTempFile::with_suffix(".rs").unwrap();
        write!(file, "// just a comment, no items\n").unwrap();
        let result = parse_file(file.path(), "f.rs", "rust").unwrap();
        assert!(!result.has_ast);
        assert_eq!(result.nodes[0].node_type, "file");
    }
}
