//! AST node extraction (C4): walks a tree-sitter tree, emitting a [`RawNode`]
//! for every node whose type is in the language's target set, with parent
//! linkage and a best-effort human name — the Rust side of the original's
//! `extract_nodes`/`get_node_name` pair.

use tree_sitter::Node;
use uuid::Uuid;

use crate::grammar::{node_types_for, parent_node_types_for};
use crate::types::RawNode;

#[derive(Clone)]
struct Frame {
    parent_id: Option<String>,
    parent_type: Option<String>,
    parent_name: Option<String>,
}

/// Walks `root`, emitting one [`RawNode`] per target-typed descendant.
///
/// A target node whose type is in the language's parent set opens a new
/// frame for its children (they'll record it as their parent); any other
/// target node is emitted but its children still see the *original* frame,
/// exactly like non-target nodes recursed through transparently.
pub fn extract_nodes(root: Node, content: &str, language: &str) -> Vec<RawNode> {
    let target_types = node_types_for(language);
    if target_types.is_empty() {
        return Vec::new();
    }
    let parent_types = parent_node_types_for(language);
    let content_bytes = content.as_bytes();

    let mut nodes = Vec::new();
    let root_frame = Frame { parent_id: None, parent_type: None, parent_name: None };
    traverse(root, root_frame, content_bytes, language, target_types, parent_types, &mut nodes);

    // Post-pass: populate children_ids now that every node has a stable id.
    let parent_ids: Vec<Option<String>> = nodes.iter().map(|n| n.parent_id.clone()).collect();
    for i in 0..nodes.len() {
        if !nodes[i].is_parent {
            continue;
        }
        let this_id = nodes[i].id.clone();
        let children: Vec<String> = parent_ids
            .iter()
            .zip(nodes.iter())
            .filter(|(pid, _)| pid.as_deref() == Some(this_id.as_str()))
            .map(|(_, n)| n.id.clone())
            .collect();
        nodes[i].children_ids = children;
    }

    nodes
}

#[allow(clippy::too_many_arguments)]
fn traverse(
    node: Node,
    frame: Frame,
    content_bytes: &[u8],
    language: &str,
    target_types: &[&str],
    parent_types: &[&str],
    out: &mut Vec<RawNode>,
) {
    if target_types.contains(&node.kind()) {
        let node_id = Uuid::new_v4().to_string();
        let content = String::from_utf8_lossy(&content_bytes[node.start_byte()..node.end_byte()]).into_owned();
        let name = node_name(node, content_bytes);
        let is_parent = parent_types.contains(&node.kind());
        let node_kind = node.kind().to_string();

        out.push(RawNode {
            id: node_id.clone(),
            node_type: node_kind.clone(),
            name: name.clone(),
            content,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            parent_id: frame.parent_id.clone(),
            parent_type: frame.parent_type.clone(),
            parent_name: frame.parent_name.clone(),
            children_ids: Vec::new(),
            is_parent,
            language: language.to_string(),
            cell_index: None,
            cell_type: None,
        });

        let child_frame = if is_parent {
            Frame { parent_id: Some(node_id), parent_type: Some(node_kind), parent_name: Some(name) }
        } else {
            frame
        };

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            traverse(child, child_frame.clone(), content_bytes, language, target_types, parent_types, out);
        }
    } else {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            traverse(child, frame.clone(), content_bytes, language, target_types, parent_types, out);
        }
    }
}

const IDENTIFIER_TYPES: &[&str] = &["identifier", "name", "property_identifier", "type_identifier", "field_identifier"];

fn node_name(node: Node, content_bytes: &[u8]) -> String {
    let text = |n: Node| String::from_utf8_lossy(&content_bytes[n.start_byte()..n.end_byte()]).into_owned();
    let line = node.start_position().row + 1;

    match node.kind() {
        "section" | "heading" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if matches!(child.kind(), "atx_heading" | "setext_heading") {
                    let cleaned = text(child).trim().trim_start_matches('#').trim().chars().take(50).collect::<String>();
                    return cleaned;
                }
            }
            let whole = text(node);
            let first_line = whole.lines().next().unwrap_or("");
            let cleaned: String = first_line.trim().trim_start_matches('#').trim().chars().take(50).collect();
            if cleaned.is_empty() {
                format!("section_line_{line}")
            } else {
                cleaned
            }
        }
        "arrow_function" => {
            if let Some(parent) = node.parent() {
                if matches!(parent.kind(), "variable_declarator" | "lexical_declaration") {
                    let mut cursor = parent.walk();
                    for child in parent.children(&mut cursor) {
                        if child.kind() == "identifier" {
                            return text(child);
                        }
                    }
                }
            }
            format!("arrow_fn_line_{line}")
        }
        kind @ ("object" | "block_mapping") => {
            if let Some(parent) = node.parent() {
                if parent.kind() == "pair" {
                    let mut cursor = parent.walk();
                    for child in parent.children(&mut cursor) {
                        if matches!(child.kind(), "string" | "flow_node" | "identifier") {
                            let key = text(child);
                            return key.trim_matches(|c| c == '"' || c == '\'').chars().take(30).collect();
                        }
                    }
                }
            }
            format!("{kind}_line_{line}")
        }
        kind @ ("array" | "block_sequence") => {
            if let Some(parent) = node.parent() {
                if parent.kind() == "pair" {
                    let mut cursor = parent.walk();
                    for child in parent.children(&mut cursor) {
                        if matches!(child.kind(), "string" | "flow_node" | "identifier") {
                            let key = text(child);
                            let cleaned: String = key.trim_matches(|c| c == '"' || c == '\'').chars().take(20).collect();
                            return format!("{cleaned}_array");
                        }
                    }
                }
            }
            format!("{kind}_line_{line}")
        }
        kind => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if IDENTIFIER_TYPES.contains(&child.kind()) {
                    return text(child);
                }
            }
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                let mut gc_cursor = child.walk();
                for grandchild in child.children(&mut gc_cursor) {
                    if IDENTIFIER_TYPES.contains(&grandchild.kind()) {
                        return text(grandchild);
                    }
                }
            }
            format!("anonymous_{kind}_line_{line}")
        }
    }
}

/// A standalone fallback node for an entire file, used when no grammar is
/// available or the tree yielded no target nodes (C3).
pub fn file_level_node(file_name: &str, content: &str) -> RawNode {
    RawNode {
        id: Uuid::new_v4().to_string(),
        node_type: "file".to_string(),
        name: file_name.to_string(),
        content: content.to_string(),
        start_byte: 0,
        end_byte: content.len(),
        start_line: 1,
        end_line: content.lines().count().max(1),
        parent_id: None,
        parent_type: None,
        parent_name: None,
        children_ids: Vec::new(),
        is_parent: false,
        language: String::new(),
        cell_index: None,
        cell_type: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_nodes_rust_function() {
        let mut parser = crate::grammar::get_parser("rust").expect("rust grammar");
        let src = "fn greet(name: &str) -> String { name.to_string() }";
        let tree = parser.parse(src, None).unwrap();
        let nodes = extract_nodes(tree.root_node(), src, "rust");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_type, "function_item");
        assert_eq!(nodes[0].name, "greet");
    }

    #[test]
    fn extract_nodes_rust_impl_is_parent_with_method_child() {
        let mut parser = crate::grammar::get_parser("rust").expect("rust grammar");
        let src = "struct S;\nimpl S {\n    fn f(&self) {}\n}\n";
        let tree = parser.parse(src, None).unwrap();
        let nodes = extract_nodes(tree.root_node(), src, "rust");
        let impl_node = nodes.iter().find(|n| n.node_type == "impl_item").unwrap();
        assert!(impl_node.is_parent);
        let fn_node = nodes.iter().find(|n| n.node_type == "function_item").unwrap();
        assert_eq!(fn_node.parent_id.as_deref(), Some(impl_node.id.as_str()));
        assert!(impl_node.children_ids.contains(&fn_node.id));
    }

    #[test]
    fn extract_nodes_unknown_language_returns_empty() {
        let mut parser = crate::grammar::get_parser("rust").expect("rust grammar");
        let src = "fn f() {}";
        let tree = parser.parse(src, None).unwrap();
        assert!(extract_nodes(tree.root_node(), src, "unknown").is_empty());
    }

    #[test]
    fn file_level_node_spans_whole_content() {
        let node = file_level_node("a.rs", "line one\nline two\n");
        assert_eq!(node.node_type, "file");
        assert_eq!(node.start_line, 1);
        assert_eq!(node.end_line, 2);
    }
}
