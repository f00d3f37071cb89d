//! Jupyter notebook adapter (C5): parses `.ipynb` JSON directly with `serde_json`
//! (there is no `nbformat`-equivalent crate in this ecosystem), extracts each
//! cell's source, and sub-parses code/markdown cells with the regular AST
//! pipeline, prefixing node names with the owning cell — mirroring the
//! original's `parse_notebook`/`_parse_cell_content`.

use serde::Deserialize;
use uuid::Uuid;

use crate::extractor::extract_nodes;
use crate::grammar::get_parser;
use crate::types::{CellType, RawNode};

#[derive(Debug, Deserialize)]
struct NotebookFile {
    #[serde(default)]
    cells: Vec<NotebookCell>,
}

#[derive(Debug, Deserialize)]
struct NotebookCell {
    cell_type: String,
    #[serde(default)]
    source: SourceField,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum SourceField {
    #[default]
    Empty,
    Joined(String),
    Lines(Vec<String>),
}

impl SourceField {
    fn into_string(self) -> String {
        match self {
            SourceField::Empty => String::new(),
            SourceField::Joined(s) => s,
            SourceField::Lines(lines) => lines.join(""),
        }
    }
}

pub struct NotebookParseResult {
    pub nodes: Vec<RawNode>,
    pub has_ast: bool,
}

/// Parses the `.ipynb` file at `content` (already read as a UTF-8 string).
/// Falls back to a single `notebook_file` node covering the whole content if
/// the JSON is malformed, has no cells, or every cell parses to nothing.
pub fn parse_notebook(content: &str, file_name: &str) -> NotebookParseResult {
    let nb: NotebookFile = match serde_json::from_str(content) {
        Ok(nb) => nb,
        Err(_) => return fallback(content, file_name),
    };

    let mut nodes = Vec::new();
    for (cell_index, cell) in nb.cells.into_iter().enumerate() {
        let source = cell.source.into_string();
        if source.trim().is_empty() {
            continue;
        }

        let cell_nodes = match cell.cell_type.as_str() {
            "code" => parse_cell_content(&source, "python", cell_index, CellType::Code),
            "markdown" => parse_cell_content(&source, "markdown", cell_index, CellType::Markdown),
            other => vec![raw_cell_node(&source, other, cell_index)],
        };
        nodes.extend(cell_nodes);
    }

    if nodes.is_empty() {
        return fallback(content, file_name);
    }

    NotebookParseResult { nodes, has_ast: true }
}

fn parse_cell_content(source: &str, language: &str, cell_index: usize, cell_type: CellType) -> Vec<RawNode> {
    let Some(mut parser) = get_parser(language) else {
        return vec![raw_cell_node(source, cell_type.as_str(), cell_index)];
    };
    let Some(tree) = parser.parse(source, None) else {
        return vec![raw_cell_node(source, cell_type.as_str(), cell_index)];
    };

    let mut nodes = extract_nodes(tree.root_node(), source, language);
    if nodes.is_empty() {
        return vec![raw_cell_node(source, cell_type.as_str(), cell_index)];
    }

    for node in &mut nodes {
        node.cell_index = Some(cell_index);
        node.cell_type = Some(cell_type);
        node.name = format!("cell_{}:{}", cell_index + 1, node.name);
    }
    nodes
}

fn raw_cell_node(source: &str, cell_type: &str, cell_index: usize) -> RawNode {
    let lines = source.lines().count().max(1);
    RawNode {
        id: Uuid::new_v4().to_string(),
        node_type: format!("notebook_{cell_type}_cell"),
        name: format!("cell_{}", cell_index + 1),
        content: source.to_string(),
        start_byte: 0,
        end_byte: source.len(),
        start_line: 1,
        end_line: lines,
        parent_id: None,
        parent_type: None,
        parent_name: None,
        children_ids: Vec::new(),
        is_parent: false,
        language: "notebook".to_string(),
        cell_index: Some(cell_index),
        cell_type: parse_cell_type(cell_type),
    }
}

fn parse_cell_type(s: &str) -> Option<CellType> {
    match s {
        "code" => Some(CellType::Code),
        "markdown" => Some(CellType::Markdown),
        _ => Some(CellType::Raw),
    }
}

fn fallback(content: &str, file_name: &str) -> NotebookParseResult {
    let lines = content.lines().count().max(1);
    let node = RawNode {
        id: Uuid::new_v4().to_string(),
        node_type: "notebook_file".to_string(),
        name: file_name.to_string(),
        content: content.to_string(),
        start_byte: 0,
        end_byte: content.len(),
        start_line: 1,
        end_line: lines,
        parent_id: None,
        parent_type: None,
        parent_name: None,
        children_ids: Vec::new(),
        is_parent: false,
        language: "notebook".to_string(),
        cell_index: None,
        cell_type: None,
    };
    NotebookParseResult { nodes: vec![node], has_ast: false }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_notebook_code_cell_produces_named_python_node() {
        let nb = r#"{"cells": [{"cell_type": "code", "source": ["def f():\n", "    pass\n"]}]}"#;
        let result = parse_notebook(nb, "nb.ipynb");
        assert!(result.has_ast);
        assert_eq!(result.nodes.len(), 1);
        assert_eq!(result.nodes[0].name, "cell_1:f");
        assert_eq!(result.nodes[0].cell_index, Some(0));
    }

    #[test]
    fn parse_notebook_raw_cell_becomes_synthetic_node() {
        let nb = r#"{"cells": [{"cell_type": "raw", "source": "some text"}]}"#;
        let result = parse_notebook(nb, "nb.ipynb");
        assert_eq!(result.nodes[0].node_type, "notebook_raw_cell");
    }

    #[test]
    fn parse_notebook_skips_blank_cells() {
        let nb = r#"{"cells": [{"cell_type": "code", "source": "   \n"}, {"cell_type": "code", "source": "x = 1"}]}"#;
        let result = parse_notebook(nb, "nb.ipynb");
        assert_eq!(result.nodes.len(), 1);
    }

    #[test]
    fn parse_notebook_malformed_json_falls_back_to_file_level() {
        let result = parse_notebook("not json at all", "nb.ipynb");
        assert!(!result.has_ast);
        assert_eq!(result.nodes[0].node_type, "notebook_file");
    }

    #[test]
    fn parse_notebook_no_cells_falls_back() {
        let result = parse_notebook(r#"{"cells": []}"#, "nb.ipynb");
        assert!(!result.has_ast);
    }
}
