//! Grammar registry (C2): per-language target/parent node-type tables and a
//! thread-safe lazily-initialized [`tree_sitter::Parser`] cache, mirroring the
//! teacher's `language_for_ext` but keyed on the language id instead of the
//! extension, since multiple extensions can share one language.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::warn;
use tree_sitter::{Language, Parser};

/// AST node types that become a [`crate::types::RawNode`] for a language.
/// Languages without an entry here (or without a compiled grammar) fall
/// straight to [`crate::parser`]'s file-level fallback.
pub const NODE_TYPES: &[(&str, &[&str])] = &[
    (
        "python",
        &[
            "function_definition",
            "class_definition",
            "decorated_definition",
            "import_statement",
            "import_from_statement",
        ],
    ),
    (
        "javascript",
        &[
            "function_declaration",
            "function_expression",
            "arrow_function",
            "class_declaration",
            "method_definition",
            "import_statement",
        ],
    ),
    (
        "typescript",
        &[
            "function_declaration",
            "function_expression",
            "arrow_function",
            "class_declaration",
            "method_definition",
            "interface_declaration",
            "import_statement",
            "lexical_declaration",
            "expression_statement",
            "export_statement",
        ],
    ),
    (
        "java",
        &[
            "class_declaration",
            "method_declaration",
            "constructor_declaration",
            "interface_declaration",
            "import_declaration",
        ],
    ),
    (
        "go",
        &["function_declaration", "method_declaration", "type_declaration", "import_declaration"],
    ),
    (
        "rust",
        &["function_item", "impl_item", "struct_item", "enum_item", "trait_item", "use_declaration"],
    ),
    ("cpp", &["function_definition", "class_specifier", "struct_specifier", "preproc_include"]),
    ("c", &["function_definition", "struct_specifier", "preproc_include"]),
    ("markdown", &["section", "heading", "code_block"]),
];

/// Node types whose children should see a new parent frame. Every other
/// target node type recurses while leaving the parent frame untouched.
pub const PARENT_NODE_TYPES: &[(&str, &[&str])] = &[
    ("python", &["class_definition"]),
    ("javascript", &["class_declaration"]),
    ("typescript", &["class_declaration", "interface_declaration"]),
    ("java", &["class_declaration", "interface_declaration"]),
    ("go", &["type_declaration"]),
    ("rust", &["impl_item", "struct_item", "enum_item", "trait_item"]),
    ("cpp", &["class_specifier", "struct_specifier"]),
    ("c", &["struct_specifier"]),
    ("markdown", &[]),
];

pub fn node_types_for(language: &str) -> &'static [&'static str] {
    NODE_TYPES
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, types)| *types)
        .unwrap_or(&[])
}

pub fn parent_node_types_for(language: &str) -> &'static [&'static str] {
    PARENT_NODE_TYPES
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, types)| *types)
        .unwrap_or(&[])
}

/// Builds the tree-sitter [`Language`] for a language id, if a grammar crate
/// is compiled in. Gated behind the `treesitter` feature so a `--no-default-features`
/// build still links and falls back to file-level chunking everywhere.
#[cfg(feature = "treesitter")]
fn language_for(language: &str) -> Option<Language> {
    match language {
        "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
        "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "python" => Some(tree_sitter_python::LANGUAGE.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        "c" => Some(tree_sitter_c::LANGUAGE.into()),
        "cpp" => Some(tree_sitter_cpp::LANGUAGE.into()),
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        "markdown" => Some(tree_sitter_md::language()),
        _ => None,
    }
}

#[cfg(not(feature = "treesitter"))]
fn language_for(_language: &str) -> Option<Language> {
    None
}

// tree-sitter's `Parser` is not `Sync`; we only ever hand out a fresh clone
// built from the cached `Language`, never the parser itself, so the cache
// actually stores languages. Kept as a map of languages to dodge repeated
// `Language::from` construction, which is the expensive part.
struct LanguageCache {
    languages: RwLock<HashMap<String, Language>>,
}

static LANGUAGE_CACHE: std::sync::OnceLock<LanguageCache> = std::sync::OnceLock::new();

fn cache() -> &'static LanguageCache {
    LANGUAGE_CACHE.get_or_init(|| LanguageCache { languages: RwLock::new(HashMap::new()) })
}

/// Returns a freshly constructed [`Parser`] for `language`, or `None` if no
/// grammar is registered/compiled for it. The underlying [`Language`] is
/// cached; fast lock-free read path, double-checked-locking insert path —
/// matching the original's `get_parser` cache discipline, adapted because
/// `Parser` itself can't be shared across threads the way a Python object can.
pub fn get_parser(language: &str) -> Option<Parser> {
    {
        let read = cache().languages.read().unwrap();
        if let Some(lang) = read.get(language) {
            let mut parser = Parser::new();
            return parser.set_language(lang).is_ok().then_some(parser);
        }
    }

    let mut write = cache().languages.write().unwrap();
    if let Some(lang) = write.get(language) {
        let mut parser = Parser::new();
        return parser.set_language(lang).is_ok().then_some(parser);
    }

    let lang = match language_for(language) {
        Some(lang) => lang,
        None => {
            warn!(language, "no grammar registered for language");
            return None;
        }
    };

    let mut parser = Parser::new();
    let ok = parser.set_language(&lang).is_ok();
    write.insert(language.to_string(), lang);
    ok.then_some(parser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_types_known_language() {
        assert!(node_types_for("rust").contains(&"function_item"));
        assert!(node_types_for("unknown_language").is_empty());
    }

    #[test]
    fn parent_node_types_known_language() {
        assert!(parent_node_types_for("rust").contains(&"impl_item"));
        assert!(parent_node_types_for("markdown").is_empty());
    }

    #[cfg(feature = "treesitter")]
    #[test]
    fn get_parser_builds_and_caches_rust() {
        let p1 = get_parser("rust");
        assert!(p1.is_some());
        let p2 = get_parser("rust");
        assert!(p2.is_some());
    }

    #[test]
    fn get_parser_unknown_language_returns_none() {
        assert!(get_parser("not-a-real-language").is_none());
    }
}
