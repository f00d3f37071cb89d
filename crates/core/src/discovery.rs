//! File Discovery (C1): walk a repository root and yield supported files while
//! honoring ignore rules, the way the teacher's `scan_files` walks a project tree.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::types::FileRecord;

/// Version-control noise, per-language build/cache artifacts, and editor/OS
/// cruft that a repo scan should never descend into.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
    ".next",
    ".nuxt",
    "vendor",
    "*.lock",
    "*.pyc",
    "*.class",
    "*.o",
    "*.obj",
    ".DS_Store",
    ".idea",
    ".vscode",
    ".contextinator",
];

/// Extension (without the leading dot) to language id.
pub const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("py", "python"),
    ("pyi", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("scala", "scala"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("hxx", "cpp"),
    ("cs", "csharp"),
    ("go", "go"),
    ("rs", "rust"),
    ("php", "php"),
    ("rb", "ruby"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("zsh", "shell"),
    ("sql", "sql"),
    ("swift", "swift"),
    ("sol", "solidity"),
    ("lua", "lua"),
    ("ex", "elixir"),
    ("exs", "elixir"),
    ("hs", "haskell"),
    ("ml", "ocaml"),
    ("mli", "ocaml"),
    ("html", "html"),
    ("htm", "html"),
    ("css", "css"),
    ("scss", "css"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("xml", "xml"),
    ("md", "markdown"),
    ("markdown", "markdown"),
    ("ipynb", "notebook"),
    ("prisma", "prisma"),
];

/// Extensionless filenames mapped directly to a language id.
pub const LANGUAGE_FILENAMES: &[(&str, &str)] = &[
    ("Dockerfile", "dockerfile"),
    ("Gemfile", "ruby"),
    ("Rakefile", "ruby"),
];

/// Returns the language id for a path, or `None` if it is not a supported
/// source file. Checked against the extensionless filename table first (it is
/// more specific), then the extension table.
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
        for (name, lang) in LANGUAGE_FILENAMES {
            if *name == file_name {
                return Some(lang);
            }
        }
    }
    let ext = path.extension()?.to_str()?;
    LANGUAGE_EXTENSIONS
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, lang)| *lang)
}

/// Tests `rel_path` and each of its components against `pattern`.
///
/// Patterns containing `*`, `?`, or `[` use glob semantics; otherwise they
/// match a path component by exact equality, so `out` never matches `routes`.
fn pattern_matches(pattern: &str, rel_path: &str, components: &[&str]) -> bool {
    if pattern.contains(['*', '?', '[']) {
        let re = match glob_to_regex(pattern) {
            Some(re) => re,
            None => return false,
        };
        re.is_match(rel_path) || components.iter().any(|c| re.is_match(c))
    } else {
        components.iter().any(|c| *c == pattern)
    }
}

fn glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '|' | '^' | '$' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '[' | ']' => out.push(c),
            other => out.push(other),
        }
    }
    out.push('$');
    regex::Regex::new(&out).ok()
}

fn is_ignored(rel_path: &str, patterns: &[String]) -> bool {
    let normalized = rel_path.replace('\\', "/");
    let components: Vec<&str> = normalized.split('/').collect();
    patterns
        .iter()
        .any(|p| pattern_matches(p, &normalized, &components))
}

/// Walks `root` and returns every supported, non-ignored file in a deterministic
/// order. `extra_ignore` is unioned with [`DEFAULT_IGNORE_PATTERNS`].
pub fn discover(root: &Path, extra_ignore: &[String]) -> Vec<FileRecord> {
    let mut patterns: Vec<String> = DEFAULT_IGNORE_PATTERNS
        .iter()
        .map(|s| s.to_string())
        .collect();
    patterns.extend(extra_ignore.iter().cloned());

    let mut out = Vec::new();
    let mut seen_dirs_pruned: HashSet<PathBuf> = HashSet::new();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };

        let abs_path = entry.path();
        let rel_path = match abs_path.strip_prefix(root) {
            Ok(p) => p.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if rel_path.is_empty() {
            continue;
        }

        if is_ignored(&rel_path, &patterns) {
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                seen_dirs_pruned.insert(abs_path.to_path_buf());
                debug!(path = %rel_path, "pruned ignored directory");
            }
            continue;
        }
        if seen_dirs_pruned
            .iter()
            .any(|pruned| abs_path.starts_with(pruned))
        {
            continue;
        }

        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let Some(language) = language_for_path(abs_path) else {
            continue;
        };

        out.push(FileRecord {
            abs_path: abs_path.to_path_buf(),
            rel_path,
            language: language.to_string(),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn language_for_path_matches_extension_and_filename() {
        assert_eq!(language_for_path(Path::new("a/b.rs")), Some("rust"));
        assert_eq!(language_for_path(Path::new("a/b.py")), Some("python"));
        assert_eq!(language_for_path(Path::new("Dockerfile")), Some("dockerfile"));
        assert_eq!(language_for_path(Path::new("a/b.unknown")), None);
    }

    #[test]
    fn pattern_matches_component_exact_not_substring() {
        let patterns = vec!["out".to_string()];
        assert!(is_ignored("out/file.rs", &patterns));
        assert!(!is_ignored("routes/file.rs", &patterns));
    }

    #[test]
    fn pattern_matches_glob() {
        let patterns = vec!["*.lock".to_string()];
        assert!(is_ignored("Cargo.lock", &patterns));
        assert!(!is_ignored("Cargo.toml", &patterns));
    }

    #[test]
    fn discover_prunes_ignored_dirs_and_filters_unsupported_files() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("README"), "no ext").unwrap();

        let files = discover(dir.path(), &[]);
        let rel_paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert!(rel_paths.contains(&"main.rs"));
        assert!(!rel_paths.iter().any(|p| p.starts_with("node_modules")));
        assert!(!rel_paths.contains(&"README"));
    }

    #[test]
    fn discover_is_deterministic_across_runs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.rs"), "").unwrap();
        fs::write(dir.path().join("a.rs"), "").unwrap();
        let first = discover(dir.path(), &[]);
        let second = discover(dir.path(), &[]);
        let first_paths: Vec<&str> = first.iter().map(|f| f.rel_path.as_str()).collect();
        let second_paths: Vec<&str> = second.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(first_paths, second_paths);
    }
}
