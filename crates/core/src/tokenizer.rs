//! Token counting (C8): a model-keyed, cached BPE tokenizer so chunk sizes
//! measured here line up with what the embedding provider actually bills and
//! truncates against. Every encoding is built once per model name and reused
//! for the lifetime of the process.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Encoding used for any model this crate doesn't have a specific mapping
/// for — `cl100k_base`, shared by the embedding models and GPT-4 family.
const DEFAULT_ENCODING: &str = "cl100k_base";

fn encoding_for_model(model: &str) -> &'static str {
    match model {
        "text-embedding-3-large" | "text-embedding-3-small" | "text-embedding-ada-002" => "cl100k_base",
        _ => DEFAULT_ENCODING,
    }
}

struct Cache {
    encoders: Mutex<HashMap<&'static str, &'static CoreBPE>>,
    warned: Mutex<std::collections::HashSet<String>>,
}

fn cache() -> &'static Cache {
    static CACHE: OnceLock<Cache> = OnceLock::new();
    CACHE.get_or_init(|| Cache {
        encoders: Mutex::new(HashMap::new()),
        warned: Mutex::new(std::collections::HashSet::new()),
    })
}

fn build_encoding(name: &str) -> CoreBPE {
    match name {
        "cl100k_base" => tiktoken_rs::cl100k_base().expect("cl100k_base ships with tiktoken-rs"),
        "o200k_base" => tiktoken_rs::o200k_base().expect("o200k_base ships with tiktoken-rs"),
        "p50k_base" => tiktoken_rs::p50k_base().expect("p50k_base ships with tiktoken-rs"),
        _ => tiktoken_rs::cl100k_base().expect("cl100k_base ships with tiktoken-rs"),
    }
}

/// Returns the cached encoder for `model`, building and leaking it into the
/// process-wide cache on first use. Unrecognized models fall back to
/// [`DEFAULT_ENCODING`] and log a warning exactly once per model name.
fn encoder_for(model: &str) -> &'static CoreBPE {
    let encoding_name = encoding_for_model(model);
    if encoding_name == DEFAULT_ENCODING && !known_model(model) {
        let mut warned = cache().warned.lock().unwrap();
        if warned.insert(model.to_string()) {
            warn!(model, fallback = DEFAULT_ENCODING, "unrecognized model, using default encoding");
        }
    }

    let mut encoders = cache().encoders.lock().unwrap();
    if let Some(enc) = encoders.get(encoding_name) {
        return enc;
    }
    // Leaked intentionally: encodings are process-wide and immutable after
    // first load, so a `'static` reference is the cheapest way to hand them
    // out to concurrent callers without cloning the BPE tables.
    let boxed: &'static CoreBPE = Box::leak(Box::new(build_encoding(encoding_name)));
    encoders.insert(encoding_name, boxed);
    boxed
}

fn known_model(model: &str) -> bool {
    matches!(
        model,
        "text-embedding-3-large" | "text-embedding-3-small" | "text-embedding-ada-002"
    )
}

/// Number of BPE tokens `text` would cost under `model`'s encoding. Returns
/// `0` for empty input. Pure otherwise: same `(model, text)` always yields
/// the same count.
pub fn count_tokens_for_model(model: &str, text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    encoder_for(model).encode_with_special_tokens(text).len()
}

/// Convenience wrapper over [`count_tokens_for_model`] using the default
/// embedding model's encoding, for callers (the splitter, most tests) that
/// don't otherwise need to thread a model name through.
pub fn count_tokens(text: &str) -> usize {
    count_tokens_for_model("text-embedding-3-large", text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_tokens_empty_is_zero() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn count_tokens_nonempty_is_positive() {
        assert!(count_tokens("hello world") > 0);
    }

    #[test]
    fn count_tokens_longer_text_has_more_tokens() {
        assert!(count_tokens("def hello():\n    pass\n") > count_tokens("hi"));
    }

    #[test]
    fn count_tokens_for_model_unknown_model_falls_back_to_default() {
        let a = count_tokens_for_model("some-made-up-model", "hello world");
        let b = count_tokens_for_model("text-embedding-3-large", "hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn count_tokens_for_model_caches_across_calls() {
        let first = count_tokens_for_model("text-embedding-ada-002", "a function body");
        let second = count_tokens_for_model("text-embedding-ada-002", "a function body");
        assert_eq!(first, second);
    }
}
