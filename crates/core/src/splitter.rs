//! Token-bounded chunk splitting (C7): breaks an oversized [`Chunk`] into
//! line-aligned pieces under `max_tokens`, seeding each successive piece with
//! a backward-scanned overlap window — a direct port of `split_chunk`.

use uuid::Uuid;

use crate::error::{Result, ValidationError};
use crate::tokenizer::count_tokens;
use crate::types::Chunk;

/// Splits `chunk` if its content exceeds `max_tokens`, otherwise returns it
/// untouched as the sole element. Rejects `overlap >= max_tokens`, since an
/// overlap window that size (or larger) would never let a split shrink.
pub fn split_chunk(chunk: Chunk, max_tokens: usize, overlap: usize) -> Result<Vec<Chunk>> {
    if max_tokens == 0 {
        return Err(ValidationError::InvalidInput("max_tokens must be greater than 0".into()).into());
    }
    if overlap >= max_tokens {
        return Err(ValidationError::InvalidInput(format!(
            "chunk_overlap ({overlap}) must be strictly less than max_tokens ({max_tokens})"
        ))
        .into());
    }

    if chunk.content.is_empty() {
        return Ok(vec![chunk]);
    }

    let total_tokens = count_tokens(&chunk.content);
    if total_tokens <= max_tokens {
        return Ok(vec![chunk]);
    }

    let lines: Vec<&str> = chunk.content.lines().collect();
    let mut splits = Vec::new();
    let mut current_split: Vec<&str> = Vec::new();
    let mut current_tokens = 0usize;

    for line in &lines {
        let line_tokens = count_tokens(line);

        if current_tokens + line_tokens > max_tokens && !current_split.is_empty() {
            let split_content = current_split.join("\n");
            splits.push(create_split_chunk(&chunk, split_content, splits.len()));

            let overlap_lines = overlap_lines(&current_split, overlap);
            current_tokens = overlap_lines.iter().map(|l| count_tokens(l)).sum();
            current_split = overlap_lines;
        }

        current_split.push(line);
        current_tokens += line_tokens;
    }

    if !current_split.is_empty() {
        let split_content = current_split.join("\n");
        splits.push(create_split_chunk(&chunk, split_content, splits.len()));
    }

    if splits.is_empty() {
        Ok(vec![chunk])
    } else {
        Ok(splits)
    }
}

fn create_split_chunk(original: &Chunk, content: String, split_index: usize) -> Chunk {
    let enriched_content = rebuild_enriched_header(original, &content);
    let token_count = count_tokens(&content);

    Chunk {
        id: Uuid::new_v4().to_string(),
        content,
        enriched_content,
        file_path: original.file_path.clone(),
        language: original.language.clone(),
        node_type: original.node_type.clone(),
        node_name: original.node_name.clone(),
        start_line: original.start_line,
        end_line: original.end_line,
        start_byte: original.start_byte,
        end_byte: original.end_byte,
        hash: original.hash.clone(),
        parent_id: original.parent_id.clone(),
        parent_type: original.parent_type.clone(),
        parent_name: original.parent_name.clone(),
        children_ids: original.children_ids.clone(),
        is_parent: original.is_parent,
        locations: original.locations.clone(),
        is_split: true,
        split_index: Some(split_index),
        original_id: Some(original.id.clone()),
        original_hash: Some(original.hash.clone()),
        token_count: Some(token_count),
    }
}

/// Rebuilds the same header [`crate::collector`] would, against the split's
/// own content — the original's metadata (file, language, type, symbol,
/// parent, line range) is unchanged by splitting, so only the content differs.
fn rebuild_enriched_header(original: &Chunk, content: &str) -> String {
    let mut parts = Vec::new();
    if let (Some(name), type_) = (original.parent_name.as_deref(), original.parent_type.as_deref()) {
        parts.push(format!("Parent: {name} ({})", type_.unwrap_or("unknown")));
    }
    if !original.file_path.is_empty() {
        parts.push(format!("File: {}", original.file_path));
    }
    if !original.language.is_empty() {
        parts.push(format!("Language: {}", original.language));
    }
    if !original.node_type.is_empty() {
        parts.push(format!("Type: {}", original.node_type));
    }
    if !original.node_name.is_empty() {
        parts.push(format!("Symbol: {}", original.node_name));
    }
    parts.push(format!("Lines: {}-{}", original.start_line, original.end_line));
    let header = parts.join("\n");
    if header.is_empty() {
        content.to_string()
    } else {
        format!("{header}\n\n{content}")
    }
}

/// Works backward from the end of `lines`, collecting whole lines while their
/// cumulative token count stays within `overlap_tokens`.
fn overlap_lines<'a>(lines: &[&'a str], overlap_tokens: usize) -> Vec<&'a str> {
    if overlap_tokens == 0 || lines.is_empty() {
        return Vec::new();
    }

    let mut overlap = Vec::new();
    let mut tokens = 0usize;
    for line in lines.iter().rev() {
        let line_tokens = count_tokens(line);
        if tokens + line_tokens > overlap_tokens {
            break;
        }
        overlap.insert(0, *line);
        tokens += line_tokens;
    }
    overlap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_chunk(content: &str) -> Chunk {
        Chunk {
            id: "orig".into(),
            content: content.into(),
            enriched_content: content.into(),
            file_path: "x.rs".into(),
            language: "rust".into(),
            node_type: "function_item".into(),
            node_name: "f".into(),
            start_line: 1,
            end_line: 100,
            start_byte: 0,
            end_byte: content.len(),
            hash: "h".into(),
            parent_id: None,
            parent_type: None,
            parent_name: None,
            children_ids: vec![],
            is_parent: false,
            locations: vec!["x.rs:1-100".into()],
            is_split: false,
            split_index: None,
            original_id: None,
            original_hash: None,
            token_count: None,
        }
    }

    #[test]
    fn split_chunk_small_content_is_unchanged() {
        let chunk = base_chunk("fn f() {}");
        let splits = split_chunk(chunk.clone(), 512, 50).unwrap();
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].id, chunk.id);
        assert!(!splits[0].is_split);
    }

    #[test]
    fn split_chunk_empty_content_is_unchanged() {
        let chunk = base_chunk("");
        let splits = split_chunk(chunk, 10, 2).unwrap();
        assert_eq!(splits.len(), 1);
    }

    #[test]
    fn split_chunk_overlap_equal_to_max_tokens_is_rejected() {
        let chunk = base_chunk("fn f() {}");
        assert!(split_chunk(chunk, 50, 50).is_err());
    }

    #[test]
    fn split_chunk_overlap_greater_than_max_tokens_is_rejected() {
        let chunk = base_chunk("fn f() {}");
        assert!(split_chunk(chunk, 50, 51).is_err());
    }

    #[test]
    fn split_chunk_large_content_produces_multiple_splits_with_new_ids() {
        let big_content: String = (0..500).map(|i| format!("let x{i} = {i};\n")).collect();
        let chunk = base_chunk(&big_content);
        let splits = split_chunk(chunk.clone(), 50, 10).unwrap();
        assert!(splits.len() > 1);
        for (i, split) in splits.iter().enumerate() {
            assert!(split.is_split);
            assert_eq!(split.split_index, Some(i));
            assert_eq!(split.original_id.as_deref(), Some("orig"));
            assert_eq!(split.original_hash.as_deref(), Some("h"));
            assert_ne!(split.id, "orig");
            assert!(split.token_count.unwrap() <= 50 || i == splits.len() - 1);
        }
    }

    #[test]
    fn split_chunk_preserves_line_range_metadata_across_splits() {
        let big_content: String = (0..500).map(|i| format!("let x{i} = {i};\n")).collect();
        let chunk = base_chunk(&big_content);
        let splits = split_chunk(chunk, 50, 10).unwrap();
        for split in &splits {
            assert_eq!(split.start_line, 1);
            assert_eq!(split.end_line, 100);
        }
    }

    #[test]
    fn overlap_lines_respects_token_budget() {
        let lines = vec!["a", "b", "c", "d"];
        let overlap = overlap_lines(&lines, 2);
        assert!(overlap.len() <= lines.len());
        assert_eq!(overlap.last(), Some(&"d"));
    }
}
