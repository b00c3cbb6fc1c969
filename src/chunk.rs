//! Overlapping fixed-size text chunker.
//!
//! Splits extracted document text into windows of `chunk_size` characters
//! that slide by `chunk_size - overlap`, so consecutive chunks share
//! `overlap` characters of context. The last window may be shorter. Each
//! window is whitespace-trimmed and empty windows are dropped.
//!
//! Windowing is character-based, so multi-byte UTF-8 text never splits
//! inside a code point. The same input and parameters always produce the
//! same chunk sequence.

use crate::error::PipelineError;

/// Split `text` into overlapping chunks.
///
/// Returns an empty vector when `text` is empty or entirely whitespace.
///
/// # Errors
///
/// `Validation` when `chunk_size` is zero or `overlap >= chunk_size`
/// (the sliding step would be non-positive).
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, PipelineError> {
    if chunk_size == 0 {
        return Err(PipelineError::Validation(
            "chunk_size must be > 0".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(PipelineError::Validation(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end >= chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", 100, 10).unwrap().is_empty());
        assert!(split_text("   \n\t  ", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn overlap_equal_to_chunk_size_is_rejected() {
        let err = split_text("some text", 10, 10).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn overlap_larger_than_chunk_size_is_rejected() {
        let err = split_text("some text", 10, 25).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = split_text("hello world", 100, 10).unwrap();
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn windows_slide_by_chunk_size_minus_overlap() {
        // 2500 chars, size 1000, overlap 100: windows start at 0, 900,
        // 1800 giving raw lengths 1000, 1000, 700.
        let text: String = std::iter::repeat("abcde").take(500).collect();
        assert_eq!(text.len(), 2500);
        let chunks = split_text(&text, 1000, 100).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks[2].len(), 700);
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text: String = ('a'..='z').cycle().take(60).collect();
        let chunks = split_text(&text, 20, 5).unwrap();
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(5).collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn overlap_removed_reassembly_reconstructs_text() {
        // Whitespace-free input, so trimming is the identity and the
        // round-trip is exact.
        let text: String = ('0'..='9').cycle().take(137).collect();
        let chunks = split_text(&text, 30, 7).unwrap();

        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(7));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn multibyte_text_never_splits_code_points() {
        let text: String = std::iter::repeat('é').take(50).collect();
        let chunks = split_text(&text, 20, 4).unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().all(|ch| ch == 'é'));
        }
    }

    #[test]
    fn deterministic() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";
        let a = split_text(text, 16, 4).unwrap();
        let b = split_text(text, 16, 4).unwrap();
        assert_eq!(a, b);
    }
}
