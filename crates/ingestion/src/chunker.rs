//! Text chunking module
//!
//! Splits normalized page text into overlapping fixed-size windows for
//! embedding.

use studyforge_common::db::NewChunk;
use tracing::debug;

use crate::pdf::PdfPage;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 200,
        }
    }
}

/// A text chunk with its zero-based sequence index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    pub index: i32,
}

/// Collapse all whitespace runs to single spaces
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into overlapping chunks (sliding window).
///
/// Windows are `[start, start + chunk_size)`, trimmed; empty windows are
/// skipped. Consecutive windows overlap by exactly `chunk_overlap` characters
/// except possibly the final one. When `chunk_overlap >= chunk_size` the
/// advance is clamped to `chunk_size` so `start` never decreases and the
/// loop always terminates.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let total_len = chars.len();

    if total_len == 0 || config.chunk_size == 0 {
        return chunks;
    }

    let advance = if config.chunk_overlap < config.chunk_size {
        config.chunk_size - config.chunk_overlap
    } else {
        config.chunk_size
    };

    let mut start = 0;
    let mut index = 0;

    while start < total_len {
        let end = (start + config.chunk_size).min(total_len);
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();

        if !trimmed.is_empty() {
            chunks.push(TextChunk {
                content: trimmed.to_string(),
                index,
            });
            index += 1;
        }

        if end == total_len {
            break;
        }
        start += advance;
    }

    debug!(
        input_len = total_len,
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "Text chunked"
    );

    chunks
}

/// Chunk each page's text, accumulating a strictly increasing global chunk
/// index. A chunk never spans pages: its start and end page are the page it
/// came from. Pages with no non-whitespace text are skipped.
pub fn collect_page_chunks(pages: &[PdfPage], config: &ChunkingConfig) -> Vec<NewChunk> {
    let mut result = Vec::new();
    let mut next_index: i32 = 0;

    for page in pages {
        let normalized = normalize_whitespace(&page.text);
        if normalized.is_empty() {
            continue;
        }

        for chunk in chunk_text(&normalized, config) {
            result.push(NewChunk {
                chunk_index: next_index,
                content: chunk.content,
                page_start: page.number as i32,
                page_end: page.number as i32,
            });
            next_index += 1;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
        }
    }

    #[test]
    fn test_windows_overlap_exactly() {
        // No whitespace, so trimming is a no-op and window math is exact
        let text: String = ('a'..='z').cycle().take(100).collect();
        let cfg = config(30, 10);

        let chunks = chunk_text(&text, &cfg);

        for pair in chunks.windows(2) {
            let prev = &pair[0].content;
            let next = &pair[1].content;
            if next.len() >= cfg.chunk_overlap {
                let tail = &prev[prev.len() - cfg.chunk_overlap.min(prev.len())..];
                assert!(next.starts_with(tail), "overlap mismatch: {prev} -> {next}");
            }
        }
    }

    #[test]
    fn test_full_coverage_without_whitespace() {
        let text: String = ('a'..='z').cycle().take(95).collect();
        let cfg = config(30, 10);

        let chunks = chunk_text(&text, &cfg);

        // Reconstruct by dropping each later chunk's overlap prefix
        let mut rebuilt = chunks[0].content.clone();
        for chunk in &chunks[1..] {
            let keep = chunk.content.len().saturating_sub(cfg.chunk_overlap);
            rebuilt.push_str(&chunk.content[chunk.content.len() - keep..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_every_word_covered() {
        let text = normalize_whitespace(&"lorem ipsum dolor sit amet ".repeat(40));
        let chunks = chunk_text(&text, &config(120, 30));

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(!chunk.content.is_empty());
        }
        for word in ["lorem", "ipsum", "dolor", "sit", "amet"] {
            assert!(chunks.iter().any(|c| c.content.contains(word)));
        }
    }

    #[test]
    fn test_indices_contiguous() {
        let text: String = ('a'..='z').cycle().take(500).collect();
        let chunks = chunk_text(&text, &config(100, 20));

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as i32);
        }
    }

    #[test]
    fn test_overlap_ge_size_terminates() {
        let text: String = ('a'..='z').cycle().take(200).collect();
        // Pathological: overlap >= size must not stall the window
        let chunks = chunk_text(&text, &config(50, 50));

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.last().unwrap().index, 3);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
        assert!(chunk_text("   \n\t ", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_page_chunks_carry_page_bounds_and_global_index() {
        let pages = vec![
            PdfPage { number: 1, text: "first page text ".repeat(20) },
            PdfPage { number: 2, text: "   ".to_string() },
            PdfPage { number: 3, text: "third page text ".repeat(20) },
        ];

        let chunks = collect_page_chunks(&pages, &config(100, 20));

        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i32);
            assert_eq!(chunk.page_start, chunk.page_end);
            assert!(chunk.page_start == 1 || chunk.page_start == 3);
        }
        // The blank page contributed nothing
        assert!(chunks.iter().all(|c| c.page_start != 2));
    }
}
