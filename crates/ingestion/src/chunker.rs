//! Text chunking module
//!
//! Splits item documents into semantic chunks for embedding. The splitter
//! prefers paragraph and sentence boundaries; a repair pass rejoins date
//! expressions that would otherwise straddle a chunk boundary.

use coursemate_common::config::ChunkingConfig;
use regex_lite::Regex;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// A text chunk with its offset within the source document
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The chunk content
    pub text: String,
    /// Offset of this chunk in the document
    pub index: usize,
}

/// Split a document into chunks for embedding
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let splitter = TextSplitter::new(ChunkConfig::new(config.chunk_size));
    let pieces: Vec<String> = splitter.chunks(text).map(|c| c.to_string()).collect();
    let pieces = repair_date_boundaries(pieces);

    debug!(
        input_len = text.len(),
        chunk_count = pieces.len(),
        chunk_size = config.chunk_size,
        "Text chunked"
    );

    let mut result: Vec<TextChunk> = pieces
        .into_iter()
        .filter(|piece| piece.trim().len() >= config.min_chunk_size)
        .enumerate()
        .map(|(index, text)| TextChunk { text, index })
        .collect();

    // A short document still yields one chunk rather than vanishing.
    if result.is_empty() {
        result.push(TextChunk {
            text: text.trim().to_string(),
            index: 0,
        });
    }

    result
}

/// Rejoin chunks when a date expression spans the boundary, e.g.
/// "... due Sept" | "20 in class ...".
fn repair_date_boundaries(pieces: Vec<String>) -> Vec<String> {
    if pieces.len() < 2 {
        return pieces;
    }

    let dangling_tail = Regex::new(
        r"(?i)\b(?:due|by|until|on|jan\w*|feb\w*|mar\w*|apr\w*|may|jun\w*|jul\w*|aug\w*|sep\w*|oct\w*|nov\w*|dec\w*)\.?\s*$",
    )
    .unwrap();
    let date_head = Regex::new(r"^\s*\d{1,2}(?:st|nd|rd|th)?\b").unwrap();

    let mut merged: Vec<String> = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if let Some(last) = merged.last_mut() {
            if dangling_tail.is_match(last) && date_head.is_match(&piece) {
                last.push(' ');
                last.push_str(piece.trim_start());
                continue;
            }
        }
        merged.push(piece);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, min_chunk_size: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            min_chunk_size,
        }
    }

    #[test]
    fn test_basic_chunking() {
        let text = "This is a sentence about coursework. ".repeat(40);
        let chunks = chunk_text(&text, &config(200, 40));

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.len() <= 220);
        }
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
        assert!(chunk_text("   \n", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_short_document_survives_min_size() {
        let chunks = chunk_text("Quiz Friday.", &config(800, 40));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Quiz Friday.");
    }

    #[test]
    fn test_date_is_not_split_across_chunks() {
        let merged = repair_date_boundaries(vec![
            "The group presentation is due Sept".to_string(),
            "20 in class. Bring slides.".to_string(),
        ]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].contains("due Sept 20"));
    }

    #[test]
    fn test_unrelated_boundary_is_left_alone() {
        let pieces = vec![
            "First paragraph about reading.".to_string(),
            "Second paragraph about homework.".to_string(),
        ];
        assert_eq!(repair_date_boundaries(pieces.clone()), pieces);
    }
}
