//! Sentence-aware text splitter with overlap.
//!
//! Splits document text into bounded-size pieces suitable for embedding.
//! Sizes are counted in characters (Unicode scalar values), for both the
//! chunk size and the overlap.
//!
//! # Algorithm
//!
//! 1. Segment the text into sentences. A sentence ends at `.`, `!` or `?`
//!    followed by whitespace, or at a newline.
//! 2. Hard-split any sentence longer than `chunk_size` at the last
//!    whitespace inside the window (or at exactly `chunk_size` chars).
//! 3. Greedily pack consecutive sentences while the chunk, measured from
//!    the start of its first sentence to the end of its last, stays within
//!    `chunk_size`.
//! 4. When a chunk is flushed, the trailing sentences spanning at most
//!    `chunk_overlap` chars are carried into the next chunk.
//!
//! Every chunk is an exact slice of the input, so source formatting
//! between sentences is preserved.
//!
//! # Example
//!
//! ```rust
//! use secure_rag_core::chunk::{split_text, SplitterConfig};
//!
//! let pieces = split_text("Hello world. Second sentence.", &SplitterConfig::default());
//! assert_eq!(pieces, vec!["Hello world. Second sentence.".to_string()]);
//! ```

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::models::{ChunkMetadata, DocumentChunk};

pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Size and overlap for [`split_text`], both in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl SplitterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        Ok(())
    }
}

/// Half-open range of char indices into the source text.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

/// Split `text` into ordered, overlapping pieces of at most `chunk_size` chars.
///
/// # Guarantees
///
/// - Deterministic for identical input and configuration.
/// - Empty or whitespace-only text yields no pieces.
/// - Text no longer than `chunk_size` yields exactly one piece (trimmed).
/// - No piece exceeds `chunk_size` chars.
pub fn split_text(text: &str, config: &SplitterConfig) -> Vec<String> {
    let size = config.chunk_size.max(1);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() <= size {
        return vec![trimmed.to_string()];
    }

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let byte_at = |ci: usize| -> usize {
        if ci >= chars.len() {
            text.len()
        } else {
            chars[ci].0
        }
    };
    let slice = |span: Span| -> String { text[byte_at(span.start)..byte_at(span.end)].to_string() };

    let mut units = Vec::new();
    for sentence in sentence_spans(&chars) {
        if sentence.end - sentence.start > size {
            hard_split(&chars, sentence, size, &mut units);
        } else {
            units.push(sentence);
        }
    }

    let mut pieces = Vec::new();
    let mut window: Vec<Span> = Vec::new();

    for unit in units {
        if let (Some(first), Some(last)) = (window.first().copied(), window.last().copied()) {
            if unit.end - first.start > size {
                pieces.push(slice(Span {
                    start: first.start,
                    end: last.end,
                }));

                let keep = window
                    .iter()
                    .rev()
                    .take_while(|s| last.end - s.start <= config.chunk_overlap)
                    .count();
                window.drain(..window.len() - keep);

                while window
                    .first()
                    .is_some_and(|first| unit.end - first.start > size)
                {
                    window.remove(0);
                }
            }
        }
        window.push(unit);
    }

    if let (Some(first), Some(last)) = (window.first(), window.last()) {
        pieces.push(slice(Span {
            start: first.start,
            end: last.end,
        }));
    }

    pieces
}

/// Split `text` and wrap each piece as a [`DocumentChunk`] of `document_id`.
///
/// Chunk indices are contiguous from 0 in source order and every chunk
/// receives a copy of `metadata`.
pub fn chunk_document(
    document_id: &str,
    metadata: &ChunkMetadata,
    text: &str,
    config: &SplitterConfig,
) -> Vec<DocumentChunk> {
    split_text(text, config)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| DocumentChunk::new(document_id, i as i64, piece, metadata.clone()))
        .collect()
}

fn sentence_spans(chars: &[(usize, char)]) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start = 0;
    for i in 0..chars.len() {
        let c = chars[i].1;
        let terminal = matches!(c, '.' | '!' | '?')
            && chars.get(i + 1).map_or(true, |(_, next)| next.is_whitespace());
        if c == '\n' || terminal {
            push_trimmed(chars, start, i + 1, &mut spans);
            start = i + 1;
        }
    }
    push_trimmed(chars, start, chars.len(), &mut spans);
    spans
}

fn push_trimmed(chars: &[(usize, char)], mut start: usize, mut end: usize, out: &mut Vec<Span>) {
    while start < end && chars[start].1.is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].1.is_whitespace() {
        end -= 1;
    }
    if start < end {
        out.push(Span { start, end });
    }
}

/// Break an oversized sentence into pieces of at most `size` chars.
fn hard_split(chars: &[(usize, char)], sentence: Span, size: usize, out: &mut Vec<Span>) {
    let mut start = sentence.start;
    while sentence.end - start > size {
        let limit = start + size;
        match (start + 1..=limit)
            .rev()
            .find(|&j| chars[j].1.is_whitespace())
        {
            Some(cut) => {
                push_trimmed(chars, start, cut, out);
                start = cut;
            }
            None => {
                out.push(Span { start, end: limit });
                start = limit;
            }
        }
        while start < sentence.end && chars[start].1.is_whitespace() {
            start += 1;
        }
    }
    push_trimmed(chars, start, sentence.end, out);
}
