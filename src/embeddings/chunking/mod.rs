
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

/// An overlapping slice of a document's text, the unit of embedding and
/// retrieval. Offsets are Unicode scalar value positions into the parent
/// document's text, and `text` is the exact character window
/// `[char_start, char_end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic id, `"{document_id}_{index}"`
    pub chunk_id: String,
    /// Id of the document this chunk was cut from
    pub document_id: String,
    /// Position of this chunk within the document
    pub index: usize,
    /// The chunk text
    pub text: String,
    /// Start offset in the document, in chars (inclusive)
    pub char_start: usize,
    /// End offset in the document, in chars (exclusive)
    pub char_end: usize,
}

/// Configuration for text chunking. Sizes are in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size
    pub chunk_size: usize,
    /// Number of characters shared between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 150,
        }
    }
}

impl ChunkingConfig {
    /// Requires `0 < overlap < chunk_size`. Invalid parameters are rejected,
    /// never clamped.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.overlap == 0 || self.overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "overlap must be greater than zero and less than the chunk size ({} vs {})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Split a document's text into overlapping chunks.
///
/// Chunks are exact character windows over the input: each chunk ends at the
/// rightmost paragraph boundary that fits within `chunk_size`, or hard-cuts
/// at `chunk_size` when no boundary is usable, and the next chunk starts
/// `overlap` characters before the previous one ended. Consecutive chunks
/// therefore share exactly `overlap` characters, no chunk exceeds
/// `chunk_size`, and the chunks jointly cover the whole input.
///
/// Empty or whitespace-only input yields no chunks. The function is pure:
/// the same input and configuration always produce the same chunks, which is
/// what makes re-ingestion comparisons meaningful.
#[inline]
pub fn chunk_document(document_id: &str, text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let breaks = paragraph_breaks(&chars);
    let total = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    loop {
        if total - start <= config.chunk_size {
            chunks.push(build_chunk(document_id, index, &chars, start, total));
            break;
        }

        let limit = start + config.chunk_size;
        // Rightmost paragraph boundary inside the window, far enough past
        // the carried overlap to keep the cursor moving forward.
        let in_window = breaks.partition_point(|&b| b <= limit);
        let end = breaks[..in_window]
            .iter()
            .rev()
            .find(|&&b| b > start + config.overlap)
            .copied()
            .unwrap_or(limit);

        chunks.push(build_chunk(document_id, index, &chars, start, end));
        index += 1;
        start = end - config.overlap;
    }

    debug!(
        "chunked document '{}' into {} chunks ({} chars)",
        document_id,
        chunks.len(),
        total
    );

    Ok(chunks)
}

fn build_chunk(document_id: &str, index: usize, chars: &[char], start: usize, end: usize) -> Chunk {
    Chunk {
        chunk_id: format!("{}_{}", document_id, index),
        document_id: document_id.to_string(),
        index,
        text: chars[start..end].iter().collect(),
        char_start: start,
        char_end: end,
    }
}

/// Positions where a new paragraph begins: the first character following a
/// whitespace run that contains at least two newlines. A trailing blank run
/// produces no boundary since the final chunk always extends to the end.
fn paragraph_breaks(chars: &[char]) -> Vec<usize> {
    let mut breaks = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '\n' {
            let mut j = i + 1;
            let mut newlines = 1;
            while j < chars.len() && chars[j].is_whitespace() {
                if chars[j] == '\n' {
                    newlines += 1;
                }
                j += 1;
            }
            if newlines >= 2 && j < chars.len() {
                breaks.push(j);
            }
            i = j;
        } else {
            i += 1;
        }
    }

    breaks
}
