//! Text chunks produced by segmentation

use serde::{Deserialize, Serialize};

/// A contiguous, immutable slice of the input document
///
/// Offsets are character offsets into the original input, `end_offset` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position in the sequence
    pub index: usize,

    /// Number of chunks in the sequence
    pub total: usize,

    /// Chunk text
    pub text: String,

    /// First character offset
    pub start_offset: usize,

    /// One past the last character offset
    pub end_offset: usize,
}

impl Chunk {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Human-facing label, 1-based (`chunk 2/5`)
    pub fn label(&self) -> String {
        format!("chunk {}/{}", self.index + 1, self.total)
    }
}
