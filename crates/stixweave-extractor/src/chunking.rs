//! Splitting long documents into overlapping chunks

use crate::error::ExtractorError;
use stixweave_domain::Chunk;

/// Splits text into fixed-size, overlapping chunks
///
/// Lengths and offsets are counted in characters, never bytes, so chunk
/// boundaries never fall inside a multi-byte character.
///
/// # Examples
///
/// ```
/// use stixweave_extractor::Segmenter;
///
/// let segmenter = Segmenter::new(2000, 200).unwrap();
/// let chunks = segmenter.segment(&"x".repeat(7000));
///
/// assert_eq!(chunks.len(), 4);
/// assert_eq!(chunks[1].start_offset, 1800);
/// assert_eq!(chunks[3].end_offset, 7000);
/// assert!(chunks.iter().all(|c| c.total == 4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    chunk_size: usize,
    overlap: usize,
}

impl Segmenter {
    /// Create a segmenter
    ///
    /// # Errors
    ///
    /// Returns `ExtractorError::Segmentation` unless `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ExtractorError> {
        if chunk_size == 0 {
            return Err(ExtractorError::Segmentation(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(ExtractorError::Segmentation(format!(
                "overlap {} must be smaller than chunk_size {}",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Characters between consecutive chunk starts
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Number of chunks produced for a text of `len` characters
    pub fn expected_count(&self, len: usize) -> usize {
        if len <= self.chunk_size {
            return 1;
        }
        (len - self.overlap).div_ceil(self.stride())
    }

    /// Split `text` into chunks
    ///
    /// A text no longer than `chunk_size` yields exactly one chunk holding the
    /// trimmed input. Longer texts yield `expected_count` chunks with no gaps,
    /// consecutive chunks sharing exactly `overlap` characters.
    pub fn segment(&self, text: &str) -> Vec<Chunk> {
        let len = text.chars().count();

        if len <= self.chunk_size {
            let leading = text.len() - text.trim_start().len();
            let trimmed = text.trim();
            let start_offset = text[..leading].chars().count();
            return vec![Chunk {
                index: 0,
                total: 1,
                text: trimmed.to_string(),
                start_offset,
                end_offset: start_offset + trimmed.chars().count(),
            }];
        }

        // Byte position of every character boundary, including the end
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        let total = self.expected_count(len);
        (0..total)
            .map(|index| {
                let start = index * self.stride();
                let end = (start + self.chunk_size).min(len);
                Chunk {
                    index,
                    total,
                    text: text[bounds[start]..bounds[end]].to_string(),
                    start_offset: start,
                    end_offset: end,
                }
            })
            .collect()
    }
}
