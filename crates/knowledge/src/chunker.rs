//! Text chunking with configurable size and overlap.
//!
//! Sizes are measured in characters (Unicode scalar values). A window of
//! `chunk_size` characters slides across the document, advancing by
//! `chunk_size - chunk_overlap` each step. Chunk text is never trimmed, so
//! offsets always index the original document exactly.

use crate::types::{Chunk, Document};
use tessera_core::config::RagSettings;
use tessera_core::{AppError, AppResult};

/// Splits documents into overlapping fixed-size chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// # Errors
    /// `InvalidConfiguration` if `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::InvalidConfiguration(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(AppError::InvalidConfiguration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_settings(settings: &RagSettings) -> AppResult<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Distance between the starts of consecutive chunks.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Lazy sequence of the document's chunks.
    ///
    /// Calling this again restarts from the first chunk; the returned iterator
    /// is also `Clone`. An empty document yields no chunks.
    pub fn chunks<'a>(&self, document: &'a Document) -> Chunks<'a> {
        let mut boundaries: Vec<usize> = document.text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(document.text.len());

        Chunks {
            document,
            boundaries,
            chunk_size: self.chunk_size,
            stride: self.stride(),
            next_start: 0,
            ordinal: 0,
            finished: document.text.is_empty(),
        }
    }
}

/// Iterator over a document's chunks. See [`Chunker::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document: &'a Document,
    /// Byte offset of every character, plus the text length
    boundaries: Vec<usize>,
    chunk_size: usize,
    stride: usize,
    next_start: usize,
    ordinal: usize,
    finished: bool,
}

impl Chunks<'_> {
    fn char_count(&self) -> usize {
        self.boundaries.len() - 1
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.finished {
            return None;
        }

        let total = self.char_count();
        let start = self.next_start;
        let end = (start + self.chunk_size).min(total);

        let text = &self.document.text[self.boundaries[start]..self.boundaries[end]];
        let chunk = Chunk {
            id: Chunk::make_id(&self.document.id, self.ordinal),
            document_id: self.document.id.clone(),
            ordinal: self.ordinal,
            text: text.to_string(),
            start_char: start,
            end_char: end,
            metadata: self.document.metadata.clone(),
        };

        if end == total {
            self.finished = true;
        } else {
            self.next_start += self.stride;
        }
        self.ordinal += 1;

        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let total = self.char_count();
        let remaining = if self.next_start + self.chunk_size >= total {
            1
        } else {
            1 + (total - self.next_start - self.chunk_size).div_ceil(self.stride)
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks<'_> {}
