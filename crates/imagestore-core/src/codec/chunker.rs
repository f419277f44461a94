//! Chunker - blob を chunk に分割する encoder

use bytes::Bytes;
use futures_util::stream::{self, Iter};

/// Lazy, ordered, finite sequence of chunks over one blob.
///
/// Every chunk but the last is exactly `chunk_size` bytes; an empty blob yields
/// no chunks. Chunks are zero-copy slices of the input.
#[derive(Debug, Clone)]
pub struct Chunks {
    blob: Bytes,
    chunk_size: usize,
    offset: usize,
}

/// Split `blob` into chunks of at most `chunk_size` bytes (a size of 0 is treated as 1).
pub fn chunks(blob: Bytes, chunk_size: usize) -> Chunks {
    Chunks {
        blob,
        chunk_size: chunk_size.max(1),
        offset: 0,
    }
}

/// The same sequence as an infallible `Stream`, for transports that consume streams.
pub fn chunk_stream(blob: Bytes, chunk_size: usize) -> Iter<Chunks> {
    stream::iter(chunks(blob, chunk_size))
}

impl Iterator for Chunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.offset >= self.blob.len() {
            return None;
        }
        let end = self.offset.saturating_add(self.chunk_size).min(self.blob.len());
        let chunk = self.blob.slice(self.offset..end);
        self.offset = end;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.blob.len() - self.offset;
        let n = remaining.div_ceil(self.chunk_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks {}
