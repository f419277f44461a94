//! Assembler - chunk 列を blob に組み立てる decoder
//!
//! `BytesMut` が償却再確保で伸びるので、手書きの append ロジックは持ちません。
//! 完成するのは end-of-stream を受け取ったときだけで、それまでの buffer は外に出ません。

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::domain::{StoreError, TransportError};

/// Reassembly buffer of one transfer.
#[derive(Debug)]
pub struct ChunkAssembler {
    buf: BytesMut,
    max_frame_size: usize,
}

impl ChunkAssembler {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Start a transfer whose total length is announced up front.
    pub fn with_declared_len(declared_len: usize, max_frame_size: usize) -> Result<Self, StoreError> {
        if declared_len > max_frame_size {
            return Err(StoreError::FrameTooLarge {
                size: declared_len,
                max: max_frame_size,
            });
        }
        Ok(Self {
            buf: BytesMut::with_capacity(declared_len),
            max_frame_size,
        })
    }

    /// Announce the total length after the assembler was created.
    pub fn declare_len(&mut self, declared_len: usize) -> Result<(), StoreError> {
        if declared_len > self.max_frame_size {
            return Err(StoreError::FrameTooLarge {
                size: declared_len,
                max: self.max_frame_size,
            });
        }
        self.buf.reserve(declared_len.saturating_sub(self.buf.len()));
        Ok(())
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<(), StoreError> {
        let size = self.buf.len().saturating_add(chunk.len());
        if size > self.max_frame_size {
            return Err(StoreError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// End of stream: hand out the completed blob.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Drain a chunk stream into one blob.
///
/// A transport error before end-of-stream drops the partial buffer and
/// surfaces `TransferFailed`.
pub async fn assemble<S>(mut chunks: S, max_frame_size: usize) -> Result<Bytes, StoreError>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
{
    let mut assembler = ChunkAssembler::new(max_frame_size);
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| StoreError::TransferFailed(e.to_string()))?;
        assembler.push(&chunk)?;
    }
    Ok(assembler.finish())
}
