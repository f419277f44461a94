//! TransferService - chunk ストリーム上の Store / Read / Remove
//!
//! Store リクエストは chunk メッセージの列で、最後のメッセージが MemoryType を持ちます。
//! end-of-stream で初めて blob が完成し、Facade に 1 回だけ渡されます。
//! Read のレスポンスは同じ chunk 列で返します。

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::Iter;
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::codec::{ChunkAssembler, Chunks, DEFAULT_CHUNK_SIZE, chunk_stream, chunks};
use crate::domain::{Handle, MemoryType, StoreError, TransportError};
use crate::facade::StoreFacade;

/// One message of a streamed Store request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreChunk {
    pub chunk: Bytes,
    /// Carried by the final message of the request.
    pub memory_type: Option<MemoryType>,
    /// Optional total length, announced on the first message.
    pub declared_len: Option<usize>,
}

impl StoreChunk {
    /// Client side: split `blob` into the request message sequence.
    ///
    /// The first message declares the total length and the last one carries
    /// the memory type. An empty blob becomes a single terminal message.
    pub fn sequence(
        blob: Bytes,
        chunk_size: usize,
        memory_type: MemoryType,
    ) -> impl Iterator<Item = StoreChunk> {
        let total = blob.len();
        let mut parts = chunks(blob, chunk_size).peekable();
        let mut first = true;
        let mut done = false;
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            let chunk = parts.next().unwrap_or_default();
            let last = parts.peek().is_none();
            let message = StoreChunk {
                chunk,
                memory_type: last.then_some(memory_type),
                declared_len: first.then_some(total),
            };
            first = false;
            done = last;
            Some(message)
        })
    }
}

pub struct TransferService {
    facade: Arc<StoreFacade>,
    chunk_size: usize,
}

impl TransferService {
    pub fn new(facade: Arc<StoreFacade>) -> Self {
        Self::with_chunk_size(facade, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(facade: Arc<StoreFacade>, chunk_size: usize) -> Self {
        Self {
            facade,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Receive a streamed Store request and return the assigned handle.
    ///
    /// Without any memory type on the stream the blob goes to the volatile backend.
    pub async fn store<S>(&self, mut messages: S) -> Result<Handle, StoreError>
    where
        S: Stream<Item = Result<StoreChunk, TransportError>> + Unpin + Send,
    {
        let mut assembler = ChunkAssembler::new(self.facade.limits().max_frame_size);
        let mut memory_type = None;

        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| {
                warn!(error = %e, received = assembler.len(), "store transfer aborted");
                StoreError::TransferFailed(e.to_string())
            })?;
            if let Some(declared_len) = message.declared_len {
                assembler.declare_len(declared_len)?;
            }
            assembler.push(&message.chunk)?;
            if message.memory_type.is_some() {
                memory_type = message.memory_type;
            }
        }

        let blob = assembler.finish();
        debug!(size = blob.len(), "store transfer complete");
        self.facade
            .store(blob, "", memory_type.unwrap_or_default())
            .await
    }

    /// Resolve `handle` and stream its blob back in chunks.
    pub async fn read(&self, handle: &Handle) -> Result<Chunks, StoreError> {
        let blob = self.facade.read(handle).await?;
        Ok(chunks(blob, self.chunk_size))
    }

    /// Same as `read`, as a `Stream` for streaming transports.
    pub async fn read_stream(&self, handle: &Handle) -> Result<Iter<Chunks>, StoreError> {
        let blob = self.facade.read(handle).await?;
        Ok(chunk_stream(blob, self.chunk_size))
    }

    pub async fn remove(&self, handle: &Handle) -> Result<bool, StoreError> {
        self.facade.remove(handle).await.map(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::tests::fixture;
    use futures_util::stream;

    const CHUNK: usize = 8;

    fn service(max_frame_size: usize) -> TransferService {
        TransferService::with_chunk_size(Arc::new(fixture(max_frame_size).facade), CHUNK)
    }

    fn request(blob: &[u8], memory_type: MemoryType) -> impl Stream<Item = Result<StoreChunk, TransportError>> + Unpin + Send {
        let messages: Vec<_> = StoreChunk::sequence(Bytes::copy_from_slice(blob), CHUNK, memory_type)
            .map(Ok)
            .collect();
        stream::iter(messages)
    }

    #[test]
    fn sequence_marks_first_and_last_messages() {
        let messages: Vec<StoreChunk> =
            StoreChunk::sequence(Bytes::from(vec![1u8; 20]), CHUNK, MemoryType::Durable).collect();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].declared_len, Some(20));
        assert!(messages[1..].iter().all(|m| m.declared_len.is_none()));
        assert_eq!(messages[2].memory_type, Some(MemoryType::Durable));
        assert!(messages[..2].iter().all(|m| m.memory_type.is_none()));
    }

    #[test]
    fn empty_blob_is_one_terminal_message() {
        let messages: Vec<StoreChunk> =
            StoreChunk::sequence(Bytes::new(), CHUNK, MemoryType::Volatile).collect();
        assert_eq!(
            messages,
            vec![StoreChunk {
                chunk: Bytes::new(),
                memory_type: Some(MemoryType::Volatile),
                declared_len: Some(0),
            }]
        );
    }

    #[tokio::test]
    async fn streamed_store_then_streamed_read() {
        let svc = service(1024);
        let blob: Vec<u8> = (0..(10 * CHUNK + 7) as u8).collect();

        let handle = svc.store(request(&blob, MemoryType::Durable)).await.unwrap();
        let parts: Vec<Bytes> = svc.read(&handle).await.unwrap().collect();

        assert_eq!(parts.len(), 11);
        assert_eq!(parts.concat(), blob);
        assert!(svc.remove(&handle).await.unwrap());
        assert!(matches!(svc.remove(&handle).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn broken_stream_stores_nothing() {
        let fx = fixture(1024);
        let facade = Arc::new(fx.facade);
        let svc = TransferService::with_chunk_size(facade, CHUNK);

        let messages = vec![
            Ok(StoreChunk {
                chunk: Bytes::from_static(b"half"),
                ..Default::default()
            }),
            Err(TransportError::Receive("deadline exceeded".into())),
        ];
        let err = svc.store(stream::iter(messages)).await.unwrap_err();

        assert!(matches!(err, StoreError::TransferFailed(_)));
        assert!(fx.cache.is_empty().await);
        assert!(fx.objects.is_empty().await);
    }

    #[tokio::test]
    async fn declared_oversize_aborts_before_reading_chunks() {
        let svc = service(16);
        let err = svc.store(request(&[0u8; 17], MemoryType::Volatile)).await.unwrap_err();
        assert!(matches!(err, StoreError::FrameTooLarge { size: 17, max: 16 }));
    }

    #[tokio::test]
    async fn read_stream_reassembles_to_the_stored_blob() {
        let svc = service(1024);
        let blob: Vec<u8> = (0..(3 * CHUNK + 1) as u8).collect();
        let handle = svc.store(request(&blob, MemoryType::Volatile)).await.unwrap();

        let parts = svc.read_stream(&handle).await.unwrap();
        let restored = crate::codec::assemble(parts.map(Ok::<Bytes, TransportError>), 1024).await.unwrap();
        assert_eq!(restored, Bytes::from(blob));
    }
}
