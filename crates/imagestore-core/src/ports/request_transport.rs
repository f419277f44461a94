//! RequestTransport port - Dispatcher の request/response transport
//!
//! 1 件の inbound request は payload と返信先（ReplySink）を持ちます。
//! 送信に失敗した返信先には、短いエラー応答をもう一度送れます。

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::TransportError;

/// Reply path of an inbound request. Only one send succeeds.
#[async_trait]
pub trait ReplySink: Send {
    /// Largest payload the transport accepts, if it has a limit.
    fn max_payload(&self) -> Option<usize> {
        None
    }

    /// Deliver the reply. After a failure the sink may be tried again.
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError>;
}

pub struct InboundRequest {
    pub payload: Bytes,
    pub reply: Box<dyn ReplySink>,
}

impl std::fmt::Debug for InboundRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundRequest")
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait RequestTransport: Send {
    /// Wait for the next request. `Ok(None)` means the transport is closed.
    async fn next_request(&mut self) -> Result<Option<InboundRequest>, TransportError>;
}
