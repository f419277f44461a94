//! FrameSource port - topic ごとの受信側
//!
//! Ingestion Manager は topic ごとに 1 つの FrameSource を持ち、独立したループで読みます。

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::TransportError;

/// One frame published on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Producer-supplied key, if the frame carries one.
    pub key: Option<String>,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            key: None,
            payload: payload.into(),
        }
    }

    pub fn with_key(key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            key: Some(key.into()),
            payload: payload.into(),
        }
    }
}

#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the subscription is closed.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}
