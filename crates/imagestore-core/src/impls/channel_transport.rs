//! Channel transports - プロセス内の request/response と topic
//!
//! tokio の mpsc/oneshot だけで RequestTransport と FrameSource を実装します。
//! テストと、同じプロセス内の producer から使います。

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::domain::{Command, Response, TransportError};
use crate::ports::{Frame, FrameSource, InboundRequest, ReplySink, RequestTransport};

/// Create a connected requester / dispatcher-side transport pair.
pub fn request_channel(capacity: usize) -> (RequestClient, ChannelRequestTransport) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RequestClient { tx }, ChannelRequestTransport { rx })
}

/// Create a publisher handle and the topic-side frame source.
pub fn frame_channel(capacity: usize) -> (mpsc::Sender<Frame>, ChannelFrameSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, ChannelFrameSource { rx })
}

#[derive(Clone)]
pub struct RequestClient {
    tx: mpsc::Sender<InboundRequest>,
}

impl RequestClient {
    /// Send raw request bytes and wait for the raw reply.
    pub async fn request(&self, payload: impl Into<Bytes>) -> Result<Bytes, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = InboundRequest {
            payload: payload.into(),
            reply: Box::new(OneshotReply(Some(reply_tx))),
        };
        self.tx.send(request).await.map_err(|_| TransportError::Closed)?;
        reply_rx.await.map_err(|_| TransportError::Closed)
    }

    pub async fn send_command(&self, command: &Command) -> Result<Response, TransportError> {
        let payload = command
            .encode()
            .map_err(|e| TransportError::Send(e.to_string()))?;
        let reply = self.request(payload).await?;
        serde_json::from_slice(&reply).map_err(|e| TransportError::Receive(e.to_string()))
    }
}

pub struct ChannelRequestTransport {
    rx: mpsc::Receiver<InboundRequest>,
}

#[async_trait]
impl RequestTransport for ChannelRequestTransport {
    async fn next_request(&mut self) -> Result<Option<InboundRequest>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

struct OneshotReply(Option<oneshot::Sender<Bytes>>);

#[async_trait]
impl ReplySink for OneshotReply {
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        let tx = self.0.take().ok_or(TransportError::Closed)?;
        tx.send(payload)
            .map_err(|_| TransportError::Send("requester went away".into()))
    }
}

pub struct ChannelFrameSource {
    rx: mpsc::Receiver<Frame>,
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}
