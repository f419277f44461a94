//! NATS transports
//!
//! Dispatcher は request subject を subscribe して reply subject に返信します。
//! Ingestion は topic ごとに 1 つ subscribe します。frame の key は
//! `ImageHandle` header で渡せます。

use async_nats::{Client, ConnectOptions, Subject, Subscriber};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::{SetupError, TransportError};
use crate::ports::{Frame, FrameSource, InboundRequest, ReplySink, RequestTransport};

pub const DEFAULT_REQUEST_SUBJECT: &str = "imagestore.requests";

/// Header carrying an optional per-frame key on ingestion topics.
pub const FRAME_KEY_HEADER: &str = "ImageHandle";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to NATS. Failure is fatal at startup.
pub async fn connect(url: &str, name: &str) -> Result<Client, SetupError> {
    info!(url, "connecting to NATS");
    let client = ConnectOptions::new()
        .name(name)
        .connection_timeout(CONNECT_TIMEOUT)
        .connect(url)
        .await
        .map_err(|e| SetupError::Transport(format!("failed to connect to {url}: {e}")))?;
    info!(url, "connected to NATS");
    Ok(client)
}

pub struct NatsRequestTransport {
    client: Client,
    subscriber: Subscriber,
    subject: String,
}

impl NatsRequestTransport {
    pub async fn subscribe(client: Client, subject: &str) -> Result<Self, SetupError> {
        let subscriber = client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| SetupError::Transport(format!("subscribe to {subject} failed: {e}")))?;
        Ok(Self {
            client,
            subscriber,
            subject: subject.to_string(),
        })
    }
}

#[async_trait]
impl RequestTransport for NatsRequestTransport {
    async fn next_request(&mut self) -> Result<Option<InboundRequest>, TransportError> {
        loop {
            let Some(message) = self.subscriber.next().await else {
                return Ok(None);
            };
            let Some(reply) = message.reply else {
                warn!(subject = %self.subject, "dropping request without reply subject");
                continue;
            };
            return Ok(Some(InboundRequest {
                payload: message.payload,
                reply: Box::new(NatsReply {
                    client: self.client.clone(),
                    subject: reply,
                    max_payload: self.client.server_info().max_payload,
                }),
            }));
        }
    }
}

struct NatsReply {
    client: Client,
    subject: Subject,
    /// Server-announced limit; 0 when unknown.
    max_payload: usize,
}

#[async_trait]
impl ReplySink for NatsReply {
    fn max_payload(&self) -> Option<usize> {
        (self.max_payload > 0).then_some(self.max_payload)
    }

    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.client
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

pub struct NatsFrameSource {
    subscriber: Subscriber,
}

impl NatsFrameSource {
    pub async fn subscribe(client: &Client, topic: &str) -> Result<Self, SetupError> {
        let subscriber = client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| SetupError::Transport(format!("subscribe to topic {topic} failed: {e}")))?;
        Ok(Self { subscriber })
    }
}

#[async_trait]
impl FrameSource for NatsFrameSource {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let message = self.subscriber.next().await?;
        let key = message
            .headers
            .as_ref()
            .and_then(|headers| headers.get(FRAME_KEY_HEADER))
            .map(|value| value.to_string());
        Some(Ok(Frame {
            key,
            payload: message.payload,
        }))
    }
}
