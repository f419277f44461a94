//! CommandDispatcher - request/response ループ
//!
//! # フロー
//! Listening → Parsing → Executing → Responding → Listening
//!
//! - 1 件ずつ最後まで処理してから次を受け取る（パイプライン化しない）
//! - 不正な request は `{Error}` で返し、ループは止めない
//! - transport が閉じるか、キャンセルされたら終了

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{Command, MemoryType, Response, TransportError};
use crate::facade::StoreFacade;
use crate::ports::{ReplySink, RequestTransport};

const RECEIVE_BACKOFF: Duration = Duration::from_millis(100);

/// Executes decoded commands against the facade. Shared by the dispatcher
/// loop and anything else that speaks the request schema.
#[derive(Clone)]
pub struct CommandHandler {
    facade: Arc<StoreFacade>,
    memory_type: MemoryType,
}

impl CommandHandler {
    /// `memory_type` is where `Store` commands put their blobs.
    pub fn new(facade: Arc<StoreFacade>, memory_type: MemoryType) -> Self {
        Self {
            facade,
            memory_type,
        }
    }

    /// Parse and execute one request payload.
    pub async fn handle(&self, payload: &[u8]) -> Response {
        let command = match Command::decode(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "rejected request");
                return Response::error(e);
            }
        };

        match command {
            Command::Read { handle } => match self.facade.read(&handle).await {
                Ok(blob) => {
                    debug!(handle = %handle, size = blob.len(), "read");
                    Response::read(&handle, &blob)
                }
                Err(e) => {
                    warn!(handle = %handle, error = %e, "read failed");
                    Response::error(e)
                }
            },
            Command::Store { handle, blob } => {
                let size = blob.len();
                match self.facade.store(blob, handle.as_str(), self.memory_type).await {
                    Ok(handle) => {
                        debug!(handle = %handle, size, memory_type = %self.memory_type, "stored");
                        Response::stored(&handle)
                    }
                    Err(e) => {
                        warn!(handle = %handle, size, error = %e, "store failed");
                        Response::error(e)
                    }
                }
            }
        }
    }
}

/// Send `response`, falling back to a short `{Error}` when the reply is too
/// large for the transport or cannot be delivered.
async fn respond(reply: &mut dyn ReplySink, response: Response) {
    let payload = match response.to_bytes() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "failed to encode response");
            return send_error(reply, format!("failed to encode response: {e}")).await;
        }
    };
    if let Some(limit) = reply.max_payload()
        && payload.len() > limit
    {
        warn!(size = payload.len(), limit, "response exceeds transport limit");
        let message = format!(
            "response of {} bytes exceeds the transport limit of {limit} bytes",
            payload.len()
        );
        return send_error(reply, message).await;
    }
    if let Err(e) = reply.send(payload).await {
        warn!(error = %e, "failed to send response");
        send_error(reply, format!("failed to deliver response: {e}")).await;
    }
}

async fn send_error(reply: &mut dyn ReplySink, message: String) {
    let sent = match Response::error(message).to_bytes() {
        Ok(payload) => reply.send(payload).await,
        Err(e) => Err(TransportError::Send(e.to_string())),
    };
    if let Err(e) = sent {
        warn!(error = %e, "failed to send error response");
    }
}

pub struct CommandDispatcher {
    handler: CommandHandler,
    transport: Box<dyn RequestTransport>,
}

impl CommandDispatcher {
    pub fn new(
        facade: Arc<StoreFacade>,
        transport: Box<dyn RequestTransport>,
        memory_type: MemoryType,
    ) -> Self {
        Self {
            handler: CommandHandler::new(facade, memory_type),
            transport,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(memory_type = %self.handler.memory_type, "dispatcher listening");
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.transport.next_request() => next,
            };

            let mut request = match next {
                Ok(Some(request)) => request,
                Ok(None) => {
                    info!("request transport closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to receive request");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => continue,
                    }
                }
            };

            let response = self.handler.handle(&request.payload).await;
            respond(request.reply.as_mut(), response).await;
        }
        info!("dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Handle;
    use crate::facade::tests::fixture;
    use crate::impls::{RequestClient, request_channel};
    use bytes::Bytes;
    use crate::ports::InboundRequest;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::{mpsc, oneshot};
    use tokio::task::JoinHandle;

    const REPLY_LIMIT: usize = 128;

    /// Reply sink that refuses payloads above `REPLY_LIMIT`, optionally
    /// announcing the limit up front.
    struct CappedReply {
        tx: Option<oneshot::Sender<Bytes>>,
        announce: bool,
    }

    #[async_trait]
    impl ReplySink for CappedReply {
        fn max_payload(&self) -> Option<usize> {
            self.announce.then_some(REPLY_LIMIT)
        }

        async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
            if payload.len() > REPLY_LIMIT {
                return Err(TransportError::Send("too large".into()));
            }
            let tx = self.tx.take().ok_or(TransportError::Closed)?;
            tx.send(payload).map_err(|_| TransportError::Closed)
        }
    }

    struct QueueTransport(mpsc::Receiver<InboundRequest>);

    #[async_trait]
    impl RequestTransport for QueueTransport {
        async fn next_request(&mut self) -> Result<Option<InboundRequest>, TransportError> {
            Ok(self.0.recv().await)
        }
    }

    /// Read an 80-byte blob through a reply path capped at `REPLY_LIMIT`.
    async fn capped_read(announce: bool) -> Response {
        let facade = Arc::new(fixture(1024).facade);
        facade
            .store(Bytes::from(vec![9u8; 80]), "big", MemoryType::Volatile)
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(1);
        let dispatcher = CommandDispatcher::new(facade, Box::new(QueueTransport(rx)), MemoryType::Volatile);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(cancel.clone()));

        let (reply_tx, reply_rx) = oneshot::channel();
        let payload = Command::Read { handle: Handle::new("big") }.encode().unwrap();
        tx.send(InboundRequest {
            payload: Bytes::from(payload),
            reply: Box::new(CappedReply { tx: Some(reply_tx), announce }),
        })
        .await
        .unwrap();

        let reply = reply_rx.await.unwrap();
        cancel.cancel();
        task.await.unwrap();
        serde_json::from_slice(&reply).unwrap()
    }

    fn start(memory_type: MemoryType) -> (RequestClient, CancellationToken, JoinHandle<()>) {
        let (client, transport) = request_channel(4);
        let facade = Arc::new(fixture(1024).facade);
        let dispatcher = CommandDispatcher::new(facade, Box::new(transport), memory_type);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(dispatcher.run(cancel.clone()));
        (client, cancel, task)
    }

    async fn raw(client: &RequestClient, value: serde_json::Value) -> Response {
        let reply = client.request(serde_json::to_vec(&value).unwrap()).await.unwrap();
        serde_json::from_slice(&reply).unwrap()
    }

    #[tokio::test]
    async fn store_then_read() {
        let (client, cancel, task) = start(MemoryType::Volatile);

        let stored = client
            .send_command(&Command::Store {
                handle: Handle::new(""),
                blob: Bytes::from_static(b"hello"),
            })
            .await
            .unwrap();
        let Response::Success { handle, blob: None } = stored else {
            panic!("unexpected response: {stored:?}");
        };
        assert!(!handle.is_empty());

        let read = client
            .send_command(&Command::Read { handle: Handle::new(handle.clone()) })
            .await
            .unwrap();
        assert_eq!(read, Response::Success { handle, blob: Some(b"hello".to_vec()) });

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn store_keeps_caller_key() {
        let (client, cancel, task) = start(MemoryType::Durable);

        let stored = raw(&client, json!({ "Command": "Store", "ImageHandle": "cam-1", "Blob": [7, 7] })).await;
        assert_eq!(stored, Response::stored(&Handle::new("cam-1")));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_command_does_not_stop_the_loop() {
        let (client, cancel, task) = start(MemoryType::Volatile);

        let reply = raw(&client, json!({ "Command": "Delete", "ImageHandle": "h" })).await;
        assert_eq!(reply, Response::error("Invalid Command Delete"));

        let reply = raw(&client, json!({ "Command": "Store", "ImageHandle": "h", "Blob": [1] })).await;
        assert!(!reply.is_error());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn empty_blob_is_rejected_before_the_facade() {
        let (client, cancel, task) = start(MemoryType::Volatile);

        let reply = raw(&client, json!({ "Command": "Store", "ImageHandle": "h", "Blob": [] })).await;
        assert!(reply.is_error());

        // 何も保存されていない
        let reply = raw(&client, json!({ "Command": "Read", "ImageHandle": "h" })).await;
        assert!(reply.is_error());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_requests_get_error_responses() {
        let (client, cancel, task) = start(MemoryType::Volatile);

        let reply = raw(&client, json!({ "ImageHandle": "h" })).await;
        assert_eq!(reply, Response::error("missing field: Command"));

        let reply = client.request(Bytes::from_static(b"not json")).await.unwrap();
        let reply: Response = serde_json::from_slice(&reply).unwrap();
        assert!(reply.is_error());

        let reply = raw(&client, json!({ "Command": "Read", "ImageHandle": "missing" })).await;
        assert_eq!(reply, Response::error("handle not found: missing"));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_transport_ends_the_loop() {
        let (client, _cancel, task) = start(MemoryType::Volatile);
        drop(client);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn undeliverable_reply_falls_back_to_an_error() {
        let reply = capped_read(false).await;
        assert_eq!(
            reply,
            Response::error("failed to deliver response: send failed: too large")
        );
    }

    #[tokio::test]
    async fn reply_over_the_announced_limit_becomes_an_error() {
        match capped_read(true).await {
            Response::Failure { error } => {
                assert!(error.contains("exceeds the transport limit of 128 bytes"), "{error}");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
