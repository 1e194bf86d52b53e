//! WebSocket realization of [`PushTransport`].
//!
//! Speaks a small JSON envelope to a pub/sub bridge:
//!
//! ```text
//! client → { "op": "subscribe" | "unsubscribe" | "publish", "id": 7, "topic": "...", "payload": ... }
//! server → { "op": "ack", "id": 7, "error": null }
//! server → { "op": "message", "topic": "...", "payload": ... }
//! ```
//!
//! Each session owns a reader task that routes acknowledgements to the
//! waiting operation and messages to the inbound queue. When the socket
//! drops, pending operations fail with [`Error::SessionClosed`] and
//! [`PushSession::recv`] returns `None`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{PushMessage, PushSession, PushTransport};
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type AckMap = HashMap<u64, oneshot::Sender<Result<(), String>>>;

// ── Wire envelope ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ClientFrame<'a> {
    op: &'static str,
    id: u64,
    topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum ServerFrame {
    Ack {
        id: u64,
        #[serde(default)]
        error: Option<String>,
    },
    Message {
        topic: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

// ── WsTransport ──────────────────────────────────────────────────────

/// Opens WebSocket sessions against a pub/sub bridge.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
    client_id: String,
}

impl WsTransport {
    pub fn new(url: Url, client_id: impl Into<String>) -> Self {
        Self {
            url,
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self) -> Result<Arc<dyn PushSession>, Error> {
        tracing::info!(url = %self.url, client_id = %self.client_id, "Connecting push session");

        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::SessionConnect(e.to_string()))?;
        let request = ClientRequestBuilder::new(uri).with_header("X-Client-Id", &self.client_id);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::SessionConnect(e.to_string()))?;

        tracing::info!("Push session connected");
        Ok(Arc::new(WsSession::start(ws_stream)))
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

// ── WsSession ────────────────────────────────────────────────────────

struct WsSession {
    write: Mutex<SplitSink<WsStream, Message>>,
    inbound: Mutex<mpsc::UnboundedReceiver<PushMessage>>,
    pending: Arc<StdMutex<AckMap>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl WsSession {
    fn start(stream: WsStream) -> Self {
        let (write, read) = stream.split();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let pending: Arc<StdMutex<AckMap>> = Arc::default();
        let cancel = CancellationToken::new();

        tokio::spawn(read_loop(
            read,
            inbound_tx,
            Arc::clone(&pending),
            cancel.clone(),
        ));

        Self {
            write: Mutex::new(write),
            inbound: Mutex::new(inbound_rx),
            pending,
            next_id: AtomicU64::new(1),
            cancel,
        }
    }

    /// Send one frame and wait for its acknowledgement.
    async fn round_trip(
        &self,
        op: &'static str,
        topic: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::SessionClosed {
                reason: "session already closed".into(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (_slot, ack_rx) = PendingAck::register(&self.pending, id);

        let frame = ClientFrame {
            op,
            id,
            topic,
            payload,
        };
        let text = serde_json::to_string(&frame).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;

        if let Err(e) = self.write.lock().await.send(Message::text(text)).await {
            return Err(Error::SessionClosed {
                reason: e.to_string(),
            });
        }

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(Error::Rejected {
                operation: op,
                topic: topic.to_owned(),
                reason,
            }),
            Err(_) => Err(Error::SessionClosed {
                reason: format!("connection dropped before {op} was acknowledged"),
            }),
        }
    }
}

#[async_trait]
impl PushSession for WsSession {
    async fn subscribe(&self, topic: &str) -> Result<(), Error> {
        self.round_trip("subscribe", topic, None).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        self.round_trip("unsubscribe", topic, None).await
    }

    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<(), Error> {
        self.round_trip("publish", topic, Some(payload)).await
    }

    async fn recv(&self) -> Option<PushMessage> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Err(e) = self.write.lock().await.close().await {
            tracing::debug!(error = %e, "Push session close frame failed");
        }
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock_acks(pending: &StdMutex<AckMap>) -> std::sync::MutexGuard<'_, AckMap> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An entry in the ack table, removed when dropped.
///
/// A caller that gives up on an operation (a timeout, a cancelled task)
/// drops this with the future, so the table only holds live waiters.
struct PendingAck<'a> {
    pending: &'a StdMutex<AckMap>,
    id: u64,
}

impl<'a> PendingAck<'a> {
    fn register(
        pending: &'a StdMutex<AckMap>,
        id: u64,
    ) -> (Self, oneshot::Receiver<Result<(), String>>) {
        let (ack_tx, ack_rx) = oneshot::channel();
        lock_acks(pending).insert(id, ack_tx);
        (Self { pending, id }, ack_rx)
    }
}

impl Drop for PendingAck<'_> {
    fn drop(&mut self) {
        lock_acks(self.pending).remove(&self.id);
    }
}

// ── Reader task ──────────────────────────────────────────────────────

async fn read_loop(
    mut read: SplitStream<WsStream>,
    inbound: mpsc::UnboundedSender<PushMessage>,
    pending: Arc<StdMutex<AckMap>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => route_frame(&text, &inbound, &pending),
                    Some(Ok(Message::Ping(_))) => tracing::trace!("Push session ping"),
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "Push session close frame received");
                        } else {
                            tracing::info!("Push session close frame received (no payload)");
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Push session read error");
                        break;
                    }
                    None => {
                        tracing::info!("Push session stream ended");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Dropping the senders fails every in-flight operation.
    lock_acks(&pending).clear();
    cancel.cancel();
    tracing::debug!("Push session reader exiting");
}

/// Parse a server frame and route it to the ack table or inbound queue.
fn route_frame(
    text: &str,
    inbound: &mpsc::UnboundedSender<PushMessage>,
    pending: &StdMutex<AckMap>,
) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse push frame");
            return;
        }
    };

    match frame {
        ServerFrame::Ack { id, error } => {
            if let Some(tx) = lock_acks(pending).remove(&id) {
                let _ = tx.send(error.map_or(Ok(()), Err));
            } else {
                tracing::debug!(id, "Ack for unknown operation");
            }
        }
        ServerFrame::Message { topic, payload } => {
            let _ = inbound.send(PushMessage { topic, payload });
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_omits_missing_payload() {
        let frame = ClientFrame {
            op: "subscribe",
            id: 3,
            topic: "kitchen/topics",
            payload: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "op": "subscribe", "id": 3, "topic": "kitchen/topics" })
        );
    }

    #[test]
    fn route_message_frame_to_inbound() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pending = StdMutex::new(AckMap::new());

        route_frame(
            r#"{"op":"message","topic":"kitchen/data/all","payload":{"light":"ON"}}"#,
            &tx,
            &pending,
        );

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.topic, "kitchen/data/all");
        assert_eq!(msg.payload["light"], "ON");
    }

    #[test]
    fn route_ack_resolves_pending_operation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let pending = StdMutex::new(AckMap::new());
        let (ack_tx, mut ack_rx) = oneshot::channel();
        pending.lock().unwrap().insert(9, ack_tx);

        route_frame(r#"{"op":"ack","id":9}"#, &tx, &pending);

        assert_eq!(ack_rx.try_recv().unwrap(), Ok(()));
        assert!(pending.lock().unwrap().is_empty());
    }

    #[test]
    fn route_ack_with_error_carries_reason() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let pending = StdMutex::new(AckMap::new());
        let (ack_tx, mut ack_rx) = oneshot::channel();
        pending.lock().unwrap().insert(1, ack_tx);

        route_frame(r#"{"op":"ack","id":1,"error":"denied"}"#, &tx, &pending);

        assert_eq!(ack_rx.try_recv().unwrap(), Err("denied".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_operation_releases_its_slot() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let pending = StdMutex::new(AckMap::new());
        let wait = async {
            let (_slot, ack_rx) = PendingAck::register(&pending, 4);
            ack_rx.await
        };

        let timed_out = tokio::time::timeout(std::time::Duration::from_secs(5), wait).await;

        assert!(timed_out.is_err());
        assert!(lock_acks(&pending).is_empty());
        // A late ack finds nothing to resolve.
        route_frame(r#"{"op":"ack","id":4}"#, &tx, &pending);
    }

    #[test]
    fn malformed_frame_is_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pending = StdMutex::new(AckMap::new());

        route_frame("not json at all", &tx, &pending);

        assert!(rx.try_recv().is_err());
    }
}
