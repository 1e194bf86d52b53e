//! Push-based publish/subscribe sessions.
//!
//! A [`PushTransport`] opens sessions; a [`PushSession`] carries
//! subscribe / unsubscribe / publish round-trips and yields inbound
//! messages until the broker goes offline. The reconnect state machine in
//! `vigil-core` drives these traits and never touches the wire directly.

mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub use websocket::WsTransport;

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// One live broker session.
///
/// Operations are request/acknowledge round-trips; callers bound them with
/// their own deadline.
#[async_trait]
pub trait PushSession: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), Error>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), Error>;

    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<(), Error>;

    /// Next inbound message. `None` once the session has gone offline.
    async fn recv(&self) -> Option<PushMessage>;

    /// Tear the session down. Idempotent.
    async fn close(&self);
}

/// Factory for [`PushSession`]s.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a fresh session. Each call yields an independent session.
    async fn connect(&self) -> Result<Arc<dyn PushSession>, Error>;

    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> String;
}
