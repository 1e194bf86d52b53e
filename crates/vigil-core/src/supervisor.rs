//! Reconnect state machine for a push session.
//!
//! ```text
//! Disconnected ──▶ Connecting ──▶ Subscribing ──▶ Connected
//!      ▲               │               │              │
//!      └───────────────┴───── offline / failure ──────┘
//! ```
//!
//! The supervisor owns at most one live session. Every topic is
//! re-subscribed on each new session; on the way down, topics that were
//! subscribed are unsubscribed best-effort before the session is dropped,
//! so subscriptions never pile up across reconnects. Retries are
//! unbounded and every reconnect waits out an exponential backoff with
//! jitter. The backoff only resets once a session has stayed connected
//! for `stable_after`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_api::{PushMessage, PushSession, PushTransport};

use crate::config::SupervisorConfig;
use crate::error::CoreError;

/// Observable lifecycle state of a supervised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribing,
    Connected,
}

/// Why a session attempt ended.
enum Outcome {
    /// Shutdown requested.
    Cancelled,
    /// Session went offline after being fully subscribed for `uptime`.
    Offline { uptime: Duration },
    /// Connect or subscribe failed.
    Failed,
}

type SessionSlot = Option<Arc<dyn PushSession>>;

/// Keeps one push session alive and subscribed.
pub struct ReconnectSupervisor {
    transport: Arc<dyn PushTransport>,
    topics: Vec<String>,
    config: SupervisorConfig,
    session: Mutex<SessionSlot>,
    state: watch::Sender<ConnectionState>,
}

impl ReconnectSupervisor {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        topics: Vec<String>,
        config: SupervisorConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            topics,
            config,
            session: Mutex::new(None),
            state,
        }
    }

    // ── State observation ────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "push session state");
            *current = next;
            true
        });
    }

    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Publish on the live session, bounded by the operation timeout.
    pub async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<(), CoreError> {
        let session = self
            .slot()
            .clone()
            .ok_or_else(|| CoreError::unavailable("telemetry", "no live push session"))?;

        match tokio::time::timeout(self.config.operation_timeout, session.publish(topic, payload))
            .await
        {
            Ok(result) => result.map_err(CoreError::from),
            Err(_) => Err(CoreError::timeout(
                format!("publish to {topic}"),
                self.config.operation_timeout,
            )),
        }
    }

    // ── Lifecycle loop ───────────────────────────────────────────────

    /// Drive the state machine until `cancel` fires.
    ///
    /// Every inbound message is handed to `on_message`.
    pub async fn run<F>(self: Arc<Self>, on_message: F, cancel: CancellationToken)
    where
        F: Fn(PushMessage) + Send + Sync,
    {
        let mut attempt: u32 = 0;

        loop {
            match self.session_cycle(&on_message, &cancel).await {
                Outcome::Cancelled => break,
                Outcome::Offline { uptime } => {
                    info!(
                        endpoint = %self.transport.endpoint(),
                        uptime_ms = u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX),
                        "push session offline"
                    );
                    if uptime >= self.config.stable_after {
                        attempt = 0;
                    }
                }
                Outcome::Failed => {}
            }

            let delay = calculate_backoff(attempt, &self.config);
            info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "waiting before reconnect"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
            attempt = attempt.saturating_add(1);
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("push supervisor exiting");
    }

    /// One pass through Connecting → Subscribing → Connected → Disconnected.
    async fn session_cycle<F>(&self, on_message: &F, cancel: &CancellationToken) -> Outcome
    where
        F: Fn(PushMessage) + Send + Sync,
    {
        // ── Connecting ──
        self.set_state(ConnectionState::Connecting);
        let connect = tokio::time::timeout(self.config.connect_timeout, self.transport.connect());
        let session = tokio::select! {
            biased;
            () = cancel.cancelled() => return Outcome::Cancelled,
            result = connect => match result {
                Ok(Ok(session)) => session,
                Ok(Err(e)) => {
                    warn!(endpoint = %self.transport.endpoint(), error = %e, "push connect failed");
                    self.set_state(ConnectionState::Disconnected);
                    return Outcome::Failed;
                }
                Err(_) => {
                    warn!(
                        endpoint = %self.transport.endpoint(),
                        timeout_ms = u64::try_from(self.config.connect_timeout.as_millis()).unwrap_or(u64::MAX),
                        "push connect timed out"
                    );
                    self.set_state(ConnectionState::Disconnected);
                    return Outcome::Failed;
                }
            },
        };

        // ── Subscribing ──
        self.set_state(ConnectionState::Subscribing);
        let mut subscribed: Vec<&str> = Vec::with_capacity(self.topics.len());
        for topic in &self.topics {
            match self.subscribe_with_retry(session.as_ref(), topic, cancel).await {
                Ok(()) => subscribed.push(topic),
                Err(outcome) => {
                    self.teardown(&session, &subscribed).await;
                    return outcome;
                }
            }
        }

        // ── Connected ──
        *self.slot() = Some(Arc::clone(&session));
        self.set_state(ConnectionState::Connected);
        info!(topics = subscribed.len(), "push session connected");
        let connected_at = tokio::time::Instant::now();

        let outcome = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break Outcome::Cancelled,
                message = session.recv() => match message {
                    Some(message) => on_message(message),
                    None => break Outcome::Offline { uptime: connected_at.elapsed() },
                },
            }
        };

        self.teardown(&session, &subscribed).await;
        outcome
    }

    /// Subscribe one topic, retrying with backoff on failure.
    ///
    /// Gives up on the session after `subscribe_attempts` failures so the
    /// whole cycle restarts on a fresh one.
    async fn subscribe_with_retry(
        &self,
        session: &dyn PushSession,
        topic: &str,
        cancel: &CancellationToken,
    ) -> Result<(), Outcome> {
        let attempts = self.config.subscribe_attempts.max(1);

        for attempt in 0..attempts {
            let result =
                tokio::time::timeout(self.config.operation_timeout, session.subscribe(topic)).await;
            let error = match result {
                Ok(Ok(())) => {
                    debug!(topic, "subscribed");
                    return Ok(());
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "timed out".to_owned(),
            };
            warn!(topic, attempt, error = %error, "subscribe failed");

            if attempt + 1 < attempts {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Outcome::Cancelled),
                    () = tokio::time::sleep(calculate_backoff(attempt, &self.config)) => {}
                }
            }
        }

        warn!(topic, attempts, "giving up on session after repeated subscribe failures");
        Err(Outcome::Failed)
    }

    /// Clear the slot, unsubscribe best-effort, close the session.
    async fn teardown(&self, session: &Arc<dyn PushSession>, subscribed: &[&str]) {
        self.slot().take();

        for topic in subscribed {
            let result =
                tokio::time::timeout(self.config.operation_timeout, session.unsubscribe(topic))
                    .await;
            match result {
                Ok(Ok(())) => debug!(topic, "unsubscribed"),
                Ok(Err(e)) => debug!(topic, error = %e, "unsubscribe failed (session going away)"),
                Err(_) => debug!(topic, "unsubscribe timed out (session going away)"),
            }
        }

        session.close().await;
        self.set_state(ConnectionState::Disconnected);
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`, jitter within ±25%.
fn calculate_backoff(attempt: u32, config: &SupervisorConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.backoff_initial.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.backoff_max.as_secs_f64());

    // Deterministic spread seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}
