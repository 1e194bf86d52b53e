//! Silence-based liveness for push sources.
//!
//! A push source is considered connected while messages keep arriving:
//! `connected == (now - last_heard <= threshold)`. The flag is recomputed
//! on a fixed cadence by [`monitor_task`], independent of message volume,
//! and [`LivenessRecord::is_connected`] is a pure read of the last result.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Inner {
    last_heard: Option<Instant>,
    connected: bool,
}

/// Last-heard bookkeeping for one push source. Outlives reconnects.
#[derive(Debug)]
pub struct LivenessRecord {
    name: &'static str,
    threshold: Duration,
    inner: Mutex<Inner>,
}

impl LivenessRecord {
    pub fn new(name: &'static str, threshold: Duration) -> Self {
        Self {
            name,
            threshold,
            inner: Mutex::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that a message just arrived.
    pub fn mark_heard(&self) {
        self.mark_heard_at(Instant::now());
    }

    pub fn mark_heard_at(&self, at: Instant) {
        self.lock().last_heard = Some(at);
    }

    /// Recompute the connected flag against the current time.
    pub fn poll(&self) -> bool {
        self.poll_at(Instant::now())
    }

    /// Recompute the connected flag against `now` and store it.
    ///
    /// A source never heard from is disconnected.
    pub fn poll_at(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        let connected = inner
            .last_heard
            .is_some_and(|heard| now.saturating_duration_since(heard) <= self.threshold);

        if connected != inner.connected {
            if connected {
                info!(source = self.name, "source is live");
            } else {
                warn!(
                    source = self.name,
                    threshold_ms = u64::try_from(self.threshold.as_millis()).unwrap_or(u64::MAX),
                    "source went silent"
                );
            }
        }
        inner.connected = connected;
        connected
    }

    /// Result of the most recent poll.
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn last_heard(&self) -> Option<Instant> {
        self.lock().last_heard
    }
}

/// Recompute every record's flag each `every` until cancelled.
pub(crate) async fn monitor_task(
    records: Vec<Arc<LivenessRecord>>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                for record in &records {
                    record.poll();
                }
            }
        }
    }
    debug!("liveness monitor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(5);

    #[test]
    fn never_heard_is_disconnected() {
        let record = LivenessRecord::new("telemetry", THRESHOLD);
        assert!(!record.poll());
        assert!(!record.is_connected());
    }

    #[test]
    fn stale_beyond_threshold_is_disconnected() {
        let record = LivenessRecord::new("telemetry", THRESHOLD);
        let heard = Instant::now();
        record.mark_heard_at(heard);

        assert!(!record.poll_at(heard + Duration::from_secs(6)));
        assert!(!record.is_connected());
    }

    #[test]
    fn recent_message_is_connected() {
        let record = LivenessRecord::new("telemetry", THRESHOLD);
        let heard = Instant::now();
        record.mark_heard_at(heard);

        assert!(record.poll_at(heard + Duration::from_secs(1)));
        assert!(record.is_connected());
    }

    #[test]
    fn exactly_at_threshold_is_connected() {
        let record = LivenessRecord::new("telemetry", THRESHOLD);
        let heard = Instant::now();
        record.mark_heard_at(heard);

        assert!(record.poll_at(heard + THRESHOLD));
    }

    #[test]
    fn status_only_changes_on_poll() {
        let record = LivenessRecord::new("telemetry", THRESHOLD);
        record.mark_heard();
        assert!(!record.is_connected());

        record.poll();
        assert!(record.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_flips_flag_after_silence() {
        let record = Arc::new(LivenessRecord::new("telemetry", THRESHOLD));
        let cancel = CancellationToken::new();
        record.mark_heard();

        let task = tokio::spawn(monitor_task(
            vec![Arc::clone(&record)],
            Duration::from_secs(4),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(record.is_connected());

        // Next poll at t=8s sees 8s of silence.
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(!record.is_connected());

        cancel.cancel();
        task.await.ok();
    }
}
