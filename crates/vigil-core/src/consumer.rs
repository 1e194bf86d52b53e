//! Fan-in queue consumer.
//!
//! On each tick, drains exactly the updates queued when the drain starts,
//! merges them per domain (later entries overwrite earlier ones) and, if
//! anything was drained, hands one [`Report`] to the [`ReportSink`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::model::{Diff, Domain, PendingUpdate, Report};
use crate::store::StateStore;

/// The decision-making caller on the receiving end of reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn receive_report(&self, report: Report);
}

#[async_trait]
impl ReportSink for mpsc::UnboundedSender<Report> {
    async fn receive_report(&self, report: Report) {
        if self.send(report).is_err() {
            debug!("report receiver dropped");
        }
    }
}

/// Non-blocking drain of the entries present right now, merged per domain.
///
/// Updates enqueued while draining wait for the next drain.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<PendingUpdate>) -> BTreeMap<Domain, Diff> {
    let mut merged: BTreeMap<Domain, Diff> = BTreeMap::new();
    for _ in 0..rx.len() {
        let Ok(PendingUpdate { domain, diff }) = rx.try_recv() else {
            break;
        };
        merged.entry(domain).or_default().extend(diff);
    }
    merged
}

/// Drain once and build a report, or `None` if the queue was empty.
pub fn collect_report(
    rx: &mut mpsc::UnboundedReceiver<PendingUpdate>,
    store: &StateStore,
) -> Option<Report> {
    let updates = drain(rx);
    if updates.is_empty() {
        return None;
    }

    let summary: Vec<String> = updates
        .iter()
        .map(|(domain, diff)| format!("{domain}: {}", diff.len()))
        .collect();
    info!(updates = %summary.join(", "), "forwarding consolidated updates");

    Some(Report {
        timestamp: Utc::now(),
        updates,
        state: store.snapshot(),
    })
}

pub(crate) async fn consumer_task(
    mut rx: mpsc::UnboundedReceiver<PendingUpdate>,
    store: Arc<StateStore>,
    sink: Arc<dyn ReportSink>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Some(report) = collect_report(&mut rx, &store) {
                    sink.receive_report(report).await;
                }
            }
        }
    }
    debug!("consumer exiting");
}
