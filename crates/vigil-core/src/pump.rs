//! Per-domain refresh loops.
//!
//! Each pump owns one [`DomainFetcher`]. On every tick it checks the
//! fetcher is ready, fetches under a deadline, diffs against the store and,
//! only when something changed or was added, writes the store and puts the
//! diff on the fan-in queue. Failures are logged and the loop carries on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{Domain, PendingUpdate, Snapshot};
use crate::store::StateStore;

/// Produces fresh data for one domain.
#[async_trait]
pub trait DomainFetcher: Send + Sync {
    fn domain(&self) -> Domain;

    /// Whether a fetch is worth attempting right now.
    fn ready(&self) -> bool {
        true
    }

    /// Deadline the pump puts around one [`fetch`](Self::fetch).
    ///
    /// Fetchers that bound each of their own calls and return partial
    /// progress answer `None`.
    fn deadline(&self, default: Duration) -> Option<Duration> {
        Some(default)
    }

    /// Fetch the domain's full current data. `previous` is what the store
    /// holds now, for sources that build incrementally.
    async fn fetch(&self, previous: &Snapshot) -> Result<Snapshot, CoreError>;
}

/// What one pump cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The fetcher reported not ready; nothing was fetched.
    NotReady,
    Unchanged,
    /// The store was updated and a diff with this many entries enqueued.
    Changed(usize),
}

/// Run a single fetch → diff → store → enqueue cycle.
pub async fn run_cycle(
    fetcher: &dyn DomainFetcher,
    store: &StateStore,
    queue: &mpsc::UnboundedSender<PendingUpdate>,
    fetch_timeout: Duration,
) -> Result<CycleOutcome, CoreError> {
    let domain = fetcher.domain();
    if !fetcher.ready() {
        debug!(%domain, "source not ready, skipping cycle");
        return Ok(CycleOutcome::NotReady);
    }

    let previous = store.data(domain);
    let fresh = match fetcher.deadline(fetch_timeout) {
        Some(limit) => tokio::time::timeout(limit, fetcher.fetch(&previous))
            .await
            .map_err(|_| CoreError::timeout(format!("{domain} fetch"), limit))??,
        None => fetcher.fetch(&previous).await?,
    };

    let diff = store.apply(domain, fresh);
    if diff.is_empty() {
        return Ok(CycleOutcome::Unchanged);
    }

    let changed = diff.len();
    debug!(%domain, changed, "domain updated");
    queue
        .send(PendingUpdate { domain, diff })
        .map_err(|_| CoreError::Internal("update queue closed".into()))?;
    Ok(CycleOutcome::Changed(changed))
}

/// Refresh one domain every `every` until cancelled.
///
/// The first cycle runs immediately.
pub(crate) async fn pump_task(
    fetcher: Arc<dyn DomainFetcher>,
    store: Arc<StateStore>,
    queue: mpsc::UnboundedSender<PendingUpdate>,
    every: Duration,
    fetch_timeout: Duration,
    cancel: CancellationToken,
) {
    let domain = fetcher.domain();
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = run_cycle(fetcher.as_ref(), &store, &queue, fetch_timeout) => {
                        if let Err(e) = result {
                            warn!(%domain, error = %e, "refresh failed");
                        }
                    }
                }
            }
        }
    }
    debug!(%domain, "pump exiting");
}
