// ── Reactive domain streams ──
//
// Subscription type for consuming one domain's changes from the StateStore.

use std::sync::Arc;

use tokio::sync::watch;

use crate::model::DomainState;

/// A subscription to one domain.
pub struct DomainStream {
    current: Arc<DomainState>,
    receiver: watch::Receiver<Arc<DomainState>>,
}

impl DomainStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<DomainState>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The state captured at creation time (or at the last `changed()`).
    pub fn current(&self) -> &Arc<DomainState> {
        &self.current
    }

    /// Whether a change landed since the last `changed()`.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Wait for the next change, returning the new state.
    /// Returns `None` if the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<DomainState>> {
        self.receiver.changed().await.ok()?;
        let state = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&state);
        Some(state)
    }
}
