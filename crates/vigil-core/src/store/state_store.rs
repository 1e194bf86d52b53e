use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;
use tokio::sync::watch;

use crate::diff::diff;
use crate::model::{Diff, Domain, DomainState, Snapshot, StateSnapshot};
use crate::stream::DomainStream;

/// The single authoritative copy of every domain's data.
///
/// Each domain sits behind its own `watch` channel, so a slow writer on
/// one domain never blocks another, and subscribers are notified only
/// when a domain actually changes.
pub struct StateStore {
    domains: BTreeMap<Domain, watch::Sender<Arc<DomainState>>>,
}

impl StateStore {
    pub fn new() -> Self {
        let domains = Domain::iter()
            .map(|domain| {
                let (tx, _) = watch::channel(Arc::new(DomainState::default()));
                (domain, tx)
            })
            .collect();
        Self { domains }
    }

    fn slot(&self, domain: Domain) -> &watch::Sender<Arc<DomainState>> {
        // Populated for every variant in `new()`.
        &self.domains[&domain]
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Diff `new` against the stored data and, if anything changed or was
    /// added, replace the domain's data and stamp it.
    ///
    /// Diff and replace happen under the domain's lock, so concurrent
    /// writers cannot interleave. Returns the diff (empty means untouched).
    pub fn apply(&self, domain: Domain, new: Snapshot) -> Diff {
        self.apply_at(domain, new, Utc::now())
    }

    pub(crate) fn apply_at(&self, domain: Domain, new: Snapshot, now: DateTime<Utc>) -> Diff {
        let mut changes = Diff::new();
        self.slot(domain).send_if_modified(|state| {
            changes = diff(&state.data, &new);
            if changes.is_empty() {
                return false;
            }
            *state = Arc::new(DomainState {
                data: new,
                last_update: Some(now),
            });
            true
        });
        changes
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Current state of one domain. Cheap: shares the stored `Arc`.
    pub fn get(&self, domain: Domain) -> Arc<DomainState> {
        Arc::clone(&self.slot(domain).borrow())
    }

    /// Copy of one domain's data.
    pub fn data(&self, domain: Domain) -> Snapshot {
        self.slot(domain).borrow().data.clone()
    }

    pub fn last_update(&self, domain: Domain) -> Option<DateTime<Utc>> {
        self.slot(domain).borrow().last_update
    }

    /// Point-in-time copy of every domain.
    ///
    /// Each domain is read under its own lock; a concurrent write to
    /// another domain may land between reads.
    pub fn snapshot(&self) -> StateSnapshot {
        self.domains
            .iter()
            .map(|(domain, slot)| (*domain, DomainState::clone(&slot.borrow())))
            .collect()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe(&self, domain: Domain) -> DomainStream {
        DomainStream::new(self.slot(domain).subscribe())
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn snap(pairs: &[(&str, serde_json::Value)]) -> Snapshot {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn starts_empty_with_no_timestamp() {
        let store = StateStore::new();
        let all = store.snapshot();
        assert_eq!(all.len(), 5);
        assert!(all.values().all(|s| s.data.is_empty() && s.last_update.is_none()));
    }

    #[test]
    fn apply_stores_and_returns_diff() {
        let store = StateStore::new();
        let first = snap(&[("dev1", json!("ON"))]);

        let changes = store.apply(Domain::Telemetry, first.clone());

        assert_eq!(changes, first);
        assert_eq!(store.data(Domain::Telemetry), first);
        assert!(store.last_update(Domain::Telemetry).is_some());
        assert!(store.data(Domain::Mail).is_empty());
    }

    #[test]
    fn unchanged_apply_leaves_timestamp_alone() {
        let store = StateStore::new();
        let t0 = DateTime::from_timestamp(1_000, 0).unwrap();
        let t1 = DateTime::from_timestamp(2_000, 0).unwrap();
        let data = snap(&[("a", json!(1))]);

        store.apply_at(Domain::Feed, data.clone(), t0);
        let changes = store.apply_at(Domain::Feed, data, t1);

        assert!(changes.is_empty());
        assert_eq!(store.last_update(Domain::Feed), Some(t0));
    }

    #[test]
    fn removal_replaces_data_without_reporting() {
        let store = StateStore::new();
        store.apply(Domain::Mail, snap(&[("m1", json!(1)), ("m2", json!(2))]));

        let changes = store.apply(Domain::Mail, snap(&[("m2", json!(2)), ("m3", json!(3))]));

        assert_eq!(changes, snap(&[("m3", json!(3))]));
        assert_eq!(
            store.data(Domain::Mail),
            snap(&[("m2", json!(2)), ("m3", json!(3))])
        );
    }

    #[test]
    fn readers_get_independent_copies() {
        let store = StateStore::new();
        store.apply(Domain::Media, snap(&[("/v/a.mp4", json!({ "label": "cat" }))]));

        let mut copy = store.snapshot();
        copy.get_mut(&Domain::Media).unwrap().data.clear();

        assert_eq!(store.data(Domain::Media).len(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_only_real_changes() {
        let store = StateStore::new();
        let mut stream = store.subscribe(Domain::Calendar);

        store.apply(Domain::Calendar, snap(&[("e1", json!("Standup"))]));
        let seen = stream.changed().await.unwrap();
        assert_eq!(seen.data.len(), 1);

        store.apply(Domain::Calendar, snap(&[("e1", json!("Standup"))]));
        assert!(!stream.has_changed());
    }
}
