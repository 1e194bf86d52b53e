// ── Domain model ──
//
// Snapshots are ordered maps of item key → arbitrary JSON payload, one per
// domain. Everything here is plain data; behaviour lives in `store`,
// `diff`, `pump` and `consumer`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The independently refreshed sources the aggregator tracks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
    Telemetry,
    Mail,
    Calendar,
    Feed,
    Media,
}

/// Item key → payload for one domain.
pub type Snapshot = BTreeMap<String, serde_json::Value>;

/// Changed or added entries between two snapshots. Never carries removals.
pub type Diff = Snapshot;

/// A domain's current data and when it last changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainState {
    pub data: Snapshot,
    pub last_update: Option<DateTime<Utc>>,
}

/// Point-in-time copy of every domain.
pub type StateSnapshot = BTreeMap<Domain, DomainState>;

/// One non-empty diff waiting on the fan-in queue.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub domain: Domain,
    pub diff: Diff,
}

/// What the consumer hands to the caller after each drain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    /// Consolidated diffs, later entries overwriting earlier ones.
    pub updates: BTreeMap<Domain, Diff>,
    pub state: StateSnapshot,
}
