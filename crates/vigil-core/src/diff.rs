//! Additive change detection between two snapshots of one domain.

use crate::model::{Diff, Snapshot};

/// Entries of `new` that are absent from `old` or whose value differs.
///
/// Keys present in `old` but missing from `new` are not reported.
pub fn diff(old: &Snapshot, new: &Snapshot) -> Diff {
    new.iter()
        .filter(|(key, value)| old.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
