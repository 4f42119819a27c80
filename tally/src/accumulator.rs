//! Process-local accumulation of pending counter updates.
//!
//! Ingestion lands in the [`Accumulator`]: a map from
//! `(identity, minute bucket)` to the value accumulated since the last
//! flush. Entries for the current minute stay pending until the minute
//! rolls over; the flush scheduler drains only matured buckets, so every
//! closed bucket is written to the store exactly once.
//!
//! The [`CatalogueIndex`] is the companion cache tracking which identities
//! this process has already registered in the store's index sets. Absence
//! means "not yet confirmed by this process", never "absent from the
//! store"; presence is authoritative for skipping redundant registration.

use std::collections::{HashMap, HashSet};

use crate::ident::MetricIdentity;

/// How an ingestion call combines with the pending value for its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Add to the pending value (sum of all increments since last flush).
    Increment,
    /// Replace the pending value (last write wins).
    Overwrite,
}

/// Pending per-bucket counter updates, keyed by identity and minute.
#[derive(Debug, Default)]
pub struct Accumulator {
    entries: HashMap<(MetricIdentity, u64), u64>,
}

impl Accumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one ingestion update to the bucket at `bucket` (a
    /// minute-aligned timestamp).
    pub fn apply(&mut self, identity: MetricIdentity, bucket: u64, value: u64, mode: WriteMode) {
        let slot = self.entries.entry((identity, bucket)).or_insert(0);
        match mode {
            WriteMode::Increment => *slot = slot.wrapping_add(value),
            WriteMode::Overwrite => *slot = value,
        }
    }

    /// Snapshot of all entries whose bucket closed before `cutoff`
    /// (a minute-aligned timestamp). Entries for the current minute are
    /// excluded so a bucket is only drained once it can no longer change.
    #[must_use]
    pub fn matured(&self, cutoff: u64) -> Vec<(MetricIdentity, u64, u64)> {
        self.entries
            .iter()
            .filter(|((_, bucket), _)| *bucket < cutoff)
            .map(|((identity, bucket), value)| (identity.clone(), *bucket, *value))
            .collect()
    }

    /// Removes one drained entry. Called immediately after the store
    /// accepted the bucket's value (or for zero-valued buckets that need
    /// no store write).
    pub fn remove(&mut self, identity: &MetricIdentity, bucket: u64) {
        self.entries.remove(&(identity.clone(), bucket));
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending value for one bucket, if any.
    #[must_use]
    pub fn get(&self, identity: &MetricIdentity, bucket: u64) -> Option<u64> {
        self.entries.get(&(identity.clone(), bucket)).copied()
    }
}

/// Process-local cache of identities already registered in the store's
/// scope/key/host index sets.
#[derive(Debug, Default)]
pub struct CatalogueIndex {
    seen: HashSet<MetricIdentity>,
}

impl CatalogueIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this process has already confirmed registration.
    #[must_use]
    pub fn contains(&self, identity: &MetricIdentity) -> bool {
        self.seen.contains(identity)
    }

    /// Records a confirmed registration.
    pub fn insert(&mut self, identity: MetricIdentity) {
        self.seen.insert(identity);
    }

    /// Number of confirmed identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no identity has been confirmed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
