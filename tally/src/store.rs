//! Backing store interface and key layout.
//!
//! The engine consumes an external key-value store through the narrow
//! [`MetricStore`] trait: set membership for the scope/key/host catalogue,
//! hashes for minute and daily counter series, and two plain string keys
//! for the rollup watermarks. The store's own durability and replication
//! are its business; the engine only assumes that a call either completes
//! or returns a [`StoreError`].
//!
//! # Key Layout
//!
//! ```text
//! m:scopes                      <- set of scope names
//! m:{scope}:keys                <- set of key names under a scope
//! m:{scope}:{key}:hosts         <- set of host names under scope+key
//! m:{scope}:{key}:{host}:m      <- hash: minute timestamp -> counter
//! m:{scope}:{key}:{host}:d      <- hash: day timestamp -> counter
//! m:last_minute_rollup          <- minute rollup watermark
//! m:last_daily_rollup           <- daily rollup watermark
//! ```
//!
//! An empty host component (`m:{scope}:{key}::m`) addresses the
//! cross-host aggregate series.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::StoreError;

/// Narrow interface to the backing key-value store.
///
/// All calls are synchronous round-trips; implementations retry through a
/// reconnect internally (at most one reconnect per logical call) and
/// return [`StoreError`] once the call is given up on.
pub trait MetricStore {
    /// Adds a member to a set. Adding an existing member is a no-op.
    fn set_add(&mut self, set: &str, member: &str) -> Result<(), StoreError>;

    /// All members of a set; empty if the set does not exist.
    fn set_members(&mut self, set: &str) -> Result<Vec<String>, StoreError>;

    /// Removes a member from a set. Removing a missing member is a no-op.
    fn set_remove(&mut self, set: &str, member: &str) -> Result<(), StoreError>;

    /// Reads one hash field, `None` if absent.
    fn hash_get(&mut self, hash: &str, field: u64) -> Result<Option<u64>, StoreError>;

    /// Reads many hash fields in one round-trip, position-matched to
    /// `fields`, `None` where absent.
    fn hash_multi_get(
        &mut self,
        hash: &str,
        fields: &[u64],
    ) -> Result<Vec<Option<u64>>, StoreError>;

    /// Overwrites one hash field.
    fn hash_set(&mut self, hash: &str, field: u64, value: u64) -> Result<(), StoreError>;

    /// Atomically adds `delta` to one hash field, creating it at zero.
    fn hash_increment(&mut self, hash: &str, field: u64, delta: u64) -> Result<(), StoreError>;

    /// All field/value pairs of a hash; empty if the hash does not exist.
    fn hash_get_all(&mut self, hash: &str) -> Result<Vec<(u64, u64)>, StoreError>;

    /// Deletes the given hash fields. Missing fields are ignored.
    fn hash_delete(&mut self, hash: &str, fields: &[u64]) -> Result<(), StoreError>;

    /// Deletes an entire key (set, hash, or string). Missing keys are
    /// ignored.
    fn key_delete(&mut self, key: &str) -> Result<(), StoreError>;

    /// Reads a plain string key as an integer, `None` if absent.
    fn string_get(&mut self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Writes a plain string key.
    fn string_set(&mut self, key: &str, value: u64) -> Result<(), StoreError>;
}

/// Store key construction for the layout above.
pub mod keys {
    /// Set of all known scope names.
    pub const SCOPES: &str = "m:scopes";

    /// Minute rollup watermark key.
    pub const MINUTE_WATERMARK: &str = "m:last_minute_rollup";

    /// Daily rollup watermark key.
    pub const DAILY_WATERMARK: &str = "m:last_daily_rollup";

    /// Set of key names registered under a scope.
    #[must_use]
    pub fn scope_keys(scope: &str) -> String {
        format!("m:{scope}:keys")
    }

    /// Set of host names registered under a scope+key.
    #[must_use]
    pub fn key_hosts(scope: &str, key: &str) -> String {
        format!("m:{scope}:{key}:hosts")
    }

    /// Minute-series hash for one `(scope, key, host)` triple. An empty
    /// host yields the cross-host aggregate hash.
    #[must_use]
    pub fn minute_hash(scope: &str, key: &str, host: &str) -> String {
        format!("m:{scope}:{key}:{host}:m")
    }

    /// Daily-series hash for one `(scope, key, host)` triple.
    #[must_use]
    pub fn daily_hash(scope: &str, key: &str, host: &str) -> String {
        format!("m:{scope}:{key}:{host}:d")
    }
}

/// In-process [`MetricStore`] backed by plain maps.
///
/// Used by the test suite and by `tally-server --memory` for local
/// development. Never fails; set members and hash fields come back in
/// sorted order, which keeps tests deterministic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: HashMap<String, BTreeSet<String>>,
    hashes: HashMap<String, BTreeMap<u64, u64>>,
    strings: HashMap<String, u64>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricStore for MemoryStore {
    fn set_add(&mut self, set: &str, member: &str) -> Result<(), StoreError> {
        self.sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    fn set_members(&mut self, set: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn set_remove(&mut self, set: &str, member: &str) -> Result<(), StoreError> {
        if let Some(members) = self.sets.get_mut(set) {
            members.remove(member);
            if members.is_empty() {
                self.sets.remove(set);
            }
        }
        Ok(())
    }

    fn hash_get(&mut self, hash: &str, field: u64) -> Result<Option<u64>, StoreError> {
        Ok(self
            .hashes
            .get(hash)
            .and_then(|fields| fields.get(&field).copied()))
    }

    fn hash_multi_get(
        &mut self,
        hash: &str,
        fields: &[u64],
    ) -> Result<Vec<Option<u64>>, StoreError> {
        let stored = self.hashes.get(hash);
        Ok(fields
            .iter()
            .map(|field| stored.and_then(|h| h.get(field).copied()))
            .collect())
    }

    fn hash_set(&mut self, hash: &str, field: u64, value: u64) -> Result<(), StoreError> {
        self.hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field, value);
        Ok(())
    }

    fn hash_increment(&mut self, hash: &str, field: u64, delta: u64) -> Result<(), StoreError> {
        let slot = self
            .hashes
            .entry(hash.to_string())
            .or_default()
            .entry(field)
            .or_insert(0);
        *slot = slot.wrapping_add(delta);
        Ok(())
    }

    fn hash_get_all(&mut self, hash: &str) -> Result<Vec<(u64, u64)>, StoreError> {
        Ok(self
            .hashes
            .get(hash)
            .map(|fields| fields.iter().map(|(f, v)| (*f, *v)).collect())
            .unwrap_or_default())
    }

    fn hash_delete(&mut self, hash: &str, fields: &[u64]) -> Result<(), StoreError> {
        if let Some(stored) = self.hashes.get_mut(hash) {
            for field in fields {
                stored.remove(field);
            }
            if stored.is_empty() {
                self.hashes.remove(hash);
            }
        }
        Ok(())
    }

    fn key_delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.sets.remove(key);
        self.hashes.remove(key);
        self.strings.remove(key);
        Ok(())
    }

    fn string_get(&mut self, key: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.strings.get(key).copied())
    }

    fn string_set(&mut self, key: &str, value: u64) -> Result<(), StoreError> {
        self.strings.insert(key.to_string(), value);
        Ok(())
    }
}
