//! Retention sweeping of minute-level data.
//!
//! Minute fields are deleted once they are older than [`KEEP_DAYS`] days
//! relative to a rolled-up day boundary. The daily rollup for a boundary
//! always runs before the sweep tied to that boundary, so no minute value
//! is dropped before it is represented at daily granularity. The
//! cross-host aggregate series (empty host) is swept with the same policy
//! as per-host series.

use crate::error::StoreError;
use crate::store::{MetricStore, keys};
use crate::time::DAY;

/// How many days of minute-level data to keep behind a rolled-up day
/// boundary.
pub const KEEP_DAYS: u64 = 7;

/// Deletes all minute fields for `(scope, key, host)` strictly older than
/// `day - KEEP_DAYS` days.
///
/// # Errors
///
/// Propagates store failures; nothing is deleted on a failed read.
pub fn sweep_minutes<S: MetricStore>(
    store: &mut S,
    scope: &str,
    key: &str,
    host: &str,
    day: u64,
) -> Result<(), StoreError> {
    let cutoff = day.saturating_sub(KEEP_DAYS * DAY);
    let hash = keys::minute_hash(scope, key, host);

    let stale: Vec<u64> = store
        .hash_get_all(&hash)?
        .into_iter()
        .map(|(field, _)| field)
        .filter(|field| *field < cutoff)
        .collect();

    if !stale.is_empty() {
        tracing::debug!(
            series = %hash,
            fields = stale.len(),
            cutoff,
            "sweeping expired minute data"
        );
        store.hash_delete(&hash, &stale)?;
    }

    Ok(())
}
