//! Time-series and catalogue reads.
//!
//! Series queries return a fixed number of consecutive points ending at
//! the bucket before the current one, zero-filled where the store has no
//! field — callers cannot distinguish "never written" from "summed to
//! zero", which is intentional. Catalogue queries are direct
//! set-membership reads. All reads are point-in-time snapshots.

use crate::error::{Result, ValidationError};
use crate::store::{MetricStore, keys};
use crate::time::{DAY, MINUTE, day_start, minute_start};

/// Maximum points a single series query may request (one week of
/// minutes).
pub const MAX_QUERY_POINTS: u64 = 10_080;

/// One series point: `(bucket timestamp, value)`.
pub type Point = (u64, u64);

/// Validates a requested point count against [`MAX_QUERY_POINTS`].
fn check_count(count: u64) -> Result<()> {
    if count == 0 || count > MAX_QUERY_POINTS {
        return Err(ValidationError::BadCount {
            count,
            max: MAX_QUERY_POINTS,
        }
        .into());
    }
    Ok(())
}

/// Reads `count` consecutive minute points for `(scope, key, host)`,
/// ending at the minute before `now`. An empty host reads the cross-host
/// aggregate series.
///
/// # Errors
///
/// [`ValidationError::BadCount`] for an out-of-bounds count; store
/// failures pass through.
pub fn minute_series<S: MetricStore>(
    store: &mut S,
    scope: &str,
    key: &str,
    host: &str,
    count: u64,
    now: u64,
) -> Result<Vec<Point>> {
    check_count(count)?;
    let start = minute_start(now).saturating_sub(count * MINUTE);
    let buckets: Vec<u64> = (0..count).map(|i| start + i * MINUTE).collect();
    read_series(store, &keys::minute_hash(scope, key, host), &buckets)
}

/// Reads `count` consecutive daily points for `(scope, key, host)`,
/// ending at the day before `now`. An empty host reads the cross-host
/// aggregate series.
///
/// # Errors
///
/// [`ValidationError::BadCount`] for an out-of-bounds count; store
/// failures pass through.
pub fn daily_series<S: MetricStore>(
    store: &mut S,
    scope: &str,
    key: &str,
    host: &str,
    count: u64,
    now: u64,
) -> Result<Vec<Point>> {
    check_count(count)?;
    let start = day_start(now).saturating_sub(count * DAY);
    let buckets: Vec<u64> = (0..count).map(|i| start + i * DAY).collect();
    read_series(store, &keys::daily_hash(scope, key, host), &buckets)
}

/// Fetches the requested buckets in one multi-get and zero-fills gaps.
fn read_series<S: MetricStore>(store: &mut S, hash: &str, buckets: &[u64]) -> Result<Vec<Point>> {
    let values = store.hash_multi_get(hash, buckets)?;
    Ok(buckets
        .iter()
        .zip(values)
        .map(|(bucket, value)| (*bucket, value.unwrap_or(0)))
        .collect())
}

/// All known scope names.
///
/// # Errors
///
/// Store failures pass through.
pub fn list_scopes<S: MetricStore>(store: &mut S) -> Result<Vec<String>> {
    Ok(store.set_members(keys::SCOPES)?)
}

/// All key names registered under a scope.
///
/// # Errors
///
/// Store failures pass through.
pub fn list_keys<S: MetricStore>(store: &mut S, scope: &str) -> Result<Vec<String>> {
    Ok(store.set_members(&keys::scope_keys(scope))?)
}

/// All host names registered under a scope+key.
///
/// # Errors
///
/// Store failures pass through.
pub fn list_hosts<S: MetricStore>(store: &mut S, scope: &str, key: &str) -> Result<Vec<String>> {
    Ok(store.set_members(&keys::key_hosts(scope, key))?)
}
