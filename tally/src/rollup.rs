//! Watermark-driven rollup of minute data.
//!
//! Two independent catch-up loops, each advancing a persisted watermark
//! one boundary at a time:
//!
//! - **Minute cross-host aggregation**: for each closed minute boundary,
//!   sum every registered host's value per `(scope, key)` and overwrite
//!   the aggregate (empty-host) minute field with the total.
//! - **Daily rollup**: for each closed day boundary, sum the 1440 minute
//!   fields per `(scope, key, host)` — aggregate host included — into the
//!   daily hash, then immediately sweep that series' expired minutes.
//!
//! Both loops persist the watermark only after a boundary's work has
//! fully succeeded, so a crash mid-loop resumes at the next unprocessed
//! boundary. Recomputing a boundary is safe: per-boundary sums are
//! deterministic and written with overwrite semantics.

use crate::error::StoreError;
use crate::store::{MetricStore, keys};
use crate::sweep;
use crate::time::{DAY, MINUTE, day_start, minute_start};

/// Minute fields in one day.
const MINUTES_PER_DAY: u64 = DAY / MINUTE;

/// Catches the minute cross-host aggregation up to the last closed
/// boundary before the current minute. Returns the advanced watermark.
///
/// # Errors
///
/// Stops at the first store failure; boundaries already persisted stay
/// persisted, so the next call resumes where this one gave up.
pub fn catch_up_minutes<S: MetricStore>(
    store: &mut S,
    mut watermark: u64,
    now: u64,
) -> Result<u64, StoreError> {
    let current = minute_start(now);
    while watermark + MINUTE < current {
        let boundary = watermark + MINUTE;
        aggregate_minute(store, boundary)?;
        store.string_set(keys::MINUTE_WATERMARK, boundary)?;
        watermark = boundary;
    }
    Ok(watermark)
}

/// Computes cross-host sums for every registered `(scope, key)` at one
/// minute boundary.
fn aggregate_minute<S: MetricStore>(store: &mut S, boundary: u64) -> Result<(), StoreError> {
    for scope in store.set_members(keys::SCOPES)? {
        for key in store.set_members(&keys::scope_keys(&scope))? {
            aggregate_minute_key(store, &scope, &key, boundary)?;
        }
    }
    tracing::debug!(boundary, "minute cross-host aggregation done");
    Ok(())
}

/// Sums one `(scope, key)` across all its hosts at `boundary` and writes
/// the aggregate field. Hosts with no value contribute 0; an all-absent
/// boundary writes nothing (absence and zero read the same).
fn aggregate_minute_key<S: MetricStore>(
    store: &mut S,
    scope: &str,
    key: &str,
    boundary: u64,
) -> Result<(), StoreError> {
    let mut total: u64 = 0;
    for host in store.set_members(&keys::key_hosts(scope, key))? {
        let value = store
            .hash_get(&keys::minute_hash(scope, key, &host), boundary)?
            .unwrap_or(0);
        total = total.wrapping_add(value);
    }

    if total != 0 {
        store.hash_set(&keys::minute_hash(scope, key, ""), boundary, total)?;
    }
    Ok(())
}

/// Catches the daily rollup up to the last closed day boundary before the
/// current day. Returns the advanced watermark.
///
/// # Errors
///
/// Stops at the first store failure, leaving the watermark at the last
/// fully committed boundary.
pub fn catch_up_daily<S: MetricStore>(
    store: &mut S,
    mut watermark: u64,
    now: u64,
) -> Result<u64, StoreError> {
    let current = day_start(now);
    while watermark + DAY < current {
        let boundary = watermark + DAY;
        rollup_day(store, boundary)?;
        store.string_set(keys::DAILY_WATERMARK, boundary)?;
        watermark = boundary;
    }
    Ok(watermark)
}

/// Rolls one day boundary up for every registered series, aggregate host
/// first, then each registered host.
fn rollup_day<S: MetricStore>(store: &mut S, boundary: u64) -> Result<(), StoreError> {
    for scope in store.set_members(keys::SCOPES)? {
        for key in store.set_members(&keys::scope_keys(&scope))? {
            rollup_day_series(store, &scope, &key, "", boundary)?;
            for host in store.set_members(&keys::key_hosts(&scope, &key))? {
                rollup_day_series(store, &scope, &key, &host, boundary)?;
            }
        }
    }
    tracing::info!(boundary, "daily rollup done");
    Ok(())
}

/// Sums the day's 1440 minute fields for one series into its daily hash,
/// then sweeps that series' expired minute data. Absent minutes count as
/// 0; an entirely absent day writes no daily field.
fn rollup_day_series<S: MetricStore>(
    store: &mut S,
    scope: &str,
    key: &str,
    host: &str,
    boundary: u64,
) -> Result<(), StoreError> {
    let fields: Vec<u64> = (0..MINUTES_PER_DAY)
        .map(|i| boundary + i * MINUTE)
        .collect();

    let total: u64 = store
        .hash_multi_get(&keys::minute_hash(scope, key, host), &fields)?
        .into_iter()
        .flatten()
        .fold(0u64, u64::wrapping_add);

    if total != 0 {
        store.hash_set(&keys::daily_hash(scope, key, host), boundary, total)?;
    }

    sweep::sweep_minutes(store, scope, key, host, boundary)
}
