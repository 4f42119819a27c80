//! Bucket arithmetic over unix timestamps.
//!
//! All timestamps in the engine are unix seconds (`u64`). Minute buckets
//! are truncated to `t - t % 60`, day buckets to `t - t % 86400` (UTC day
//! boundaries).

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds in a minute bucket.
pub const MINUTE: u64 = 60;

/// Seconds in a day bucket.
pub const DAY: u64 = 86_400;

/// Truncates a timestamp to the start of its minute bucket.
#[must_use]
pub fn minute_start(t: u64) -> u64 {
    t - t % MINUTE
}

/// Truncates a timestamp to the start of its UTC day bucket.
#[must_use]
pub fn day_start(t: u64) -> u64 {
    t - t % DAY
}

/// Current wall-clock time as unix seconds.
///
/// # Panics
///
/// Panics if the system clock is set before the unix epoch.
#[must_use]
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}
