//! End-to-end tests of the ingestion → flush → rollup → retention → query
//! lifecycle over an in-memory store.

use tally::store::{MetricStore, keys};
use tally::sweep::KEEP_DAYS;
use tally::time::{DAY, MINUTE, day_start};
use tally::{Health, MemoryStore, Monitor};

/// A minute-aligned base time well past the epoch (2023-11-14T22:15:00Z).
const T0: u64 = 1_700_000_100;

#[test]
fn test_increment_flush_query_example() {
    let mut monitor = Monitor::new(MemoryStore::new(), T0).unwrap();

    monitor.increment("trade", "order_count", "host1", 3, T0).unwrap();
    monitor.increment("trade", "order_count", "host1", 2, T0 + 20).unwrap();

    // Nothing is visible before the bucket closes.
    let points = monitor
        .query_minutes("trade", "order_count", "host1", 1, T0 + 30)
        .unwrap();
    assert_eq!(points, vec![(T0 - MINUTE, 0)]);

    // The tick after rollover drains the closed bucket.
    assert_eq!(monitor.tick(T0 + MINUTE + 1), Health::Healthy);
    let points = monitor
        .query_minutes("trade", "order_count", "host1", 1, T0 + MINUTE + 1)
        .unwrap();
    assert_eq!(points, vec![(T0, 5)]);
}

#[test]
fn test_invalid_scope_is_rejected() {
    let mut monitor = Monitor::new(MemoryStore::new(), T0).unwrap();
    assert!(monitor.increment("has space", "order_count", "host1", 3, T0).is_err());
    assert_eq!(monitor.pending(), 0);
}

#[test]
fn test_cross_host_aggregate_after_rollup() {
    let mut monitor = Monitor::new(MemoryStore::new(), T0).unwrap();

    monitor.increment("trade", "order_count", "host1", 3, T0).unwrap();
    monitor.increment("trade", "order_count", "host2", 4, T0).unwrap();

    // One tick past rollover drains the closed bucket and, in the same
    // pass, rolls the T0 boundary up across hosts.
    monitor.tick(T0 + MINUTE + 1);

    let agg = monitor
        .query_minutes("trade", "order_count", "", 1, T0 + MINUTE)
        .unwrap();
    assert_eq!(agg, vec![(T0, 7)]);
}

#[test]
fn test_flush_uses_increment_semantics_across_restarts() {
    // A restart between two partial accumulations of the same minute must
    // sum in the store, not overwrite.
    let mut monitor = Monitor::new(MemoryStore::new(), T0).unwrap();
    monitor.increment("trade", "order_count", "host1", 3, T0).unwrap();
    monitor.flush_now(T0 + MINUTE).unwrap();
    let store = monitor.into_store();

    let mut monitor = Monitor::new(store, T0 + 10).unwrap();
    monitor.increment("trade", "order_count", "host1", 2, T0 + 10).unwrap();
    monitor.flush_now(T0 + MINUTE).unwrap();

    let points = monitor
        .query_minutes("trade", "order_count", "host1", 1, T0 + MINUTE)
        .unwrap();
    assert_eq!(points, vec![(T0, 5)]);
}

#[test]
fn test_daily_rollup_and_retention_lifecycle() {
    // Start exactly at a day boundary so bucket arithmetic is easy to
    // follow: ingest during day D, then let the maintenance pass observe
    // a time in day D+1 so day D rolls up.
    let day0 = day_start(T0) + DAY;
    let mut monitor = Monitor::new(MemoryStore::new(), day0).unwrap();

    monitor.increment("trade", "order_count", "host1", 10, day0 + 60).unwrap();
    monitor.increment("trade", "order_count", "host1", 5, day0 + 120).unwrap();
    monitor.overwrite("trade", "queue_depth", "host1", 7, day0 + 120).unwrap();

    monitor.flush_now(day0 + DAY + 60).unwrap();

    let daily = monitor
        .query_daily("trade", "order_count", "host1", 1, day0 + DAY + 60)
        .unwrap();
    assert_eq!(daily, vec![(day0, 15)]);

    // The aggregate series carries the same totals (single host).
    let daily_agg = monitor
        .query_daily("trade", "order_count", "", 1, day0 + DAY + 60)
        .unwrap();
    assert_eq!(daily_agg, vec![(day0, 15)]);

    let depth = monitor
        .query_daily("trade", "queue_depth", "host1", 1, day0 + DAY + 60)
        .unwrap();
    assert_eq!(depth, vec![(day0, 7)]);
}

#[test]
fn test_retention_clears_minutes_behind_daily_totals() {
    let day0 = day_start(T0) + DAY;
    let mut monitor = Monitor::new(MemoryStore::new(), day0).unwrap();

    monitor.increment("trade", "order_count", "host1", 9, day0 + 60).unwrap();

    // Flush within day0, then run the maintenance pass at a point far
    // enough out that day0's minutes age past the retention window.
    monitor.flush_now(day0 + DAY).unwrap();
    let horizon = day0 + (KEEP_DAYS + 2) * DAY;
    monitor.flush_now(horizon).unwrap();

    // The daily total survives; the minute field does not.
    let daily = monitor.query_daily("trade", "order_count", "host1", KEEP_DAYS + 2, horizon).unwrap();
    assert!(daily.contains(&(day0, 9)));

    let mut store = monitor.into_store();
    assert_eq!(
        store
            .hash_get(&keys::minute_hash("trade", "order_count", "host1"), day0 + 60)
            .unwrap(),
        None
    );
}

#[test]
fn test_watermarks_survive_restart() {
    let mut monitor = Monitor::new(MemoryStore::new(), T0).unwrap();
    monitor.increment("trade", "order_count", "host1", 1, T0).unwrap();
    monitor.tick(T0 + 5 * MINUTE);
    let store = monitor.into_store();

    // A fresh process over the same store resumes from the persisted
    // watermark (T0 + 4 min) instead of re-deriving it from the clock,
    // and catches up the minutes it missed.
    let mut monitor = Monitor::new(store, T0 + 30 * MINUTE).unwrap();
    monitor.tick(T0 + 30 * MINUTE);
    let mut store = monitor.into_store();
    assert_eq!(
        store.string_get(keys::MINUTE_WATERMARK).unwrap(),
        Some(T0 + 29 * MINUTE)
    );
    // The T0 aggregate was computed exactly once with the full value.
    assert_eq!(
        store
            .hash_get(&keys::minute_hash("trade", "order_count", ""), T0)
            .unwrap(),
        Some(1)
    );
}

#[test]
fn test_query_daily_with_no_data_zero_fills() {
    let mut monitor = Monitor::new(MemoryStore::new(), T0).unwrap();
    let points = monitor.query_daily("trade", "order_count", "host1", 7, T0).unwrap();
    assert_eq!(points.len(), 7);
    assert!(points.iter().all(|(_, value)| *value == 0));
    let first = points[0].0;
    assert_eq!(first, day_start(T0) - 7 * DAY);
}
