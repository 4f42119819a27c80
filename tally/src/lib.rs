//! # tally
//!
//! Counter aggregation engine: processes emit named counters tagged by
//! `(scope, key, host)`; tally accumulates them in memory, persists
//! per-minute totals to an external key-value store, rolls minutes up
//! into cross-host and daily aggregates, retires minute data past a
//! seven-day window, and serves time-range and catalogue queries.
//!
//! ## Key Properties
//!
//! - Exactly-once flush per closed minute bucket across process restarts
//! - Monotonic, per-boundary persisted rollup watermarks (crash-safe
//!   catch-up with idempotent recomputation)
//! - Bounded minute-level retention behind daily rollups
//! - Tolerates transient store outages without losing or double-counting
//!   data; sustained outage escalates to a fatal condition
//!
//! ## Quick Start
//!
//! ```rust
//! use tally::{MemoryStore, Monitor};
//!
//! # fn main() -> tally::Result<()> {
//! let now = 1_700_000_130;
//! let mut monitor = Monitor::new(MemoryStore::new(), now)?;
//!
//! // Ingest: two increments land in the same minute bucket.
//! monitor.increment("trade", "order_count", "host1", 3, now)?;
//! monitor.increment("trade", "order_count", "host1", 2, now)?;
//!
//! // A maintenance tick in the next minute flushes the closed bucket.
//! monitor.tick(now + 60);
//!
//! let points = monitor.query_minutes("trade", "order_count", "host1", 1, now + 60)?;
//! assert_eq!(points[0].1, 5);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Monitor`] — top-level coordinator owning store, accumulator,
//!   catalogue cache, and scheduler
//! - [`MetricStore`] — narrow interface to the external key-value store
//! - [`FlushScheduler`] — once-per-minute drain + rollup + retention pass
//!   with the Healthy/Degraded/Fatal failure machine
//! - [`RedisStore`] / [`MemoryStore`] — store implementations
//!
//! ## Modules
//!
//! - [`ident`] — identity validation
//! - [`accumulator`] — pending-bucket map and catalogue index
//! - [`store`] — store trait, key layout, in-memory implementation
//! - [`redis_store`] — Redis-backed store client
//! - [`flush`] — maintenance scheduling and failure tracking
//! - [`rollup`] — watermark-driven minute/daily catch-up
//! - [`sweep`] — minute-level retention
//! - [`query`] — series and catalogue reads
//! - [`monitor`] — the coordinator
//! - [`proto`] — RPC wire types
//! - [`admin`] — operator maintenance (scope deletion)
//! - [`error`] — error types

pub mod accumulator;
pub mod admin;
pub mod error;
pub mod flush;
pub mod ident;
pub mod monitor;
pub mod proto;
pub mod query;
pub mod redis_store;
pub mod rollup;
pub mod store;
pub mod sweep;
pub mod time;

// Re-export primary API types at crate root for convenience.
pub use error::{Result, StoreError, TallyError, ValidationError};
pub use flush::{FlushScheduler, Health};
pub use ident::MetricIdentity;
pub use monitor::Monitor;
pub use redis_store::RedisStore;
pub use store::{MemoryStore, MetricStore};
