//! Top-level coordinator tying ingestion, maintenance, and reads together.
//!
//! A [`Monitor`] owns the backing store client, the accumulator, the
//! catalogue index, and the flush scheduler. It is designed for a single
//! logical thread of control: the RPC server wraps it in a mutex and
//! routes every request and the maintenance tick through it one at a
//! time, so none of the owned state needs interior locking.

use crate::accumulator::{Accumulator, CatalogueIndex, WriteMode};
use crate::error::Result;
use crate::flush::{FlushScheduler, Health};
use crate::ident::{self, MetricIdentity};
use crate::query::{self, Point};
use crate::store::{MetricStore, keys};
use crate::time::minute_start;

/// Aggregation engine over one backing store.
#[derive(Debug)]
pub struct Monitor<S: MetricStore> {
    store: S,
    accumulator: Accumulator,
    catalogue: CatalogueIndex,
    scheduler: FlushScheduler,
}

impl<S: MetricStore> Monitor<S> {
    /// Builds a monitor over `store`, recovering rollup watermarks
    /// persisted by a previous run.
    ///
    /// # Errors
    ///
    /// Propagates store failures reading the watermarks.
    pub fn new(mut store: S, now: u64) -> Result<Self> {
        let scheduler = FlushScheduler::recover(&mut store, now)?;
        Ok(Self {
            store,
            accumulator: Accumulator::new(),
            catalogue: CatalogueIndex::new(),
            scheduler,
        })
    }

    /// Adds `value` to the current minute bucket of `(scope, key, host)`.
    ///
    /// # Errors
    ///
    /// Validation failure rejects the request before any state changes;
    /// a store failure during first-sight catalogue registration leaves
    /// the accumulator untouched.
    pub fn increment(
        &mut self,
        scope: &str,
        key: &str,
        host: &str,
        value: u64,
        now: u64,
    ) -> Result<()> {
        self.record(scope, key, host, value, now, WriteMode::Increment)
    }

    /// Replaces the current minute bucket of `(scope, key, host)` with
    /// `value` (last write wins).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Monitor::increment`].
    pub fn overwrite(
        &mut self,
        scope: &str,
        key: &str,
        host: &str,
        value: u64,
        now: u64,
    ) -> Result<()> {
        self.record(scope, key, host, value, now, WriteMode::Overwrite)
    }

    fn record(
        &mut self,
        scope: &str,
        key: &str,
        host: &str,
        value: u64,
        now: u64,
        mode: WriteMode,
    ) -> Result<()> {
        let identity = MetricIdentity::new(scope, key, host)?;
        self.register(&identity)?;
        self.accumulator
            .apply(identity, minute_start(now), value, mode);
        Ok(())
    }

    /// Registers an identity in the store's index sets on first sight.
    /// The catalogue index makes repeat registrations free.
    fn register(&mut self, identity: &MetricIdentity) -> Result<()> {
        if self.catalogue.contains(identity) {
            return Ok(());
        }
        tracing::info!(identity = %identity, "registering new metric identity");

        self.store.set_add(keys::SCOPES, identity.scope())?;
        self.store
            .set_add(&keys::scope_keys(identity.scope()), identity.key())?;
        self.store.set_add(
            &keys::key_hosts(identity.scope(), identity.key()),
            identity.host(),
        )?;

        self.catalogue.insert(identity.clone());
        Ok(())
    }

    /// One maintenance timer tick; see [`FlushScheduler::tick`].
    pub fn tick(&mut self, now: u64) -> Health {
        self.scheduler
            .tick(&mut self.store, &mut self.accumulator, now)
    }

    /// Forces a full maintenance pass immediately (shutdown flush).
    ///
    /// # Errors
    ///
    /// Propagates the first store failure; safe to retry.
    pub fn flush_now(&mut self, now: u64) -> Result<()> {
        self.scheduler
            .run_pass(&mut self.store, &mut self.accumulator, now)?;
        Ok(())
    }

    /// Current scheduler condition.
    #[must_use]
    pub fn health(&self) -> Health {
        self.scheduler.health()
    }

    /// All known scope names.
    ///
    /// # Errors
    ///
    /// Store failures pass through.
    pub fn list_scopes(&mut self) -> Result<Vec<String>> {
        query::list_scopes(&mut self.store)
    }

    /// All key names under `scope`.
    ///
    /// # Errors
    ///
    /// Validation failure for a malformed scope; store failures pass
    /// through.
    pub fn list_keys(&mut self, scope: &str) -> Result<Vec<String>> {
        ident::validate_scope(scope)?;
        query::list_keys(&mut self.store, scope)
    }

    /// All host names under `scope` + `key`.
    ///
    /// # Errors
    ///
    /// Validation failure for a malformed scope or key; store failures
    /// pass through.
    pub fn list_hosts(&mut self, scope: &str, key: &str) -> Result<Vec<String>> {
        ident::validate_scope(scope)?;
        ident::validate_key(key)?;
        query::list_hosts(&mut self.store, scope, key)
    }

    /// Minute series ending at the minute before `now`; empty host reads
    /// the cross-host aggregate.
    ///
    /// # Errors
    ///
    /// Validation failure for malformed components or an out-of-bounds
    /// count; store failures pass through.
    pub fn query_minutes(
        &mut self,
        scope: &str,
        key: &str,
        host: &str,
        count: u64,
        now: u64,
    ) -> Result<Vec<Point>> {
        let identity = MetricIdentity::for_query(scope, key, host)?;
        query::minute_series(
            &mut self.store,
            identity.scope(),
            identity.key(),
            identity.host(),
            count,
            now,
        )
    }

    /// Daily series ending at the day before `now`; empty host reads the
    /// cross-host aggregate.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Monitor::query_minutes`].
    pub fn query_daily(
        &mut self,
        scope: &str,
        key: &str,
        host: &str,
        count: u64,
        now: u64,
    ) -> Result<Vec<Point>> {
        let identity = MetricIdentity::for_query(scope, key, host)?;
        query::daily_series(
            &mut self.store,
            identity.scope(),
            identity.key(),
            identity.host(),
            count,
            now,
        )
    }

    /// Number of pending accumulator entries (diagnostics).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.accumulator.len()
    }

    /// Consumes the monitor and hands the store client back, e.g. to
    /// reuse the connection after a clean shutdown.
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }
}
