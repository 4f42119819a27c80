//! Administrative store operations.
//!
//! These run directly against the backing store, outside the serving
//! path; they exist for operators retiring whole namespaces.

use crate::error::Result;
use crate::ident;
use crate::store::{MetricStore, keys};

/// Deletes every stored trace of a scope: all per-host and aggregate
/// minute/daily series, the host and key index sets, and the scope's
/// entry in the scope set.
///
/// Running servers keep their catalogue caches, so a process that emitted
/// into the scope will transparently re-register it on its next write.
///
/// # Errors
///
/// Validation failure for a malformed scope; store failures abort the
/// deletion midway (safe to re-run).
pub fn delete_scope<S: MetricStore>(store: &mut S, scope: &str) -> Result<u64> {
    ident::validate_scope(scope)?;

    let mut deleted = 0u64;
    let scope_keys = keys::scope_keys(scope);
    for key in store.set_members(&scope_keys)? {
        let key_hosts = keys::key_hosts(scope, &key);
        for host in store.set_members(&key_hosts)? {
            deleted += delete_series(store, scope, &key, &host)?;
        }
        deleted += delete_series(store, scope, &key, "")?;
        store.key_delete(&key_hosts)?;
    }
    store.key_delete(&scope_keys)?;
    store.set_remove(keys::SCOPES, scope)?;

    tracing::info!(scope, series = deleted, "deleted scope");
    Ok(deleted)
}

/// Deletes one series' minute and daily hashes. Returns how many of the
/// two keys this removed (for operator feedback only).
fn delete_series<S: MetricStore>(
    store: &mut S,
    scope: &str,
    key: &str,
    host: &str,
) -> Result<u64> {
    store.key_delete(&keys::minute_hash(scope, key, host))?;
    store.key_delete(&keys::daily_hash(scope, key, host))?;
    Ok(2)
}
