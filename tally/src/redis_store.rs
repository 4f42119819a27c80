//! Redis-backed [`MetricStore`] implementation.
//!
//! Commands run as synchronous round-trips on a single connection. On any
//! command failure the connection is dropped and one reconnect is
//! attempted within the same logical call; if the retry also fails the
//! call returns [`StoreError`] and the next call reconnects lazily.

use std::time::Duration;

use redis::FromRedisValue;

use crate::error::StoreError;
use crate::store::MetricStore;

/// Synchronous Redis client with reconnect-on-error.
pub struct RedisStore {
    client: redis::Client,
    conn: Option<redis::Connection>,
    timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connected", &self.conn.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisStore {
    /// Connects to the store at `url` (e.g. `redis://127.0.0.1:6379/0`).
    /// `timeout` bounds connection establishment and each round-trip.
    ///
    /// The initial connection is established eagerly so a misconfigured
    /// store fails at startup rather than on the first flush.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the URL is invalid or the
    /// initial connection cannot be established.
    pub fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|err| StoreError::Connection {
            reason: err.to_string(),
        })?;
        let mut store = Self {
            client,
            conn: None,
            timeout,
        };
        store.connection()?;
        Ok(store)
    }

    /// Returns the live connection, reconnecting if the previous one was
    /// dropped after a failure.
    fn connection(&mut self) -> Result<&mut redis::Connection, StoreError> {
        if self.conn.is_none() {
            tracing::info!("store connection lost, reconnecting");
            let conn = self
                .client
                .get_connection_with_timeout(self.timeout)
                .map_err(|err| StoreError::Connection {
                    reason: err.to_string(),
                })?;
            conn.set_read_timeout(Some(self.timeout))
                .map_err(|err| StoreError::Connection {
                    reason: err.to_string(),
                })?;
            conn.set_write_timeout(Some(self.timeout))
                .map_err(|err| StoreError::Connection {
                    reason: err.to_string(),
                })?;
            self.conn = Some(conn);
        }
        self.conn.as_mut().ok_or_else(|| StoreError::Connection {
            reason: "connection unavailable".to_string(),
        })
    }

    /// Runs one command with the retry-via-reconnect policy: at most two
    /// attempts per logical call, with the connection dropped between
    /// them. A failed reconnect gives up immediately.
    fn query<T: FromRedisValue>(&mut self, cmd: &redis::Cmd) -> Result<T, StoreError> {
        let mut last = StoreError::Connection {
            reason: "not connected".to_string(),
        };
        for _ in 0..2 {
            match self.connection() {
                Ok(conn) => match cmd.query::<T>(conn) {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        tracing::warn!(error = %err, "store command failed, dropping connection");
                        self.conn = None;
                        last = StoreError::Command {
                            reason: err.to_string(),
                        };
                    }
                },
                Err(err) => {
                    tracing::error!(error = %err, "store reconnect failed");
                    return Err(err);
                }
            }
        }
        Err(last)
    }
}

impl MetricStore for RedisStore {
    fn set_add(&mut self, set: &str, member: &str) -> Result<(), StoreError> {
        self.query(redis::cmd("SADD").arg(set).arg(member))
    }

    fn set_members(&mut self, set: &str) -> Result<Vec<String>, StoreError> {
        self.query(redis::cmd("SMEMBERS").arg(set))
    }

    fn set_remove(&mut self, set: &str, member: &str) -> Result<(), StoreError> {
        self.query(redis::cmd("SREM").arg(set).arg(member))
    }

    fn hash_get(&mut self, hash: &str, field: u64) -> Result<Option<u64>, StoreError> {
        self.query(redis::cmd("HGET").arg(hash).arg(field))
    }

    fn hash_multi_get(
        &mut self,
        hash: &str,
        fields: &[u64],
    ) -> Result<Vec<Option<u64>>, StoreError> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        self.query(redis::cmd("HMGET").arg(hash).arg(fields))
    }

    fn hash_set(&mut self, hash: &str, field: u64, value: u64) -> Result<(), StoreError> {
        self.query(redis::cmd("HSET").arg(hash).arg(field).arg(value))
    }

    fn hash_increment(&mut self, hash: &str, field: u64, delta: u64) -> Result<(), StoreError> {
        self.query(redis::cmd("HINCRBY").arg(hash).arg(field).arg(delta))
    }

    fn hash_get_all(&mut self, hash: &str) -> Result<Vec<(u64, u64)>, StoreError> {
        let pairs: std::collections::BTreeMap<u64, u64> =
            self.query(redis::cmd("HGETALL").arg(hash))?;
        Ok(pairs.into_iter().collect())
    }

    fn hash_delete(&mut self, hash: &str, fields: &[u64]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.query(redis::cmd("HDEL").arg(hash).arg(fields))
    }

    fn key_delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.query(redis::cmd("DEL").arg(key))
    }

    fn string_get(&mut self, key: &str) -> Result<Option<u64>, StoreError> {
        self.query(redis::cmd("GET").arg(key))
    }

    fn string_set(&mut self, key: &str, value: u64) -> Result<(), StoreError> {
        self.query(redis::cmd("SET").arg(key).arg(value))
    }
}
