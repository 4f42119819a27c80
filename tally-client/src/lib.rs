//! Fire-and-forget counter emitter.
//!
//! Instrumented processes construct one [`Emitter`] at startup with their
//! scope and host identity, then call [`Emitter::increment`] /
//! [`Emitter::overwrite`] from anywhere. Sends are best-effort: the
//! emitter never blocks on a reply, never surfaces an error to the
//! caller, and silently drops counters while the server is unreachable
//! (reconnecting lazily on the next send). An unconfigured emitter is a
//! pure no-op, so instrumentation can stay in place in environments
//! without a tally server.

use std::io::Write;
use std::net::TcpStream;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tally::proto::{Request, method};

/// Connect timeout for the lazy (re)connect on a send.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle for emitting counters to a tally server.
///
/// Cheap to share behind an `Arc`; sends serialize on an internal mutex
/// guarding the connection.
#[derive(Debug)]
pub struct Emitter {
    target: Option<Target>,
    next_id: AtomicU64,
}

#[derive(Debug)]
struct Target {
    addr: String,
    scope: String,
    host: String,
    conn: Mutex<Option<TcpStream>>,
}

impl Emitter {
    /// Builds an emitter sending to `addr`, stamping every counter with
    /// this process's `scope` and `host`.
    pub fn new(addr: impl Into<String>, scope: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            target: Some(Target {
                addr: addr.into(),
                scope: scope.into(),
                host: host.into(),
                conn: Mutex::new(None),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Builds an emitter with no server configured; every send is a
    /// no-op.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            target: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds `value` to this process's counter `key` for the current
    /// minute. Best-effort; never blocks on the server's reply.
    pub fn increment(&self, key: &str, value: u64) {
        self.send(method::INC, key, value);
    }

    /// Overwrites this process's counter `key` for the current minute
    /// (last write wins). Best-effort.
    pub fn overwrite(&self, key: &str, value: u64) {
        self.send(method::SET, key, value);
    }

    fn send(&self, rpc_method: &str, key: &str, value: u64) {
        let Some(target) = &self.target else {
            return;
        };

        let request = Request {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: rpc_method.to_string(),
            params: vec![
                target.scope.as_str().into(),
                key.into(),
                target.host.as_str().into(),
                value.into(),
            ],
        };
        let Ok(line) = serde_json::to_string(&request) else {
            return;
        };

        let Ok(mut conn) = target.conn.lock() else {
            return;
        };
        if conn.is_none() {
            *conn = target.connect();
        }
        let Some(stream) = conn.as_mut() else {
            return;
        };
        if let Err(err) = writeln!(stream, "{line}") {
            tracing::debug!(error = %err, "emit failed, dropping connection");
            *conn = None;
        }
    }
}

impl Target {
    /// One connection attempt; on failure the counter being sent is
    /// dropped and the next send retries.
    fn connect(&self) -> Option<TcpStream> {
        let addr = self.addr.parse().ok()?;
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                tracing::debug!(addr = %self.addr, "emitter connected");
                Some(stream)
            }
            Err(err) => {
                tracing::debug!(addr = %self.addr, error = %err, "emitter connect failed");
                None
            }
        }
    }
}
