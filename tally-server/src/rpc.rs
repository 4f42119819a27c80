//! Request dispatch and per-connection serving.
//!
//! Framing is one JSON object per line in both directions. A line that
//! fails to decode closes the connection; everything else gets a reply
//! with the request's id echoed back. All requests funnel through the
//! shared [`Monitor`] mutex, which serializes them against each other
//! and against the maintenance tick.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tally::proto::{Reply, Request, method};
use tally::store::MetricStore;
use tally::{Monitor, time};

/// Serves one client connection until EOF, an I/O error, or a malformed
/// request line.
pub fn serve_connection<S: MetricStore>(stream: TcpStream, monitor: &Arc<Mutex<Monitor<S>>>) {
    let peer = stream
        .peer_addr()
        .map_or_else(|_| "unknown".to_string(), |addr| addr.to_string());
    tracing::debug!(%peer, "new connection");

    let reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(err) => {
            tracing::warn!(%peer, error = %err, "failed to clone connection stream");
            return;
        }
    };
    let mut writer = stream;

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::debug!(%peer, error = %err, "read error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                tracing::error!(%peer, error = %err, "request decode failed, closing connection");
                break;
            }
        };
        tracing::debug!(%peer, id = request.id, method = %request.method, "request");

        let reply = {
            let Ok(mut monitor) = monitor.lock() else {
                tracing::error!(%peer, "monitor lock poisoned, closing connection");
                break;
            };
            dispatch(&mut monitor, &request, time::now())
        };

        let encoded = match serde_json::to_string(&reply) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::error!(%peer, error = %err, "reply encode failed");
                break;
            }
        };
        tracing::trace!(%peer, reply = %encoded, "reply");
        if writeln!(writer, "{encoded}").is_err() {
            break;
        }
    }

    tracing::debug!(%peer, "connection closed");
}

/// Routes one request to the engine and shapes the reply.
pub fn dispatch<S: MetricStore>(monitor: &mut Monitor<S>, request: &Request, now: u64) -> Reply {
    let id = request.id;
    let params = &request.params;

    match request.method.as_str() {
        method::INC => {
            let Some((scope, key, host, value)) = ingest_params(params) else {
                return Reply::invalid_argument(id);
            };
            match monitor.increment(scope, key, host, value, now) {
                Ok(()) => Reply::success(id),
                Err(err) => {
                    tracing::error!(error = %err, "monitor.inc failed");
                    Reply::from_error(id, &err)
                }
            }
        }
        method::SET => {
            let Some((scope, key, host, value)) = ingest_params(params) else {
                return Reply::invalid_argument(id);
            };
            match monitor.overwrite(scope, key, host, value, now) {
                Ok(()) => Reply::success(id),
                Err(err) => {
                    tracing::error!(error = %err, "monitor.set failed");
                    Reply::from_error(id, &err)
                }
            }
        }
        method::LIST_SCOPE => {
            if !params.is_empty() {
                return Reply::invalid_argument(id);
            }
            name_list_reply(id, monitor.list_scopes())
        }
        method::LIST_KEY => {
            let (Some(scope), 1) = (str_param(params, 0), params.len()) else {
                return Reply::invalid_argument(id);
            };
            name_list_reply(id, monitor.list_keys(scope))
        }
        method::LIST_HOST => {
            let (Some(scope), Some(key), 2) =
                (str_param(params, 0), str_param(params, 1), params.len())
            else {
                return Reply::invalid_argument(id);
            };
            name_list_reply(id, monitor.list_hosts(scope, key))
        }
        method::QUERY => {
            let Some((scope, key, host, count)) = ingest_params(params) else {
                return Reply::invalid_argument(id);
            };
            series_reply(id, monitor.query_minutes(scope, key, host, count, now))
        }
        method::DAILY => {
            let Some((scope, key, host, count)) = ingest_params(params) else {
                return Reply::invalid_argument(id);
            };
            series_reply(id, monitor.query_daily(scope, key, host, count, now))
        }
        other => {
            tracing::warn!(method = %other, "unknown method");
            Reply::invalid_argument(id)
        }
    }
}

/// Extracts `[scope, key, host, uint]` — the shape shared by ingestion
/// and series queries.
fn ingest_params(params: &[Value]) -> Option<(&str, &str, &str, u64)> {
    if params.len() != 4 {
        return None;
    }
    Some((
        str_param(params, 0)?,
        str_param(params, 1)?,
        str_param(params, 2)?,
        params.get(3)?.as_u64()?,
    ))
}

fn str_param(params: &[Value], index: usize) -> Option<&str> {
    params.get(index).and_then(Value::as_str)
}

fn name_list_reply(id: u64, result: tally::Result<Vec<String>>) -> Reply {
    match result {
        Ok(names) => Reply::result(id, Value::from(names)),
        Err(err) => {
            tracing::error!(error = %err, "listing failed");
            Reply::from_error(id, &err)
        }
    }
}

fn series_reply(id: u64, result: tally::Result<Vec<(u64, u64)>>) -> Reply {
    match result {
        Ok(points) => {
            let rows: Vec<Value> = points
                .into_iter()
                .map(|(timestamp, value)| serde_json::json!([timestamp, value]))
                .collect();
            Reply::result(id, Value::from(rows))
        }
        Err(err) => {
            tracing::error!(error = %err, "series query failed");
            Reply::from_error(id, &err)
        }
    }
}
