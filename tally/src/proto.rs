//! RPC wire types shared by the server, CLI, and emitter.
//!
//! Framing is newline-delimited JSON over TCP: one request object per
//! line, one reply object per line. Requests carry positional parameters;
//! replies always carry all three of `error`, `result`, and `id`, with
//! the unused side set to JSON null.

use serde::{Deserialize, Serialize};

use crate::error::TallyError;

/// RPC error code for a malformed request parameter.
pub const CODE_INVALID_ARGUMENT: i64 = 1;

/// RPC error code for a backing store failure.
pub const CODE_INTERNAL_ERROR: i64 = 2;

/// Method name constants.
pub mod method {
    /// Increment a counter bucket.
    pub const INC: &str = "monitor.inc";
    /// Overwrite a counter bucket.
    pub const SET: &str = "monitor.set";
    /// List known scopes.
    pub const LIST_SCOPE: &str = "monitor.list_scope";
    /// List keys under a scope.
    pub const LIST_KEY: &str = "monitor.list_key";
    /// List hosts under a scope+key.
    pub const LIST_HOST: &str = "monitor.list_host";
    /// Minute series query.
    pub const QUERY: &str = "monitor.query";
    /// Daily series query.
    pub const DAILY: &str = "monitor.daily";
}

/// One request line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen id, echoed back in the reply.
    pub id: u64,
    /// Method name, e.g. `monitor.inc`.
    pub method: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
}

/// Error half of a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcError {
    /// Error code (1 = invalid argument, 2 = internal error).
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// One reply line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// Set on failure, null on success.
    pub error: Option<RpcError>,
    /// Set on success, null on failure.
    pub result: serde_json::Value,
    /// Echo of the request id.
    pub id: u64,
}

impl Reply {
    /// A successful reply carrying `result`.
    #[must_use]
    pub fn result(id: u64, result: serde_json::Value) -> Self {
        Self {
            error: None,
            result,
            id,
        }
    }

    /// The standard ingestion success reply, `{"status":"success"}`.
    #[must_use]
    pub fn success(id: u64) -> Self {
        Self::result(id, serde_json::json!({ "status": "success" }))
    }

    /// An error reply with the given code and message.
    #[must_use]
    pub fn error(id: u64, code: i64, message: &str) -> Self {
        Self {
            error: Some(RpcError {
                code,
                message: message.to_string(),
            }),
            result: serde_json::Value::Null,
            id,
        }
    }

    /// The standard "invalid argument" reply (code 1).
    #[must_use]
    pub fn invalid_argument(id: u64) -> Self {
        Self::error(id, CODE_INVALID_ARGUMENT, "invalid argument")
    }

    /// The standard "internal error" reply (code 2).
    #[must_use]
    pub fn internal_error(id: u64) -> Self {
        Self::error(id, CODE_INTERNAL_ERROR, "internal error")
    }

    /// Maps an engine error to its reply: validation failures are the
    /// caller's fault (code 1), store failures are ours (code 2).
    #[must_use]
    pub fn from_error(id: u64, err: &TallyError) -> Self {
        match err {
            TallyError::Validation(_) => Self::invalid_argument(id),
            TallyError::Store(_) => Self::internal_error(id),
        }
    }

    /// Whether this reply reports success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn test_request_roundtrip() {
        let line = r#"{"id":7,"method":"monitor.inc","params":["trade","order_count","host1",3]}"#;
        let req: Request = serde_json::from_str(line).unwrap();
        assert_eq!(req.id, 7);
        assert_eq!(req.method, method::INC);
        assert_eq!(req.params.len(), 4);
    }

    #[test]
    fn test_request_params_default_empty() {
        let req: Request =
            serde_json::from_str(r#"{"id":1,"method":"monitor.list_scope"}"#).unwrap();
        assert!(req.params.is_empty());
    }

    #[test]
    fn test_success_reply_shape() {
        let json = serde_json::to_value(Reply::success(7)).unwrap();
        assert_eq!(json["error"], serde_json::Value::Null);
        assert_eq!(json["result"]["status"], "success");
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn test_error_reply_shape() {
        let json = serde_json::to_value(Reply::invalid_argument(3)).unwrap();
        assert_eq!(json["error"]["code"], 1);
        assert_eq!(json["error"]["message"], "invalid argument");
        assert_eq!(json["result"], serde_json::Value::Null);
    }

    #[test]
    fn test_error_mapping() {
        let validation = TallyError::Validation(ValidationError::BadScope {
            value: "x y".to_string(),
        });
        assert_eq!(
            Reply::from_error(1, &validation).error.unwrap().code,
            CODE_INVALID_ARGUMENT
        );

        let store = TallyError::Store(crate::error::StoreError::Command {
            reason: "down".to_string(),
        });
        assert_eq!(
            Reply::from_error(1, &store).error.unwrap().code,
            CODE_INTERNAL_ERROR
        );
    }
}
