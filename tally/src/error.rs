//! Error types for the tally aggregation engine.

use thiserror::Error;

/// The main error type for all tally operations.
///
/// Splits into the two failure families the RPC surface distinguishes:
/// validation failures (rejected immediately, never retried) and store
/// failures (transient, retried or deferred by the caller).
#[derive(Error, Debug)]
pub enum TallyError {
    /// A scope/key/host string or a query parameter failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A backing store operation failed after reconnect attempts.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while validating request parameters.
///
/// These map to RPC error code 1 ("invalid argument") and are never
/// retried; the offending request is rejected before any state changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The scope name is empty, too long, or contains a forbidden character.
    #[error("invalid scope '{value}'")]
    BadScope {
        /// The rejected scope string.
        value: String,
    },

    /// The key name is empty, too long, or contains a forbidden character.
    #[error("invalid key '{value}'")]
    BadKey {
        /// The rejected key string.
        value: String,
    },

    /// The host name is empty, too long, or contains a forbidden character.
    #[error("invalid host '{value}'")]
    BadHost {
        /// The rejected host string.
        value: String,
    },

    /// A query point count is zero or above the allowed maximum.
    #[error("point count {count} out of bounds (1..={max})")]
    BadCount {
        /// The rejected count.
        count: u64,
        /// The maximum allowed count.
        max: u64,
    },
}

/// Errors raised by the backing key-value store client.
///
/// Both variants are transient from the caller's point of view: query
/// handlers surface them as RPC error code 2, the flush scheduler leaves
/// its state untouched and retries on the next tick.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connecting (or reconnecting) to the store failed.
    #[error("store connection failed: {reason}")]
    Connection {
        /// Description of the connection failure.
        reason: String,
    },

    /// A store command failed or returned an error reply.
    #[error("store command failed: {reason}")]
    Command {
        /// Description of the command failure.
        reason: String,
    },

    /// The store returned a value that could not be decoded.
    #[error("malformed store value under '{key}': {reason}")]
    Malformed {
        /// The store key whose value was malformed.
        key: String,
        /// Description of the decode failure.
        reason: String,
    },
}

/// Type alias for `Result<T, TallyError>`.
pub type Result<T> = std::result::Result<T, TallyError>;
