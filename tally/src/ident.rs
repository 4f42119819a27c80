//! Metric identity validation.
//!
//! Every counter is addressed by a `(scope, key, host)` triple. All three
//! components share the charset `[A-Za-z0-9._-]`; lengths are bounded per
//! component. An empty host denotes the cross-host aggregate series, which
//! is valid for queries but not for ingestion.

use crate::error::ValidationError;

/// Maximum length of a scope name.
pub const MAX_SCOPE_LEN: usize = 16;

/// Maximum length of a key name.
pub const MAX_KEY_LEN: usize = 64;

/// Maximum length of a host name.
pub const MAX_HOST_LEN: usize = 64;

/// An immutable `(scope, key, host)` triple naming one counter series.
///
/// Constructed through [`MetricIdentity::new`] (ingestion, host required)
/// or [`MetricIdentity::for_query`] (host may be empty to address the
/// cross-host aggregate). Once formed, an identity is never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricIdentity {
    scope: String,
    key: String,
    host: String,
}

impl MetricIdentity {
    /// Builds an identity for ingestion. The host must be non-empty: an
    /// emitting process always has an identity, and the empty host is
    /// reserved for the derived cross-host aggregate.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the first component that fails
    /// charset or length rules.
    pub fn new(scope: &str, key: &str, host: &str) -> Result<Self, ValidationError> {
        validate_scope(scope)?;
        validate_key(key)?;
        validate_host(host)?;
        Ok(Self {
            scope: scope.to_string(),
            key: key.to_string(),
            host: host.to_string(),
        })
    }

    /// Builds an identity for reads. An empty host addresses the
    /// cross-host aggregate series.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a malformed scope, key, or
    /// non-empty malformed host.
    pub fn for_query(scope: &str, key: &str, host: &str) -> Result<Self, ValidationError> {
        validate_scope(scope)?;
        validate_key(key)?;
        if !host.is_empty() {
            validate_host(host)?;
        }
        Ok(Self {
            scope: scope.to_string(),
            key: key.to_string(),
            host: host.to_string(),
        })
    }

    /// The scope component.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The key component.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The host component. Empty for the cross-host aggregate.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether this identity names the cross-host aggregate series.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        self.host.is_empty()
    }
}

impl std::fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.scope, self.key, self.host)
    }
}

/// Checks a name against the shared charset and a length bound.
fn is_good_name(value: &str, max_len: usize) -> bool {
    if value.is_empty() || value.len() > max_len {
        return false;
    }
    value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
}

/// Validates a scope name.
///
/// # Errors
///
/// Returns [`ValidationError::BadScope`] on charset or length violation.
pub fn validate_scope(value: &str) -> Result<(), ValidationError> {
    if is_good_name(value, MAX_SCOPE_LEN) {
        Ok(())
    } else {
        Err(ValidationError::BadScope {
            value: value.to_string(),
        })
    }
}

/// Validates a key name.
///
/// # Errors
///
/// Returns [`ValidationError::BadKey`] on charset or length violation.
pub fn validate_key(value: &str) -> Result<(), ValidationError> {
    if is_good_name(value, MAX_KEY_LEN) {
        Ok(())
    } else {
        Err(ValidationError::BadKey {
            value: value.to_string(),
        })
    }
}

/// Validates a host name. The empty string is rejected here; query paths
/// that accept the aggregate host check for emptiness before calling.
///
/// # Errors
///
/// Returns [`ValidationError::BadHost`] on charset or length violation.
pub fn validate_host(value: &str) -> Result<(), ValidationError> {
    if is_good_name(value, MAX_HOST_LEN) {
        Ok(())
    } else {
        Err(ValidationError::BadHost {
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_full_charset() {
        assert!(validate_scope("trade").is_ok());
        assert!(validate_key("order_count.v2-beta").is_ok());
        assert!(validate_host("web-01.eu_central").is_ok());
    }

    #[test]
    fn test_rejects_bad_characters() {
        assert!(validate_scope("has space").is_err());
        assert!(validate_scope("semi;colon").is_err());
        assert!(validate_key("slash/key").is_err());
        assert!(validate_host("host:port").is_err());
        assert!(validate_host("naïve").is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(validate_scope("").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_host("").is_err());
    }

    #[test]
    fn test_length_bounds() {
        assert!(validate_scope(&"a".repeat(MAX_SCOPE_LEN)).is_ok());
        assert!(validate_scope(&"a".repeat(MAX_SCOPE_LEN + 1)).is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN)).is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
        assert!(validate_host(&"h".repeat(MAX_HOST_LEN)).is_ok());
        assert!(validate_host(&"h".repeat(MAX_HOST_LEN + 1)).is_err());
    }

    #[test]
    fn test_ingestion_identity_requires_host() {
        assert!(MetricIdentity::new("trade", "order_count", "").is_err());
        let id = MetricIdentity::new("trade", "order_count", "host1").unwrap();
        assert!(!id.is_aggregate());
    }

    #[test]
    fn test_query_identity_allows_aggregate() {
        let id = MetricIdentity::for_query("trade", "order_count", "").unwrap();
        assert!(id.is_aggregate());
        assert_eq!(id.host(), "");
        assert!(MetricIdentity::for_query("trade", "order_count", "bad host").is_err());
    }

    #[test]
    fn test_display() {
        let id = MetricIdentity::new("trade", "order_count", "host1").unwrap();
        assert_eq!(id.to_string(), "trade:order_count:host1");
    }
}
