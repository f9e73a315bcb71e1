//! Error types for Pulse
//!
//! Custom error enum that wraps all possible error types in the pipeline.
//! Each variant maps to one row of the error-handling policy: auth and
//! validation surface to the caller, transport degrades to neutral values,
//! storage failures divert batches to the dead-letter sink.

use thiserror::Error;

/// Main error type for Pulse operations
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid API key. Never log the event body alongside this.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Required fields missing from an event, or bulk input not a list
    #[error("Validation error: missing required fields: {}", missing.join(", "))]
    Validation { missing: Vec<String> },

    /// Stream transport errors (Redis unreachable, command failure)
    #[error("Transport error: {0}")]
    Transport(#[from] redis::RedisError),

    /// Columnar store errors (DuckDB open/insert/commit)
    #[error("Storage error: {0}")]
    Storage(#[from] duckdb::Error),

    /// Sync config/run persistence errors (SQLite via sqlx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another process holds the sync lock
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Convenience constructor for validation failures
    pub fn missing_fields(missing: Vec<String>) -> Self {
        Error::Validation { missing }
    }
}

/// Result type alias for Pulse operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::missing_fields(vec!["event_name".into(), "captured_at".into()]);
        assert_eq!(
            err.to_string(),
            "Validation error: missing required fields: event_name, captured_at"
        );
    }

    #[test]
    fn test_error_conversion() {
        // Test that duckdb errors convert properly
        let db_err = duckdb::Error::InvalidQuery;
        let our_err: Error = db_err.into();
        assert!(matches!(our_err, Error::Storage(_)));
    }

    #[test]
    fn test_lock_timeout_display() {
        let err = Error::LockTimeout("duckdb_sync:event".to_string());
        assert_eq!(err.to_string(), "Lock timeout: duckdb_sync:event");
    }
}
