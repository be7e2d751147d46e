//! Error types for connection establishment.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Variants that surface to operators carry a suggestion describing how to fix the
//! configuration that caused them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    /// A driver factory could not produce its driver (e.g. SQLite not compiled in).
    #[error("Driver '{driver}' is unavailable: {reason}")]
    DriverUnavailable { driver: String, reason: String },

    #[error("Driver '{name}' is already registered")]
    DuplicateDriver { name: String },

    #[error("Unknown driver '{name}' (forgotten registration?)")]
    UnknownDriver { name: String },

    #[error("Unsupported dialect: {name}")]
    UnsupportedDialect { name: String },

    #[error("Invalid connection string: {message}")]
    InvalidConnectionString { message: String },

    #[error("Failed to create native connection pool: {message}")]
    NativePool { message: String },

    #[error("could not open database connection: {0}")]
    Open(#[source] Box<DbError>),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn driver_unavailable(driver: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DriverUnavailable {
            driver: driver.into(),
            reason: reason.into(),
        }
    }

    pub fn duplicate_driver(name: impl Into<String>) -> Self {
        Self::DuplicateDriver { name: name.into() }
    }

    pub fn unknown_driver(name: impl Into<String>) -> Self {
        Self::UnknownDriver { name: name.into() }
    }

    pub fn unsupported_dialect(name: impl Into<String>) -> Self {
        Self::UnsupportedDialect { name: name.into() }
    }

    /// Create an invalid connection string error.
    pub fn invalid_connection_string(message: impl Into<String>) -> Self {
        Self::InvalidConnectionString {
            message: message.into(),
        }
    }

    pub fn native_pool(message: impl Into<String>) -> Self {
        Self::NativePool {
            message: message.into(),
        }
    }

    /// Wrap a failure of the generic open path.
    pub fn open(source: DbError) -> Self {
        Self::Open(Box::new(source))
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::DriverUnavailable { .. } => {
                Some("Rebuild with the driver's cargo feature enabled or pick another dialect")
            }
            Self::UnknownDriver { .. } => {
                Some("Register the driver in the DriverRegistry before opening connections")
            }
            Self::InvalidConnectionString { .. } => {
                Some("Check the connection string format for the selected dialect")
            }
            Self::Open(source) => source.suggestion(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Nothing in this crate retries; the flag is for callers that own a retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::Open(source) => source.is_retryable(),
            _ => false,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::invalid_connection_string(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reopen the database handle")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::AnyDriverError(err) => DbError::connection(
                format!("Driver error: {}", err),
                "Check database driver configuration",
            ),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert!(DbError::duplicate_driver("x").suggestion().is_none());
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("ping", 10).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::unknown_driver("nope").is_retryable());
        assert!(!DbError::driver_unavailable("sqlite3", "not compiled in").is_retryable());
    }

    #[test]
    fn test_open_error_wraps_source() {
        let err = DbError::open(DbError::unknown_driver("nope"));
        let message = err.to_string();
        assert!(message.starts_with("could not open database connection"));
        assert!(message.contains("nope"));
        assert!(err.source().is_some());
        assert_eq!(
            err.suggestion(),
            Some("Register the driver in the DriverRegistry before opening connections")
        );
    }

    #[test]
    fn test_open_error_retryable_follows_source() {
        assert!(DbError::open(DbError::connection("refused", "start it")).is_retryable());
        assert!(!DbError::open(DbError::invalid_connection_string("bad")).is_retryable());
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Connection { .. }));
    }
}
