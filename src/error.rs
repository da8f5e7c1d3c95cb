//! Error types for the multi-backend access core.
//!
//! All errors use `thiserror` and carry messages a calling agent can act on.
//! Whether a failure is worth retrying is decided in exactly one place,
//! [`DbError::is_retryable`], so the substring heuristic can later be swapped
//! for structured per-backend error codes without touching the retry loop.

use thiserror::Error;

use crate::models::BackendType;

#[derive(Error, Debug)]
pub enum DbError {
    /// Malformed connection string, invalid port, disallowed backend option,
    /// or a broken configuration source. Never retried.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// An alias was requested that no configuration tier produced.
    #[error("Unknown {backend} alias '{alias}'. Configured aliases: {known}")]
    UnknownAlias {
        backend: BackendType,
        alias: String,
        known: String,
    },

    /// A mutating statement was rejected by the read-only policy. No
    /// connection is opened and no retry attempt is consumed.
    #[error(
        "Mutating statement blocked: starts with {keyword}. This interface is read-only by policy; ask the user to run the statement themselves first."
    )]
    PolicyViolation { keyword: String },

    /// A connection-level failure. Transient variants (reset, refused,
    /// timeout, broken pipe, lost connection) are retryable; authentication
    /// and protocol failures are not.
    #[error("Connection failed: {message}")]
    Connection { message: String },

    /// A statement-level failure reported by the backend (syntax error,
    /// missing object). Never retried.
    #[error("Query failed: {message}")]
    Driver {
        message: String,
        /// e.g. "42P01" for an undefined table
        sql_state: Option<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Message fragments that identify a connection-level failure expected to
/// resolve itself on reconnect. Matching raw driver messages is brittle
/// across client library versions, which is why this list lives here and
/// nowhere else.
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection reset",
    "connection refused",
    "connection lost",
    "connection closed",
    "connection terminated",
    "broken pipe",
    "timed out",
    "timeout",
    "econnreset",
    "econnrefused",
    "epipe",
    "etimedout",
    "server has gone away",
    // SQL Server driver reports a dead session this way
    "not connected",
];

impl DbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn unknown_alias(
        backend: BackendType,
        alias: impl Into<String>,
        known: impl Into<String>,
    ) -> Self {
        Self::UnknownAlias {
            backend,
            alias: alias.into(),
            known: known.into(),
        }
    }

    pub fn policy_violation(keyword: impl Into<String>) -> Self {
        Self::PolicyViolation {
            keyword: keyword.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn driver(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Driver {
            message: message.into(),
            sql_state,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the retry executor may attempt this operation again after
    /// evicting the cached adapter. Only connection-level failures whose
    /// message matches a known transient signal qualify; statement-level and
    /// configuration failures never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { message } => {
                let lower = message.to_lowercase();
                TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
            }
            _ => false,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::config(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::driver(db_err.message(), code)
            }
            sqlx::Error::PoolTimedOut => DbError::connection("connection pool acquire timed out"),
            sqlx::Error::PoolClosed => DbError::connection("connection pool is closed"),
            sqlx::Error::Io(io_err) => DbError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => DbError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => DbError::connection(format!("protocol error: {}", msg)),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("column not found in result: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("database worker crashed"),
            _ => DbError::internal(format!("unexpected database error: {}", err)),
        }
    }
}

impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => {
                DbError::driver(token.message().to_string(), Some(token.code().to_string()))
            }
            tiberius::error::Error::Io { message, .. } => {
                DbError::connection(format!("I/O error: {}", message))
            }
            tiberius::error::Error::Tls(message) => {
                DbError::connection(format!("TLS error: {}", message))
            }
            tiberius::error::Error::Routing { host, port } => {
                DbError::connection(format!("server redirected to {}:{}", host, port))
            }
            other => DbError::connection(other.to_string()),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
