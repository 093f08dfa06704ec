use std::time::Duration;
use thiserror::Error;

/// Unified error type for data-access operations
#[derive(Error, Debug)]
pub enum DbError {
    /// A single-row query returned no rows
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Connection-level hiccup: I/O, TLS, pool timeout, lock contention, serialization failure
    #[error("Transient database error: {0}")]
    Transient(#[source] sqlx::Error),

    /// Any other driver error (bad SQL, type mismatch, decode failure, ...)
    #[error("Database error: {0}")]
    Driver(#[source] sqlx::Error),

    /// Caller supplied arguments the layer refuses to build a query from
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The caller's context was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's context deadline passed
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Operation issued on a transaction that was already committed or rolled back
    #[error("Transaction already committed or rolled back")]
    TransactionClosed,

    /// The transaction is in use by another operation, such as an open row stream
    #[error("Transaction is busy with another operation")]
    TransactionBusy,

    /// The retry ceiling was reached; `source` is the last attempt's error
    #[error("{operation} failed after {attempts} attempts in {elapsed:?}: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: Box<DbError>,
    },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        DbError::InvalidArgument { message: message.into() }
    }

    /// The underlying error, looking through retry exhaustion
    pub fn root(&self) -> &DbError {
        match self {
            DbError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), DbError::NotFound)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.root(), DbError::Transient(_))
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, DbError::Cancelled | DbError::DeadlineExceeded)
    }

    /// Errors raised by this layer itself. Reattempting cannot change their outcome.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            DbError::InvalidArgument { .. }
                | DbError::Cancelled
                | DbError::DeadlineExceeded
                | DbError::TransactionClosed
                | DbError::TransactionBusy
                | DbError::RetriesExhausted { .. }
        )
    }
}

/// Postgres SQLSTATEs worth reattempting: serialization failure, deadlock, lock not available.
const PG_TRANSIENT_CODES: &[&str] = &["40001", "40P01", "55P03"];

/// SQLite result codes for a busy or locked database, including extended codes.
const SQLITE_TRANSIENT_CODES: &[&str] = &["5", "6", "261", "262", "517"];

fn is_transient_code(code: &str) -> bool {
    PG_TRANSIENT_CODES.contains(&code) || SQLITE_TRANSIENT_CODES.contains(&code)
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    DbError::UniqueViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.code().is_some_and(|code| is_transient_code(&code)) {
                    DbError::Transient(err)
                } else {
                    DbError::Driver(err)
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::WorkerCrashed => DbError::Transient(err),
            _ => DbError::Driver(err),
        }
    }
}

/// Type alias for data-access results
pub type Result<T> = std::result::Result<T, DbError>;
