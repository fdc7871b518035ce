//! Common error types for LogiTrack

use thiserror::Error;

/// Common result type for LogiTrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across LogiTrack crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input (e.g. a stored value that does not parse back into a domain type)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error is worth retrying (lock contention, pool exhaustion, I/O).
    ///
    /// Constraint violations and decode errors are permanent and fail fast.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(db_err) => match db_err {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(inner) => {
                    let message = inner.message();
                    message.contains("database is locked") || message.contains("database is busy")
                }
                _ => false,
            },
            Error::Io(_) => true,
            _ => false,
        }
    }
}
