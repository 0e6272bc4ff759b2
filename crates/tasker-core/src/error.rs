//! Error types for tasker-core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using tasker-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tasker-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Uniqueness constraint would be violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Too many failed logins; retry after the given Unix ms timestamp
    #[error("Account is locked until {until}")]
    LockedOut { until: i64 },

    /// A remote operation exceeded its time budget
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}
