//! Error types for fieldbook-core

use thiserror::Error;

/// Result type alias using fieldbook-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldbook-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key-value medium error that is not a database error (poisoned lock, quota)
    #[error("Storage error: {0}")]
    Storage(String),
}
