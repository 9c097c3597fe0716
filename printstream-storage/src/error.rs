//! Error types for the storage layer.

use printstream_license::LicenseError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The singleton license row does not exist yet.
    #[error("license record not initialised")]
    MissingRecord,

    /// Invalid data read back from the database.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The connection mutex was poisoned by a panicking writer.
    #[error("connection lock poisoned")]
    LockPoisoned,
}

impl From<StorageError> for LicenseError {
    fn from(err: StorageError) -> Self {
        LicenseError::Storage(err.to_string())
    }
}
