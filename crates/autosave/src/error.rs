//! Error types for the autosave subsystem.

use thiserror::Error;

/// Errors raised by the storage tiers and codec plumbing.
///
/// These stop at the [`DualStore`](crate::store::DualStore) boundary, which
/// falls back to the next tier and logs instead of propagating.
#[derive(Debug, Error)]
pub enum AutosaveError {
    /// Structured store operation failed
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// File tier read or write failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// Payload could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Storage key is not a plain file-name component
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Anything else, e.g. a blocking task that failed to run
    #[error("{0}")]
    Other(String),
}

/// Result type for autosave storage operations
pub type AutosaveResult<T> = Result<T, AutosaveError>;

impl From<rusqlite::Error> for AutosaveError {
    fn from(err: rusqlite::Error) -> Self {
        AutosaveError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for AutosaveError {
    fn from(err: serde_json::Error) -> Self {
        AutosaveError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for AutosaveError {
    fn from(err: std::io::Error) -> Self {
        AutosaveError::IoError(err.to_string())
    }
}
