//! Type registry error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while reading or writing point types
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The backing store is unavailable or rejected the operation
    #[error("Store error: {0}")]
    Store(String),

    /// A key exists but its value is not a point type
    #[error("Cannot decode type for {key}: {value:?}")]
    Decode { key: String, value: String },

    /// The store did not answer within the registry deadline
    #[error("Store did not answer within {0:?}")]
    Timeout(Duration),

    /// I/O operation on a file-backed store failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted registry document is malformed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Serialization(err.to_string())
    }
}

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
