//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error from a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted data could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted data is structurally invalid.
    #[error("corrupt store: {message}")]
    Corrupt {
        /// Description of the problem.
        message: String,
    },
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}
