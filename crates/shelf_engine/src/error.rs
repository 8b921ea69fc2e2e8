//! Error types for the sync engine.

use shelf_protocol::RecordId;
use shelf_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server rejected the request.
    #[error("server rejected request with status {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },

    /// The targeted resource no longer exists on the server (HTTP 404).
    ///
    /// For pending-update delivery this is success-by-irrelevance: the
    /// mutation is moot and the entry is dropped without an error.
    #[error("resource gone")]
    Gone,

    /// The record store has not completed initialization.
    #[error("record store is not ready")]
    StoreNotReady,

    /// The operation was cancelled by clearing the credential.
    ///
    /// Cancellation is silent: no error notification is emitted and no
    /// retry is scheduled.
    #[error("operation cancelled")]
    Cancelled,

    /// No credential is set.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The server response could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A record the operation requires is not mirrored locally.
    #[error("record not found: {0}")]
    UnknownRecord(RecordId),

    /// Storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Maps an HTTP status code to the engine taxonomy.
    ///
    /// Returns `None` for success statuses.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            404 => Some(Self::Gone),
            other => Some(Self::Rejected { status: other }),
        }
    }

    /// Returns true if the operation may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transport { retryable, .. } => *retryable,
            EngineError::Rejected { status } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true for the definitive "resource gone" rejection.
    pub fn is_gone(&self) -> bool {
        matches!(self, EngineError::Gone)
    }

    /// Returns true if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}
