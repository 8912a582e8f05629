//! Common error types for Confab.

use thiserror::Error;

/// Top-level error type for Confab sync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or timeout failure talking to the sync endpoint.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("Server rejected sync (status {status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Local persistence failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A sync is already in flight for this device.
    #[error("Sync in progress: {0}")]
    SyncInProgress(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether a caller may retry the failed operation.
    ///
    /// Transport and server-side failures are transient; a rejected
    /// request may succeed after backoff. Serialization and storage
    /// failures will not heal by repetition.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::ServerRejected { .. } | Error::Io(_)
        )
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(Error::Transport("connection reset".into()).is_retriable());
        assert!(Error::ServerRejected {
            status: 503,
            message: "overloaded".into()
        }
        .is_retriable());

        assert!(!Error::Serialization("bad payload".into()).is_retriable());
        assert!(!Error::Storage("disk full".into()).is_retriable());
        assert!(!Error::SyncInProgress("device-1".into()).is_retriable());
    }
}
