//! Error types for ledger operations.

use thiserror::Error;

/// Errors that can occur in the entitlement store or transaction journal.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error while persisting or loading records.
    #[error("storage I/O error: {message}")]
    Io {
        /// Error message.
        message: String,
    },

    /// A record on disk could not be decoded.
    #[error("corrupt record at {location}: {message}")]
    Corrupt {
        /// File or entry the error was found in.
        location: String,
        /// Error message.
        message: String,
    },

    /// Serialization of a record failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding shared state was poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
