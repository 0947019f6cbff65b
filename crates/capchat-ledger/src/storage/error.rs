//! Storage error types.

use thiserror::Error;

/// Errors from storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O or transaction failure
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Stored value could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal lock was poisoned by a panicking thread
    #[error("storage lock poisoned")]
    Poisoned,
}
