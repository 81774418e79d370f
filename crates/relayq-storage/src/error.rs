//! Storage errors.

use relayq_store::StoreError;
use thiserror::Error;

/// Errors raised by task storage adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A task could not be encoded.
    #[error("Failed to encode task: {0}")]
    Encode(String),

    /// Stored bytes could not be decoded into a task.
    #[error("Failed to decode task: {0}")]
    Decode(String),

    /// A value that is not a record was offered as a task.
    #[error("Task must be a record, got: {0}")]
    NotARecord(String),

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
