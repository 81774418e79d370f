//! Store errors.

use thiserror::Error;

/// Errors raised by an atomic store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection to the store could not be established or was lost.
    #[error("Store connection error: {0}")]
    Connection(String),

    /// The store rejected or failed an operation.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// The store returned a value of an unexpected shape.
    #[error("Unexpected store reply: {0}")]
    UnexpectedReply(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(feature = "redis")]
impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}
