//! Queue errors.

use relayq_storage::StorageError;
use relayq_store::StoreError;
use thiserror::Error;

/// Queue error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The coordinator was not configured for the requested operation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The ref was not in `doing`.
    #[error("Element {task_ref} is not currently processing")]
    NotProcessing { task_ref: String },

    /// The ref was in neither `doing` nor `failed`.
    #[error("Element {task_ref} is not currently processing or failed")]
    NotProcessingOrFailed { task_ref: String },

    /// The task carries no identifier, so it cannot be in any queue.
    #[error("Task has no `{field}` identifier")]
    Unidentified { field: String },

    /// A claimed ref has no stored task.
    #[error("storage did not return a valid task object for reference: {task_ref}")]
    MissingTask { task_ref: String },

    /// A blocking claim elapsed with nothing to claim.
    #[error("Timed out waiting for a task")]
    Timeout,

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Storage adapter error.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QueueError {
    /// Whether the error reports a ref in an unexpected state.
    ///
    /// These are not worth retrying: the task was already resolved or never
    /// claimed.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            Self::NotProcessing { .. } | Self::NotProcessingOrFailed { .. } | Self::Unidentified { .. }
        )
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Store(_) | Self::Storage(StorageError::Store(_))
        )
    }

    /// The ref the error concerns, if known.
    pub fn task_ref(&self) -> Option<&str> {
        match self {
            Self::NotProcessing { task_ref }
            | Self::NotProcessingOrFailed { task_ref }
            | Self::MissingTask { task_ref } => Some(task_ref),
            _ => None,
        }
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// An error raised while delivering a task to a listener handler.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ListenerError {
    /// What went wrong.
    pub error: QueueError,
    /// The ref being delivered, when one had been claimed.
    pub task_ref: Option<String>,
}

impl ListenerError {
    pub(crate) fn new(error: QueueError, task_ref: Option<String>) -> Self {
        Self { error, task_ref }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_conflicts() {
        let err = QueueError::NotProcessing {
            task_ref: "a".to_string(),
        };
        assert!(err.is_state_conflict());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Element a is not currently processing");

        let err = QueueError::NotProcessingOrFailed {
            task_ref: "b".to_string(),
        };
        assert!(err.is_state_conflict());
        assert_eq!(err.task_ref(), Some("b"));
    }

    #[test]
    fn test_retryable() {
        assert!(QueueError::Timeout.is_retryable());
        assert!(QueueError::Store(StoreError::Connection("down".to_string())).is_retryable());
        assert!(QueueError::Storage(StorageError::Store(StoreError::Backend("x".to_string()))).is_retryable());
        assert!(!QueueError::Storage(StorageError::Decode("bad".to_string())).is_retryable());
        assert!(!QueueError::Config("off".to_string()).is_retryable());
    }

    #[test]
    fn test_missing_task_message() {
        let err = QueueError::MissingTask {
            task_ref: "r1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "storage did not return a valid task object for reference: r1"
        );
        assert!(!err.is_state_conflict());
    }
}
