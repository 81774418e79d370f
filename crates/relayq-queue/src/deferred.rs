//! Deferred task list.
//!
//! Refs wait in a time-scored set until their due time, then a sweep drains
//! everything due into todo in one atomic store operation. Two sweeps racing
//! on the same set can never both promote an entry.

use std::sync::Arc;

use async_trait::async_trait;
use relayq_store::{AtomicStore, Clock};
use tracing::debug;

use crate::error::QueueResult;
use crate::sweep::Sweep;

/// Refs scheduled for a future time.
#[derive(Clone)]
pub struct DeferredList {
    store: Arc<dyn AtomicStore>,
    clock: Arc<dyn Clock>,
    key: String,
    todo: String,
}

impl DeferredList {
    /// Create a list stored at `key` that promotes into `todo`.
    pub fn new(
        store: Arc<dyn AtomicStore>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
        todo: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            key: key.into(),
            todo: todo.into(),
        }
    }

    /// Set key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Schedule `task_ref` for `when_ms` (epoch ms), replacing any earlier schedule.
    pub async fn defer(&self, task_ref: &str, when_ms: i64) -> QueueResult<()> {
        self.store.zadd(&self.key, task_ref, when_ms).await?;
        debug!(task_ref = %task_ref, when_ms, "Deferred task");
        Ok(())
    }

    /// Drop `task_ref` from the set without promoting it.
    pub async fn eliminate(&self, task_ref: &str) -> QueueResult<u64> {
        Ok(self.store.zrem(&self.key, task_ref).await?)
    }

    /// Move `task_ref` straight into todo, ignoring its due time.
    /// Returns 0 if it was not deferred.
    pub async fn immediate(&self, task_ref: &str) -> QueueResult<u64> {
        Ok(self
            .store
            .transfer_member(&self.key, task_ref, &self.todo)
            .await?)
    }

    /// Due time of `task_ref`, if deferred.
    pub async fn due_at(&self, task_ref: &str) -> QueueResult<Option<i64>> {
        Ok(self.store.zscore(&self.key, task_ref).await?)
    }

    /// Number of deferred refs.
    pub async fn len(&self) -> QueueResult<u64> {
        Ok(self.store.zcard(&self.key).await?)
    }

    /// Promote everything due now.
    pub async fn sweep_once(&self) -> QueueResult<Vec<String>> {
        let now = self.clock.now_ms();
        Ok(self.store.drain_due(&self.key, now, &self.todo).await?)
    }
}

#[async_trait]
impl Sweep for DeferredList {
    fn name(&self) -> &'static str {
        "deferred"
    }

    async fn sweep_once(&self) -> QueueResult<Vec<String>> {
        DeferredList::sweep_once(self).await
    }
}
