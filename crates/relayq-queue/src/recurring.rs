//! Recurring task list.
//!
//! Like the deferred list, except a promoted ref goes straight back into the
//! set at `now + interval`. Each ref's interval lives in a map beside the set,
//! and promotion plus rescheduling is one store operation, so a ref cannot
//! reach todo and then miss its next fire.

use std::sync::Arc;

use async_trait::async_trait;
use relayq_store::{AtomicStore, Clock};
use tracing::debug;

use crate::error::QueueResult;
use crate::sweep::Sweep;

/// Refs fired on a fixed interval.
#[derive(Clone)]
pub struct RecurringList {
    store: Arc<dyn AtomicStore>,
    clock: Arc<dyn Clock>,
    key: String,
    intervals: String,
    todo: String,
}

impl RecurringList {
    /// Create a list stored at `key`, with intervals kept in the map at
    /// `intervals`, that promotes into `todo`.
    pub fn new(
        store: Arc<dyn AtomicStore>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
        intervals: impl Into<String>,
        todo: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            key: key.into(),
            intervals: intervals.into(),
            todo: todo.into(),
        }
    }

    /// Set key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fire `task_ref` every `interval_ms`, first at `now + interval_ms`.
    ///
    /// Fire times saturate at `i64::MAX`.
    pub async fn recur(&self, task_ref: &str, interval_ms: i64) -> QueueResult<()> {
        let first_fire = self.clock.now_ms().saturating_add(interval_ms);
        self.store
            .schedule_recurring(&self.key, &self.intervals, task_ref, interval_ms, first_fire)
            .await?;
        debug!(task_ref = %task_ref, interval_ms, "Scheduled recurring task");
        Ok(())
    }

    /// Stop `task_ref` from recurring. Returns 0 if it was not scheduled.
    pub async fn eliminate(&self, task_ref: &str) -> QueueResult<u64> {
        Ok(self.store.unschedule_recurring(&self.key, &self.intervals, task_ref).await?)
    }

    /// Push `task_ref` into todo now without touching its schedule.
    /// Returns 0 if it is not recurring.
    pub async fn immediate(&self, task_ref: &str) -> QueueResult<u64> {
        if self.store.zscore(&self.key, task_ref).await?.is_none() {
            return Ok(0);
        }
        self.store.push(&self.todo, task_ref).await?;
        Ok(1)
    }

    /// Interval of `task_ref` in ms, if recurring.
    pub async fn interval(&self, task_ref: &str) -> QueueResult<Option<i64>> {
        Ok(self.store.recurring_interval(&self.intervals, task_ref).await?)
    }

    /// Next fire time of `task_ref`, if recurring.
    pub async fn next_fire(&self, task_ref: &str) -> QueueResult<Option<i64>> {
        Ok(self.store.zscore(&self.key, task_ref).await?)
    }

    /// Number of recurring refs.
    pub async fn len(&self) -> QueueResult<u64> {
        Ok(self.store.zcard(&self.key).await?)
    }

    /// Promote and reschedule everything due now.
    pub async fn sweep_once(&self) -> QueueResult<Vec<String>> {
        let now = self.clock.now_ms();
        Ok(self.store.promote_recurring(&self.key, &self.intervals, now, &self.todo).await?)
    }
}

#[async_trait]
impl Sweep for RecurringList {
    fn name(&self) -> &'static str {
        "recurring"
    }

    async fn sweep_once(&self) -> QueueResult<Vec<String>> {
        RecurringList::sweep_once(self).await
    }
}
