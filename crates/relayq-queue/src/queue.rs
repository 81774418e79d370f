//! Queue coordinator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use relayq_storage::{StorageAdapter, Task};
use relayq_store::{AtomicStore, Clock, StoreConnector, SystemClock};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{FinishMode, QueueConfig, QueueName};
use crate::deferred::DeferredList;
use crate::error::{QueueError, QueueResult};
use crate::recurring::RecurringList;
use crate::sweep::Sweeper;

/// Field a failed task's error is written to.
pub const ERROR_FIELD: &str = "error";

/// Snapshot of how many refs sit in each queue and set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub todo: u64,
    pub doing: u64,
    pub failed: u64,
    pub done: u64,
    pub deferred: u64,
    pub recurring: u64,
}

/// A reliable task queue.
///
/// Producers [`push`](Self::push) tasks into `todo`; workers claim them into
/// `doing` with [`process`](Self::process) and resolve them with
/// [`finish`](Self::finish) or [`fail`](Self::fail). All queue state lives in
/// the atomic store. The coordinator holds no locks of its own, so any number
/// of coordinators may share a namespace.
///
/// Operations that write storage and move a ref run the two steps
/// concurrently and report the first error. A crash between them can leave a
/// ref without a stored task or a stored task without a ref.
pub struct RelayQueue {
    config: QueueConfig,
    connector: Arc<dyn StoreConnector>,
    store: Arc<dyn AtomicStore>,
    storage: Arc<dyn StorageAdapter>,
    todo: String,
    doing: String,
    failed: String,
    done: Option<String>,
    deferred: Option<DeferredList>,
    recurring: Option<RecurringList>,
    sweepers: Vec<Sweeper>,
    ended: AtomicBool,
}

impl RelayQueue {
    /// Connect a coordinator using the system clock.
    pub async fn connect(
        config: QueueConfig,
        connector: Arc<dyn StoreConnector>,
        storage: Arc<dyn StorageAdapter>,
    ) -> QueueResult<Self> {
        Self::connect_with_clock(config, connector, storage, Arc::new(SystemClock)).await
    }

    /// Connect a coordinator.
    ///
    /// Enabled deferred and recurring lists each get their own store
    /// connection and start sweeping immediately.
    pub async fn connect_with_clock(
        config: QueueConfig,
        connector: Arc<dyn StoreConnector>,
        storage: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
    ) -> QueueResult<Self> {
        config.validate()?;

        let store = connector.connect().await?;
        let todo = config.queue_key(QueueName::Todo);
        let mut sweepers = Vec::new();

        let deferred = if config.deferred.enabled {
            let list = DeferredList::new(
                connector.connect().await?,
                clock.clone(),
                config.deferred_key(),
                todo.clone(),
            );
            sweepers.push(Sweeper::spawn(
                Arc::new(list.clone()),
                config.deferred.polling_interval(),
            ));
            Some(list)
        } else {
            None
        };

        let recurring = if config.recurring.enabled {
            let list = RecurringList::new(
                connector.connect().await?,
                clock.clone(),
                config.recurring_key(),
                config.recurring_intervals_key(),
                todo.clone(),
            );
            sweepers.push(Sweeper::spawn(
                Arc::new(list.clone()),
                config.recurring.polling_interval(),
            ));
            Some(list)
        } else {
            None
        };

        info!(
            "Queue {} connected (finish mode {:?}, deferred {}, recurring {})",
            config.prefix,
            config.finish_mode,
            deferred.is_some(),
            recurring.is_some()
        );

        Ok(Self {
            doing: config.queue_key(QueueName::Doing),
            failed: config.queue_key(QueueName::Failed),
            done: config
                .finish_mode
                .has_done_queue()
                .then(|| config.queue_key(QueueName::Done)),
            todo,
            config,
            connector,
            store,
            storage,
            deferred,
            recurring,
            sweepers,
            ended: AtomicBool::new(false),
        })
    }

    /// Configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Deferred list, if enabled.
    pub fn deferred(&self) -> Option<&DeferredList> {
        self.deferred.as_ref()
    }

    /// Recurring list, if enabled.
    pub fn recurring(&self) -> Option<&RecurringList> {
        self.recurring.as_ref()
    }

    pub(crate) fn connector(&self) -> &Arc<dyn StoreConnector> {
        &self.connector
    }

    /// Key of a named queue, or a config error for `done` in a clean mode.
    pub fn queue_key(&self, name: QueueName) -> QueueResult<&str> {
        match name {
            QueueName::Todo => Ok(&self.todo),
            QueueName::Doing => Ok(&self.doing),
            QueueName::Failed => Ok(&self.failed),
            QueueName::Done => self.done.as_deref().ok_or_else(|| {
                QueueError::Config("the done queue only exists in dirty finish mode".to_string())
            }),
        }
    }

    /// The task's ref, generating and storing a new one if it has none.
    pub fn task_ref(&self, task: &mut Task) -> String {
        if let Some(id) = task.id(&self.config.id_field) {
            return id;
        }
        let id = uuid::Uuid::new_v4().to_string();
        task.set_id(&self.config.id_field, id.clone());
        id
    }

    fn existing_ref(&self, task: &Task) -> QueueResult<String> {
        task.id(&self.config.id_field)
            .ok_or_else(|| QueueError::Unidentified {
                field: self.config.id_field.clone(),
            })
    }

    /// Fetch the task stored for `task_ref`.
    pub async fn get(&self, task_ref: &str) -> QueueResult<Option<Task>> {
        Ok(self.storage.get(task_ref).await?)
    }

    /// Fetch the task stored for `task_ref` without its identifier field.
    pub async fn get_clean(&self, task_ref: &str) -> QueueResult<Option<Task>> {
        let task = self.get(task_ref).await?;
        Ok(task.map(|mut task| {
            task.remove(&self.config.id_field);
            task
        }))
    }

    /// Store `task` and append its ref to todo. Returns the ref.
    pub async fn push(&self, task: &mut Task) -> QueueResult<String> {
        let task_ref = self.task_ref(task);
        let task = &*task;

        tokio::try_join!(
            async { Ok::<_, QueueError>(self.storage.set(task, &task_ref).await?) },
            async { Ok::<_, QueueError>(self.store.push(&self.todo, &task_ref).await?) },
        )?;

        debug!(task_ref = %task_ref, "Pushed task");
        Ok(task_ref)
    }

    /// Claim the head of todo into doing.
    ///
    /// Returns `None` when todo is empty. A claimed ref with no stored task
    /// is left in doing and reported as [`QueueError::MissingTask`].
    pub async fn process(&self) -> QueueResult<Option<Task>> {
        match self.store.pop_transfer(&self.todo, &self.doing).await? {
            Some(task_ref) => self.resolve(task_ref).await.map(Some),
            None => Ok(None),
        }
    }

    /// Like [`process`](Self::process), waiting up to `timeout` for a task.
    ///
    /// A zero timeout waits indefinitely. Elapsing returns
    /// [`QueueError::Timeout`].
    pub async fn bprocess(&self, timeout: Duration) -> QueueResult<Task> {
        match self
            .store
            .bpop_transfer(&self.todo, &self.doing, timeout)
            .await?
        {
            Some(task_ref) => self.resolve(task_ref).await,
            None => Err(QueueError::Timeout),
        }
    }

    pub(crate) async fn resolve(&self, task_ref: String) -> QueueResult<Task> {
        debug!(task_ref = %task_ref, "Claimed task");
        match self.storage.get(&task_ref).await? {
            Some(task) => Ok(task),
            None => Err(QueueError::MissingTask { task_ref }),
        }
    }

    /// Resolve a claimed task as succeeded.
    ///
    /// In dirty mode the task is stored and its ref moved to done; in clean
    /// mode the ref is dropped and the task deleted (or kept, with
    /// `clean+keep-storage`). A ref not in doing is looked for in failed
    /// unless `dont_check_failed` is set. Returns the count resolved.
    pub async fn finish(&self, task: &Task, dont_check_failed: bool) -> QueueResult<u64> {
        let task_ref = self.existing_ref(task)?;

        let (_, mut resolved) = tokio::try_join!(
            self.finish_storage(task, &task_ref),
            self.resolve_from(&self.doing, &task_ref),
        )?;

        if resolved == 0 && !dont_check_failed {
            resolved = self.resolve_from(&self.failed, &task_ref).await?;
        }

        if resolved == 0 {
            return Err(QueueError::NotProcessingOrFailed { task_ref });
        }

        debug!(task_ref = %task_ref, "Finished task");
        Ok(resolved)
    }

    async fn finish_storage(&self, task: &Task, task_ref: &str) -> QueueResult<()> {
        if self.config.finish_mode.deletes_storage() {
            self.storage.del(task_ref).await?;
        } else {
            self.storage.set(task, task_ref).await?;
        }
        Ok(())
    }

    async fn resolve_from(&self, queue: &str, task_ref: &str) -> QueueResult<u64> {
        let count = match &self.done {
            Some(done) => self.store.move_item(queue, done, task_ref).await?,
            None => self.store.pull(queue, task_ref).await?,
        };
        Ok(count)
    }

    /// Resolve a claimed task as failed.
    ///
    /// `error`, when given, is written to the task's `error` field before the
    /// task is stored. Returns the count moved.
    pub async fn fail(&self, task: &mut Task, error: Option<&str>) -> QueueResult<u64> {
        let task_ref = self.existing_ref(task)?;
        if let Some(error) = error {
            task.insert(ERROR_FIELD, error);
        }
        let task = &*task;

        let (_, moved) = tokio::try_join!(
            async { Ok::<_, QueueError>(self.storage.set(task, &task_ref).await?) },
            async {
                Ok::<_, QueueError>(self.store.move_item(&self.doing, &self.failed, &task_ref).await?)
            },
        )?;

        if moved == 0 {
            return Err(QueueError::NotProcessing { task_ref });
        }

        debug!(task_ref = %task_ref, "Failed task");
        Ok(moved)
    }

    /// Drop `task_ref` from a queue without resolving it.
    ///
    /// The stored task is deleted too unless `dont_del` is set. Returns the
    /// count removed from the queue.
    pub async fn remove(&self, from: QueueName, task_ref: &str, dont_del: bool) -> QueueResult<u64> {
        let queue = self.queue_key(from)?;

        if dont_del {
            return Ok(self.store.pull(queue, task_ref).await?);
        }

        let (_, removed) = tokio::try_join!(
            async { Ok::<_, QueueError>(self.storage.del(task_ref).await?) },
            async { Ok::<_, QueueError>(self.store.pull(queue, task_ref).await?) },
        )?;
        debug!(task_ref = %task_ref, queue = %from, "Removed task");
        Ok(removed)
    }

    fn deferred_list(&self) -> QueueResult<&DeferredList> {
        self.deferred.as_ref().ok_or_else(|| {
            QueueError::Config("deferred support is not enabled for this queue".to_string())
        })
    }

    fn recurring_list(&self) -> QueueResult<&RecurringList> {
        self.recurring.as_ref().ok_or_else(|| {
            QueueError::Config("recurring support is not enabled for this queue".to_string())
        })
    }

    /// Store `task` and schedule it to enter todo at `when_ms` (epoch ms).
    pub async fn defer(&self, task: &mut Task, when_ms: i64) -> QueueResult<String> {
        let deferred = self.deferred_list()?;
        let task_ref = self.task_ref(task);
        let task = &*task;

        tokio::try_join!(
            async { Ok::<_, QueueError>(self.storage.set(task, &task_ref).await?) },
            deferred.defer(&task_ref, when_ms),
        )?;
        Ok(task_ref)
    }

    /// Drop a deferred ref and delete its task. Returns 0 if it was not deferred.
    pub async fn undefer_remove(&self, task_ref: &str) -> QueueResult<u64> {
        let deferred = self.deferred_list()?;
        let (_, removed) = tokio::try_join!(
            async { Ok::<_, QueueError>(self.storage.del(task_ref).await?) },
            deferred.eliminate(task_ref),
        )?;
        Ok(removed)
    }

    /// Move a deferred ref into todo now. Returns 0 if it was not deferred.
    pub async fn undefer_push(&self, task_ref: &str) -> QueueResult<u64> {
        self.deferred_list()?.immediate(task_ref).await
    }

    /// Store `task` and push it into todo every `interval`.
    ///
    /// The first fire is one interval from now.
    pub async fn recur(&self, task: &mut Task, interval: Duration) -> QueueResult<String> {
        let recurring = self.recurring_list()?;
        let interval_ms = i64::try_from(interval.as_millis()).map_err(|_| {
            QueueError::Config(format!(
                "recurring interval of {}ms is too large",
                interval.as_millis()
            ))
        })?;
        if interval_ms <= 0 {
            return Err(QueueError::Config(
                "recurring interval must be at least 1ms".to_string(),
            ));
        }

        let task_ref = self.task_ref(task);
        let task = &*task;

        tokio::try_join!(
            async { Ok::<_, QueueError>(self.storage.set(task, &task_ref).await?) },
            recurring.recur(&task_ref, interval_ms),
        )?;
        Ok(task_ref)
    }

    /// Stop a ref from recurring and delete its task. Returns 0 if it was not recurring.
    pub async fn unrecur_remove(&self, task_ref: &str) -> QueueResult<u64> {
        let recurring = self.recurring_list()?;
        let (_, removed) = tokio::try_join!(
            async { Ok::<_, QueueError>(self.storage.del(task_ref).await?) },
            recurring.eliminate(task_ref),
        )?;
        Ok(removed)
    }

    /// Fire a recurring ref once now, keeping its schedule.
    pub async fn recur_now(&self, task_ref: &str) -> QueueResult<u64> {
        self.recurring_list()?.immediate(task_ref).await
    }

    /// Refs currently in a queue, head first.
    pub async fn list(&self, name: QueueName) -> QueueResult<Vec<String>> {
        let key = self.queue_key(name)?;
        Ok(self.store.range(key).await?)
    }

    /// Count of refs in every queue and set.
    pub async fn counts(&self) -> QueueResult<QueueCounts> {
        let mut counts = QueueCounts {
            todo: self.store.len(&self.todo).await?,
            doing: self.store.len(&self.doing).await?,
            failed: self.store.len(&self.failed).await?,
            ..Default::default()
        };
        if let Some(done) = &self.done {
            counts.done = self.store.len(done).await?;
        }
        if let Some(deferred) = &self.deferred {
            counts.deferred = deferred.len().await?;
        }
        if let Some(recurring) = &self.recurring {
            counts.recurring = recurring.len().await?;
        }
        Ok(counts)
    }

    /// Whether [`end`](Self::end) has been called.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Stop the deferred and recurring sweepers and wait for them to exit.
    ///
    /// In-flight calls are not cancelled. Entries still in the sets stay
    /// there. Idempotent.
    pub async fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        for sweeper in &self.sweepers {
            sweeper.stop().await;
        }
        info!("Queue {} ended", self.config.prefix);
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
