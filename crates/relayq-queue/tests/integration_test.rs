//! End-to-end tests for the queue coordinator.
//!
//! These run against the in-memory store with the real system clock, so
//! deferred and recurring promotion go through the background sweepers.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relayq_queue::{
    Completion, FinishMode, QueueConfig, QueueError, QueueName, RelayQueue, SweepConfig, Task,
    TaskHandler,
};
use relayq_storage::{PackedStorage, StorageAdapter};
use relayq_store::{AtomicStore, Clock, MemoryStore, SystemClock};
use serde_json::json;

// ============================================================================
// Test Helpers
// ============================================================================

fn config(prefix: &str) -> QueueConfig {
    QueueConfig {
        finish_mode: FinishMode::Dirty,
        deferred: SweepConfig {
            polling_interval_ms: 20,
            ..SweepConfig::enabled()
        },
        recurring: SweepConfig {
            polling_interval_ms: 20,
            ..SweepConfig::enabled()
        },
        ..QueueConfig::with_prefix(prefix)
    }
}

async fn queue(config: QueueConfig) -> (Arc<RelayQueue>, MemoryStore) {
    let store = MemoryStore::new();
    let storage = PackedStorage::packed(
        Arc::new(store.clone()),
        config.storage_prefix(),
        config.delimiter.clone(),
    );
    let queue = RelayQueue::connect(config, Arc::new(store.clone()), Arc::new(storage))
        .await
        .unwrap();
    (Arc::new(queue), store)
}

async fn eventually(store: &MemoryStore, key: &str, at_least: u64) -> bool {
    for _ in 0..200 {
        if store.len(key).await.unwrap() >= at_least {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Counts deliveries and succeeds every one.
struct CountingHandler {
    delivered: AtomicUsize,
}

#[async_trait]
impl TaskHandler for CountingHandler {
    async fn handle(&self, task: Task, completion: Completion) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        if task.get("poison").is_some() {
            completion.fail("poisoned");
        } else {
            completion.succeed();
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle_with_packed_storage() {
    let (queue, store) = queue(config("life")).await;

    let mut task = Task::from_value(json!({
        "kind": "resize",
        "args": {"width": 640, "formats": ["png", "webp"]},
        "caption": "café ☕",
    }))
    .unwrap();
    let task_ref = queue.push(&mut task).await.unwrap();
    assert_eq!(store.range("life:todo").await.unwrap(), vec![task_ref.clone()]);

    let claimed = queue.process().await.unwrap().unwrap();
    assert_eq!(claimed, task);

    let mut claimed = claimed;
    queue.fail(&mut claimed, Some("out of memory")).await.unwrap();
    assert_eq!(queue.list(QueueName::Failed).await.unwrap(), vec![task_ref.clone()]);

    queue.finish(&claimed, false).await.unwrap();
    assert_eq!(queue.list(QueueName::Done).await.unwrap(), vec![task_ref.clone()]);

    let err = queue.finish(&claimed, false).await.unwrap_err();
    assert!(err.is_state_conflict());

    let stored = queue.get_clean(&task_ref).await.unwrap().unwrap();
    assert_eq!(stored.get("error"), Some(&json!("out of memory")));
    assert_eq!(stored.get("id"), None);

    queue.end().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_are_distinct() {
    let (queue, _) = queue(QueueConfig::with_prefix("race")).await;
    let n = 64;
    for _ in 0..n {
        queue.push(&mut Task::new()).await.unwrap();
    }

    let mut workers = Vec::new();
    for _ in 0..n {
        let queue = queue.clone();
        workers.push(tokio::spawn(async move { queue.process().await }));
    }

    let mut seen = HashSet::new();
    for worker in workers {
        let task = worker.await.unwrap().unwrap().unwrap();
        assert!(seen.insert(task.id("id").unwrap()));
    }
    assert_eq!(seen.len(), n);
    assert!(queue.process().await.unwrap().is_none());
}

// ============================================================================
// Deferred and recurring
// ============================================================================

#[tokio::test]
async fn test_deferred_task_promoted_after_due_time() {
    let (queue, store) = queue(config("later")).await;
    let due = SystemClock.now_ms() + 50;

    let task_ref = queue.defer(&mut Task::new(), due).await.unwrap();
    assert_eq!(store.len("later:todo").await.unwrap(), 0);

    assert!(eventually(&store, "later:todo", 1).await);
    assert!(SystemClock.now_ms() >= due);
    assert_eq!(queue.list(QueueName::Todo).await.unwrap(), vec![task_ref.clone()]);
    assert_eq!(queue.counts().await.unwrap().deferred, 0);

    // Already promoted, so there is nothing left to remove.
    assert_eq!(queue.undefer_remove(&task_ref).await.unwrap(), 0);

    queue.end().await;
}

#[tokio::test]
async fn test_recurring_task_fires_repeatedly() {
    let (queue, store) = queue(config("tick")).await;
    let task_ref = queue
        .recur(&mut Task::new().with("job", "report"), Duration::from_millis(100))
        .await
        .unwrap();

    assert!(eventually(&store, "tick:todo", 2).await);

    let todo = queue.list(QueueName::Todo).await.unwrap();
    assert!(todo.iter().all(|r| *r == task_ref));
    assert_eq!(queue.counts().await.unwrap().recurring, 1);
    assert_eq!(queue.recurring().unwrap().interval(&task_ref).await.unwrap(), Some(100));

    queue.end().await;
}

#[tokio::test]
async fn test_end_stops_promotion() {
    let (queue, store) = queue(config("halt")).await;
    queue.end().await;

    let due = SystemClock.now_ms();
    queue.defer(&mut Task::new(), due).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.len("halt:todo").await.unwrap(), 0);
    assert_eq!(queue.counts().await.unwrap().deferred, 1);
}

// ============================================================================
// Listener
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listener_drains_queue() {
    let mut config = config("work");
    config.listener.max_out = 8;
    config.listener.poll_timeout_ms = 20;
    let (queue, store) = queue(config).await;

    for i in 0..30 {
        let mut task = Task::new().with("n", i);
        if i % 10 == 0 {
            task.insert("poison", true);
        }
        queue.push(&mut task).await.unwrap();
    }

    let handler = Arc::new(CountingHandler {
        delivered: AtomicUsize::new(0),
    });
    let listener = queue.listen(handler.clone()).await.unwrap();

    assert!(eventually(&store, "work:done", 27).await);
    assert!(eventually(&store, "work:failed", 3).await);

    listener.end();
    listener.join().await;

    assert_eq!(handler.delivered.load(Ordering::SeqCst), 30);
    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.todo + counts.doing, 0);

    queue.end().await;
}

#[tokio::test]
async fn test_listener_picks_up_deferred_tasks() {
    let mut config = config("mixed");
    config.listener.poll_timeout_ms = 20;
    let (queue, store) = queue(config).await;

    let handler = Arc::new(CountingHandler {
        delivered: AtomicUsize::new(0),
    });
    let listener = queue.listen(handler.clone()).await.unwrap();

    let due = SystemClock.now_ms() + 30;
    queue.defer(&mut Task::new(), due).await.unwrap();

    assert!(eventually(&store, "mixed:done", 1).await);

    listener.end();
    listener.join().await;
    queue.end().await;
}

#[tokio::test]
async fn test_state_conflict_on_removed_task() {
    let (queue, _) = queue(config("gone")).await;
    let task_ref = queue.push(&mut Task::new()).await.unwrap();
    let task = queue.process().await.unwrap().unwrap();

    assert_eq!(queue.remove(QueueName::Doing, &task_ref, false).await.unwrap(), 1);
    let err = queue.finish(&task, false).await.unwrap_err();
    assert!(matches!(err, QueueError::NotProcessingOrFailed { .. }));

    queue.end().await;
}

#[tokio::test]
async fn test_storage_is_shared_across_coordinators() {
    let store = MemoryStore::new();
    let config = QueueConfig::with_prefix("shared");
    let storage: Arc<dyn StorageAdapter> = Arc::new(PackedStorage::packed(
        Arc::new(store.clone()),
        config.storage_prefix(),
        ":",
    ));

    let producer = RelayQueue::connect(config.clone(), Arc::new(store.clone()), storage.clone())
        .await
        .unwrap();
    let consumer = RelayQueue::connect(config, Arc::new(store.clone()), storage)
        .await
        .unwrap();

    let mut task = Task::new().with("from", "producer");
    producer.push(&mut task).await.unwrap();

    let claimed = consumer.process().await.unwrap().unwrap();
    assert_eq!(claimed, task);
    consumer.finish(&claimed, false).await.unwrap();
    assert_eq!(producer.counts().await.unwrap().doing, 0);
}
