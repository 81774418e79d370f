//! Worker subcommand handler for relayq.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};

use relayq_queue::{Completion, RelayQueue, Task, TaskHandler};

/// Logs every delivered task and completes it.
///
/// A task carrying a string `fail` field is failed with that message, which
/// makes it easy to exercise the failed queue from the command line.
#[derive(Default)]
pub(crate) struct LogHandler {
    handled: AtomicU64,
}

impl LogHandler {
    pub(crate) fn handled(&self) -> u64 {
        self.handled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for LogHandler {
    async fn handle(&self, task: Task, completion: Completion) {
        self.handled.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_string(&task).unwrap_or_default();
        match task.get("fail").and_then(|v| v.as_str()) {
            Some(reason) => {
                warn!("Failing task {}: {}", body, reason);
                completion.fail(reason);
            }
            None => {
                info!("Handled task {}", body);
                completion.succeed();
            }
        }
    }
}

/// Run a listener until ctrl-c, then drain in-flight deliveries.
pub(crate) async fn work(queue: Arc<RelayQueue>) -> Result<(), Box<dyn std::error::Error>> {
    let handler = Arc::new(LogHandler::default());
    let mut listener = queue.listen(handler.clone()).await?;
    info!(
        "Worker started (max_out = {})",
        queue.config().listener.max_out
    );

    let mut errors = listener.take_errors();
    let drain = tokio::spawn(async move {
        let mut count = 0u64;
        if let Some(errors) = errors.as_mut() {
            while errors.recv().await.is_some() {
                count += 1;
            }
        }
        count
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, waiting for {} in-flight task(s)", listener.in_flight());

    listener.end();
    listener.join().await;
    drop(listener);
    queue.end().await;

    let failed = drain.await.unwrap_or(0);
    info!(
        "Worker stopped: {} task(s) handled, {} delivery error(s)",
        handler.handled(),
        failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use relayq_queue::{FinishMode, QueueConfig, QueueName};
    use relayq_storage::JsonStorage;
    use relayq_store::MemoryStore;

    #[tokio::test]
    async fn test_log_handler_fails_on_fail_field() {
        let store = MemoryStore::new();
        let config = QueueConfig {
            finish_mode: FinishMode::Dirty,
            ..QueueConfig::with_prefix("w")
        };
        let storage = JsonStorage::json(Arc::new(store.clone()), config.storage_prefix(), ":");
        let queue = Arc::new(
            RelayQueue::connect(config, Arc::new(store), Arc::new(storage))
                .await
                .unwrap(),
        );

        queue.push(&mut Task::new().with("n", 1)).await.unwrap();
        queue
            .push(&mut Task::new().with("fail", "bad input"))
            .await
            .unwrap();

        let handler = Arc::new(LogHandler::default());
        let listener = queue.listen(handler.clone()).await.unwrap();
        for _ in 0..400 {
            if handler.handled() == 2 && listener.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        listener.end();
        listener.join().await;

        assert_eq!(handler.handled(), 2);
        assert_eq!(queue.list(QueueName::Done).await.unwrap().len(), 1);
        assert_eq!(queue.list(QueueName::Failed).await.unwrap().len(), 1);
    }
}
