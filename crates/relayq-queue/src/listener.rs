//! Continuous delivery loop.
//!
//! A listener claims refs from todo into doing as they arrive, resolves each
//! to its task, and hands it to a [`TaskHandler`] with a [`Completion`]. The
//! first completion signal decides whether the task is finished or failed.
//! Up to `max_out` deliveries run at once; the loop keeps claiming while
//! earlier deliveries are still in flight.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use relayq_storage::Task;
use relayq_store::Subscription;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::QueueName;
use crate::error::{ListenerError, QueueError, QueueResult};
use crate::queue::RelayQueue;

/// Error recorded on a task whose handler let go of every completion handle.
pub const DROPPED_COMPLETION: &str = "handler dropped delivery without completing";

type Outcome = Result<(), String>;

/// Handles tasks delivered by a [`Listener`].
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Process `task` and signal the outcome through `completion`.
    ///
    /// The completion may be cloned, moved into another task, or signalled
    /// after this method returns.
    async fn handle(&self, task: Task, completion: Completion);
}

struct CompletionInner {
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

/// Resolves one delivery. The first signal wins; later ones are ignored.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<CompletionInner>,
}

impl Completion {
    fn new() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            inner: Arc::new(CompletionInner {
                sender: Mutex::new(Some(tx)),
            }),
        };
        (completion, rx)
    }

    /// Mark the task as succeeded. Returns false if already completed.
    pub fn succeed(&self) -> bool {
        self.complete(Ok(()))
    }

    /// Mark the task as failed with `error`. Returns false if already completed.
    pub fn fail(&self, error: impl fmt::Display) -> bool {
        self.complete(Err(error.to_string()))
    }

    /// Whether a signal has already been given.
    pub fn is_completed(&self) -> bool {
        self.inner.sender.lock().is_none()
    }

    fn complete(&self, outcome: Outcome) -> bool {
        let sender = self.inner.sender.lock().take();
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Shared state of every delivery spawned by one listener.
struct Dispatch {
    queue: Arc<RelayQueue>,
    handler: Arc<dyn TaskHandler>,
    errors: mpsc::UnboundedSender<ListenerError>,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatch {
    fn report(&self, error: QueueError, task_ref: Option<String>) {
        match &task_ref {
            Some(task_ref) => error!(task_ref = %task_ref, "Delivery error: {}", error),
            None => error!("Listener error: {}", error),
        }
        let _ = self.errors.send(ListenerError::new(error, task_ref));
    }

    async fn deliver(&self, task_ref: String) {
        let task = match self.queue.resolve(task_ref.clone()).await {
            Ok(task) => task,
            Err(e) => {
                self.report(e, Some(task_ref));
                return;
            }
        };

        let (completion, outcome) = Completion::new();
        self.handler.handle(task.clone(), completion).await;

        let result = match outcome.await {
            Ok(Ok(())) => self.queue.finish(&task, false).await,
            Ok(Err(reason)) => {
                let mut task = task;
                self.queue.fail(&mut task, Some(reason.as_str())).await
            }
            Err(_) => {
                warn!(task_ref = %task_ref, "{}", DROPPED_COMPLETION);
                let mut task = task;
                self.queue.fail(&mut task, Some(DROPPED_COMPLETION)).await
            }
        };

        match result {
            Ok(_) => debug!(task_ref = %task_ref, "Delivery resolved"),
            Err(e) => self.report(e, Some(task_ref)),
        }
    }
}

/// A running delivery loop. See [`RelayQueue::listen`].
pub struct Listener {
    token: CancellationToken,
    claim_loop: Mutex<Option<JoinHandle<()>>>,
    deliveries: TaskTracker,
    in_flight: Arc<AtomicUsize>,
    errors: Option<mpsc::UnboundedReceiver<ListenerError>>,
}

impl Listener {
    /// Stop claiming new tasks. In-flight deliveries run to completion.
    pub fn end(&self) {
        if !self.token.is_cancelled() {
            info!("Listener ending");
        }
        self.token.cancel();
    }

    /// Whether [`end`](Self::end) has been called.
    pub fn is_ended(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the claim loop to exit and every delivery to resolve.
    ///
    /// Only returns once [`end`](Self::end) has been called.
    pub async fn join(&self) {
        let handle = self.claim_loop.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Listener claim loop exited abnormally: {}", e);
            }
        }
        self.deliveries.close();
        self.deliveries.wait().await;
    }

    /// Number of deliveries currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Take the error stream. Returns `None` after the first call.
    pub fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<ListenerError>> {
        self.errors.take()
    }

    /// Next delivery error, or `None` once the claim loop and every delivery
    /// have exited. Returns `None` immediately if the stream was taken.
    pub async fn next_error(&mut self) -> Option<ListenerError> {
        match self.errors.as_mut() {
            Some(errors) => errors.recv().await,
            None => None,
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl RelayQueue {
    /// Start delivering tasks from todo to `handler`.
    ///
    /// The listener claims over its own store connection. Delivery errors,
    /// including claimed refs with no stored task, go to the listener's error
    /// stream and never stop the loop. A ref whose task is missing is left in
    /// doing.
    pub async fn listen(self: &Arc<Self>, handler: Arc<dyn TaskHandler>) -> QueueResult<Listener> {
        let config = self.config().listener.clone();
        if config.max_out == 0 {
            return Err(QueueError::Config(
                "listener.max_out must be greater than 0".to_string(),
            ));
        }

        let store = self.connector().connect().await?;
        let subscription = Subscription::new(
            store,
            self.config().queue_key(QueueName::Todo),
            self.config().queue_key(QueueName::Doing),
            config.poll_timeout(),
        );

        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let dispatch = Arc::new(Dispatch {
            queue: self.clone(),
            handler,
            errors: errors_tx,
            in_flight: in_flight.clone(),
        });
        let token = CancellationToken::new();
        let deliveries = TaskTracker::new();
        let permits = Arc::new(Semaphore::new(config.max_out));

        let handle = tokio::spawn(claim_loop(
            subscription,
            permits,
            token.clone(),
            deliveries.clone(),
            dispatch,
        ));

        info!(
            "Listener started on {} (max_out={})",
            self.config().queue_key(QueueName::Todo),
            config.max_out
        );

        Ok(Listener {
            token,
            claim_loop: Mutex::new(Some(handle)),
            deliveries,
            in_flight,
            errors: Some(errors_rx),
        })
    }
}

async fn claim_loop(
    subscription: Subscription,
    permits: Arc<Semaphore>,
    token: CancellationToken,
    deliveries: TaskTracker,
    dispatch: Arc<Dispatch>,
) {
    loop {
        let permit: OwnedSemaphorePermit = tokio::select! {
            _ = token.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        if token.is_cancelled() {
            break;
        }

        match subscription.claim().await {
            Ok(Some(task_ref)) => {
                let dispatch = dispatch.clone();
                dispatch.in_flight.fetch_add(1, Ordering::SeqCst);
                deliveries.spawn(async move {
                    dispatch.deliver(task_ref).await;
                    dispatch.in_flight.fetch_sub(1, Ordering::SeqCst);
                    drop(permit);
                });
            }
            Ok(None) => {}
            Err(e) => {
                dispatch.report(e.into(), None);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(subscription.window()) => {}
                }
            }
        }
    }

    info!("Listener on {} stopped claiming", subscription.source());
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
