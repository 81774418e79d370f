//! Periodic sweep driver shared by the deferred and recurring lists.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::QueueResult;

/// One promotion pass over a time-scored set.
#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Promote every due entry. Returns the refs moved into todo.
    async fn sweep_once(&self) -> QueueResult<Vec<String>>;
}

/// Runs a [`Sweep`] on a fixed interval until stopped.
///
/// A failed pass is logged and the timer keeps going; entries that were not
/// drained are still in the set for the next pass. Stopping never interrupts
/// a pass that has already started.
pub struct Sweeper {
    name: &'static str,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    /// Spawn the sweep loop. The first pass runs one interval from now.
    pub fn spawn<S: Sweep>(sweep: Arc<S>, interval: Duration) -> Self {
        let name = sweep.name();
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            info!("{} sweeper started (interval={}ms)", name, interval.as_millis());

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        match sweep.sweep_once().await {
                            Ok(moved) if !moved.is_empty() => {
                                debug!("{} sweep promoted {} task(s)", name, moved.len());
                            }
                            Ok(_) => {}
                            Err(e) => warn!("{} sweep failed: {}", name, e),
                        }
                    }
                }
            }

            info!("{} sweeper stopped", name);
        });

        Self {
            name,
            token,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Name of the sweep being driven.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the loop has not been asked to stop.
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Cancel the timer and wait for the loop to exit. Idempotent.
    pub async fn stop(&self) {
        self.token.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("{} sweeper exited abnormally: {}", self.name, e);
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::QueueError;
    use relayq_store::StoreError;

    struct CountingSweep {
        passes: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl Sweep for CountingSweep {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn sweep_once(&self) -> QueueResult<Vec<String>> {
            let pass = self.passes.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && pass == 0 {
                return Err(QueueError::Store(StoreError::Connection("flaky".to_string())));
            }
            Ok(vec![format!("pass-{}", pass)])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_ticks_on_interval() {
        let sweep = Arc::new(CountingSweep {
            passes: AtomicUsize::new(0),
            fail_first: false,
        });
        let sweeper = Sweeper::spawn(sweep.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(350)).await;
        sweeper.stop().await;

        // One pass per 100ms.
        assert_eq!(sweep.passes.load(Ordering::SeqCst), 3);
        assert!(!sweeper.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_survives_failed_pass() {
        let sweep = Arc::new(CountingSweep {
            passes: AtomicUsize::new(0),
            fail_first: true,
        });
        let sweeper = Sweeper::spawn(sweep.clone(), Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(120)).await;
        sweeper.stop().await;

        assert!(sweep.passes.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_halts_passes() {
        let sweep = Arc::new(CountingSweep {
            passes: AtomicUsize::new(0),
            fail_first: false,
        });
        let sweeper = Sweeper::spawn(sweep.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(25)).await;

        sweeper.stop().await;
        sweeper.stop().await;
        let after_stop = sweep.passes.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sweep.passes.load(Ordering::SeqCst), after_stop);
    }
}
