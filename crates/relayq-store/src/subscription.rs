//! Continuous subscribe-and-transfer.

use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreResult;
use crate::store::AtomicStore;

/// Claims items from `src` into `dst` as they arrive.
///
/// Each call to [`claim`](Self::claim) waits at most one window. A claim that
/// has been issued is always awaited to completion: dropping a blocking
/// transfer midway could leave an item moved into `dst` with nobody to
/// deliver it.
pub struct Subscription {
    store: Arc<dyn AtomicStore>,
    src: String,
    dst: String,
    window: Duration,
}

impl Subscription {
    /// Subscribe to `src`, transferring into `dst`.
    ///
    /// A zero `window` is bumped to one millisecond, since a zero timeout
    /// means "wait forever" to the store.
    pub fn new(
        store: Arc<dyn AtomicStore>,
        src: impl Into<String>,
        dst: impl Into<String>,
        window: Duration,
    ) -> Self {
        Self {
            store,
            src: src.into(),
            dst: dst.into(),
            window: window.max(Duration::from_millis(1)),
        }
    }

    /// Source list.
    pub fn source(&self) -> &str {
        &self.src
    }

    /// Destination list.
    pub fn destination(&self) -> &str {
        &self.dst
    }

    /// Longest a single claim waits.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Claim the next item, or `None` if the window elapsed empty.
    pub async fn claim(&self) -> StoreResult<Option<String>> {
        self.store
            .bpop_transfer(&self.src, &self.dst, self.window)
            .await
    }
}
