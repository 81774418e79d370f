//! Atomic store trait and connection factory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Transactional substrate for the queue coordinator.
///
/// Every method is a single indivisible operation against the store. Lists
/// are FIFO (push to tail, pop from head). Sorted sets are ordered by score,
/// ties broken lexicographically by member.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Append `item` to the tail of `queue`.
    async fn push(&self, queue: &str, item: &str) -> StoreResult<()>;

    /// Pop the head of `src` and append it to `dst`.
    async fn pop_transfer(&self, src: &str, dst: &str) -> StoreResult<Option<String>>;

    /// Like [`pop_transfer`](Self::pop_transfer), waiting up to `timeout` for
    /// an item. A zero timeout waits indefinitely.
    async fn bpop_transfer(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>>;

    /// Remove `item` from `queue` wherever it sits. Returns the count removed.
    async fn pull(&self, queue: &str, item: &str) -> StoreResult<u64>;

    /// Remove `item` from `src` if present and append it to `dst`.
    /// Returns the count moved.
    async fn move_item(&self, src: &str, dst: &str, item: &str) -> StoreResult<u64>;

    /// Number of items in `queue`.
    async fn len(&self, queue: &str) -> StoreResult<u64>;

    /// Snapshot of `queue`, head first.
    async fn range(&self, queue: &str) -> StoreResult<Vec<String>>;

    /// Insert `member` into `set`, or update its score.
    async fn zadd(&self, set: &str, member: &str, score: i64) -> StoreResult<()>;

    /// Remove `member` from `set`. Returns the count removed.
    async fn zrem(&self, set: &str, member: &str) -> StoreResult<u64>;

    /// Score of `member` in `set`.
    async fn zscore(&self, set: &str, member: &str) -> StoreResult<Option<i64>>;

    /// Number of members in `set`.
    async fn zcard(&self, set: &str) -> StoreResult<u64>;

    /// Remove every member of `set` scored at or below `threshold` and append
    /// them to `dst` in score order. Returns the members moved.
    async fn drain_due(&self, set: &str, threshold: i64, dst: &str) -> StoreResult<Vec<String>>;

    /// Remove `member` from `set` and, if it was present, append it to `dst`.
    async fn transfer_member(&self, set: &str, member: &str, dst: &str) -> StoreResult<u64>;

    /// Record `interval_ms` for `member` in the `intervals` map and schedule
    /// its first fire in `set` at `first_fire`.
    async fn schedule_recurring(
        &self,
        set: &str,
        intervals: &str,
        member: &str,
        interval_ms: i64,
        first_fire: i64,
    ) -> StoreResult<()>;

    /// Remove `member` from `set` and from the `intervals` map. Returns the
    /// count removed from the set.
    async fn unschedule_recurring(
        &self,
        set: &str,
        intervals: &str,
        member: &str,
    ) -> StoreResult<u64>;

    /// Append every member of `set` due at `now` to `dst` and reschedule each
    /// at `now + interval`, saturating at `i64::MAX`. A due member without an
    /// entry in `intervals` is removed from the set. Returns the members
    /// promoted.
    async fn promote_recurring(
        &self,
        set: &str,
        intervals: &str,
        now: i64,
        dst: &str,
    ) -> StoreResult<Vec<String>>;

    /// Interval recorded for `member` in the `intervals` map.
    async fn recurring_interval(&self, intervals: &str, member: &str) -> StoreResult<Option<i64>>;

    /// Read a value from the key-value space.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write a value to the key-value space.
    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete a key. Returns the count removed.
    async fn del(&self, key: &str) -> StoreResult<u64>;
}

/// Store-connection factory.
///
/// Blocking claims and background sweeps each get their own connection so
/// they never stall the coordinator's main connection.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Open a new connection to the store.
    async fn connect(&self) -> StoreResult<Arc<dyn AtomicStore>>;
}
