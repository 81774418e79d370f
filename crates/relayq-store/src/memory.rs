//! In-process atomic store.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::store::{AtomicStore, StoreConnector};

/// Score-ordered set with member lookup.
#[derive(Default)]
struct ScoredSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl ScoredSet {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    /// Members scored at or below `threshold`, in score order.
    fn due(&self, threshold: i64) -> Vec<String> {
        self.ordered
            .iter()
            .take_while(|(score, _)| *score <= threshold)
            .map(|(_, member)| member.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.scores.len()
    }
}

#[derive(Default)]
struct MemoryState {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, ScoredSet>,
    intervals: HashMap<String, HashMap<String, i64>>,
    values: HashMap<String, Vec<u8>>,
}

impl MemoryState {
    fn list(&mut self, name: &str) -> &mut VecDeque<String> {
        self.lists.entry(name.to_string()).or_default()
    }

    fn set(&mut self, name: &str) -> &mut ScoredSet {
        self.sets.entry(name.to_string()).or_default()
    }

    fn pop_transfer(&mut self, src: &str, dst: &str) -> Option<String> {
        let item = self.lists.get_mut(src)?.pop_front()?;
        self.list(dst).push_back(item.clone());
        Some(item)
    }

    fn remove_from_list(&mut self, queue: &str, item: &str) -> u64 {
        let Some(list) = self.lists.get_mut(queue) else {
            return 0;
        };
        match list.iter().position(|x| x == item) {
            Some(idx) => {
                list.remove(idx);
                1
            }
            None => 0,
        }
    }
}

struct MemoryInner {
    state: Mutex<MemoryState>,
    pushed: Notify,
}

/// In-memory atomic store.
///
/// Every operation runs under one lock, so each trait method is atomic with
/// respect to every other. Clones share the same data, which makes the store
/// its own [`StoreConnector`].
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                state: Mutex::new(MemoryState::default()),
                pushed: Notify::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AtomicStore for MemoryStore {
    async fn push(&self, queue: &str, item: &str) -> StoreResult<()> {
        self.inner.state.lock().list(queue).push_back(item.to_string());
        self.inner.pushed.notify_waiters();
        Ok(())
    }

    async fn pop_transfer(&self, src: &str, dst: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.state.lock().pop_transfer(src, dst))
    }

    async fn bpop_transfer(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);

        loop {
            // Register interest before checking so a push between the check
            // and the wait is not missed.
            let notified = self.inner.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.inner.state.lock().pop_transfer(src, dst) {
                return Ok(Some(item));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn pull(&self, queue: &str, item: &str) -> StoreResult<u64> {
        Ok(self.inner.state.lock().remove_from_list(queue, item))
    }

    async fn move_item(&self, src: &str, dst: &str, item: &str) -> StoreResult<u64> {
        let moved = {
            let mut state = self.inner.state.lock();
            let moved = state.remove_from_list(src, item);
            if moved > 0 {
                state.list(dst).push_back(item.to_string());
            }
            moved
        };
        if moved > 0 {
            self.inner.pushed.notify_waiters();
        }
        Ok(moved)
    }

    async fn len(&self, queue: &str) -> StoreResult<u64> {
        let state = self.inner.state.lock();
        Ok(state.lists.get(queue).map_or(0, |l| l.len() as u64))
    }

    async fn range(&self, queue: &str) -> StoreResult<Vec<String>> {
        let state = self.inner.state.lock();
        Ok(state
            .lists
            .get(queue)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn zadd(&self, set: &str, member: &str, score: i64) -> StoreResult<()> {
        self.inner.state.lock().set(set).insert(member, score);
        Ok(())
    }

    async fn zrem(&self, set: &str, member: &str) -> StoreResult<u64> {
        let mut state = self.inner.state.lock();
        Ok(state.sets.get_mut(set).map_or(0, |s| s.remove(member) as u64))
    }

    async fn zscore(&self, set: &str, member: &str) -> StoreResult<Option<i64>> {
        let state = self.inner.state.lock();
        Ok(state.sets.get(set).and_then(|s| s.scores.get(member).copied()))
    }

    async fn zcard(&self, set: &str) -> StoreResult<u64> {
        let state = self.inner.state.lock();
        Ok(state.sets.get(set).map_or(0, |s| s.len() as u64))
    }

    async fn drain_due(&self, set: &str, threshold: i64, dst: &str) -> StoreResult<Vec<String>> {
        let due = {
            let mut state = self.inner.state.lock();
            let Some(scored) = state.sets.get_mut(set) else {
                return Ok(Vec::new());
            };
            let due = scored.due(threshold);
            for member in &due {
                scored.remove(member);
            }
            let list = state.list(dst);
            list.extend(due.iter().cloned());
            due
        };

        if !due.is_empty() {
            debug!("Drained {} due member(s) from {} into {}", due.len(), set, dst);
            self.inner.pushed.notify_waiters();
        }
        Ok(due)
    }

    async fn transfer_member(&self, set: &str, member: &str, dst: &str) -> StoreResult<u64> {
        let moved = {
            let mut state = self.inner.state.lock();
            let removed = state.sets.get_mut(set).is_some_and(|s| s.remove(member));
            if removed {
                state.list(dst).push_back(member.to_string());
            }
            removed as u64
        };
        if moved > 0 {
            self.inner.pushed.notify_waiters();
        }
        Ok(moved)
    }

    async fn schedule_recurring(
        &self,
        set: &str,
        intervals: &str,
        member: &str,
        interval_ms: i64,
        first_fire: i64,
    ) -> StoreResult<()> {
        let mut state = self.inner.state.lock();
        state
            .intervals
            .entry(intervals.to_string())
            .or_default()
            .insert(member.to_string(), interval_ms);
        state.set(set).insert(member, first_fire);
        Ok(())
    }

    async fn unschedule_recurring(
        &self,
        set: &str,
        intervals: &str,
        member: &str,
    ) -> StoreResult<u64> {
        let mut state = self.inner.state.lock();
        if let Some(map) = state.intervals.get_mut(intervals) {
            map.remove(member);
        }
        Ok(state.sets.get_mut(set).map_or(0, |s| s.remove(member) as u64))
    }

    async fn promote_recurring(
        &self,
        set: &str,
        intervals: &str,
        now: i64,
        dst: &str,
    ) -> StoreResult<Vec<String>> {
        let due = {
            let mut state = self.inner.state.lock();
            let due = match state.sets.get(set) {
                Some(scored) => scored.due(now),
                None => return Ok(Vec::new()),
            };
            let recorded = state.intervals.get(intervals).cloned().unwrap_or_default();

            for member in &due {
                state.list(dst).push_back(member.clone());
                let scored = state.set(set);
                match recorded.get(member) {
                    Some(interval) => scored.insert(member, now.saturating_add(*interval)),
                    None => {
                        warn!("Recurring member {} in {} has no interval, dropping it", member, set);
                        scored.remove(member);
                    }
                }
            }
            due
        };

        if !due.is_empty() {
            self.inner.pushed.notify_waiters();
        }
        Ok(due)
    }

    async fn recurring_interval(&self, intervals: &str, member: &str) -> StoreResult<Option<i64>> {
        let state = self.inner.state.lock();
        Ok(state
            .intervals
            .get(intervals)
            .and_then(|m| m.get(member).copied()))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.state.lock().values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.inner.state.lock().values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<u64> {
        Ok(self.inner.state.lock().values.remove(key).is_some() as u64)
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn connect(&self) -> StoreResult<Arc<dyn AtomicStore>> {
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
