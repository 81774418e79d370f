//! Redis atomic store.
//!
//! Lists map onto Redis lists (`RPUSH`/`LMOVE`/`BLMOVE`/`LREM`), time-scored
//! sets onto sorted sets, and the key-value space onto plain string keys.
//! Compound operations run as Lua scripts so each stays a single atomic step.
//!
//! # Key Schema
//!
//! | Key | Type | Purpose |
//! |-----|------|---------|
//! | `{prefix}:todo` etc. | List | queue membership |
//! | `{prefix}:deferred` | Sorted Set | deferred refs scored by due time |
//! | `{prefix}:recurring` | Sorted Set | recurring refs scored by next fire |
//! | `{prefix}:recurring{delimiter}intervals` | Hash | ref → interval in ms |
//! | `{prefix}:jobs:{ref}` | String | encoded task record |

use std::sync::Arc;
use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, Script};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{AtomicStore, StoreConnector};

/// Longest single BLMOVE wait.
const MAX_BLOCK: Duration = Duration::from_millis(400);

/// Remove `ARGV[1]` from list `KEYS[1]` and append it to `KEYS[2]`.
/// Returns the count moved.
const LUA_MOVE_ITEM: &str = r#"
local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
if removed > 0 then
    redis.call('RPUSH', KEYS[2], ARGV[1])
end
return removed
"#;

/// Drain members of sorted set `KEYS[1]` scored <= `ARGV[1]` into list `KEYS[2]`.
/// Returns the members moved.
const LUA_DRAIN_DUE: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, member in ipairs(due) do
    redis.call('ZREM', KEYS[1], member)
    redis.call('RPUSH', KEYS[2], member)
end
return due
"#;

/// Remove `ARGV[1]` from sorted set `KEYS[1]`; if present, append it to list `KEYS[2]`.
const LUA_TRANSFER_MEMBER: &str = r#"
local removed = redis.call('ZREM', KEYS[1], ARGV[1])
if removed > 0 then
    redis.call('RPUSH', KEYS[2], ARGV[1])
end
return removed
"#;

/// KEYS[1] = recurring set, KEYS[2] = interval hash.
/// ARGV[1] = member, ARGV[2] = interval ms, ARGV[3] = first fire score.
const LUA_SCHEDULE_RECURRING: &str = r#"
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
redis.call('ZADD', KEYS[1], ARGV[3], ARGV[1])
return 1
"#;

/// KEYS[1] = recurring set, KEYS[2] = interval hash. ARGV[1] = member.
const LUA_UNSCHEDULE_RECURRING: &str = r#"
redis.call('HDEL', KEYS[2], ARGV[1])
return redis.call('ZREM', KEYS[1], ARGV[1])
"#;

/// KEYS[1] = recurring set, KEYS[2] = interval hash, KEYS[3] = destination list.
/// ARGV[1] = now. Promotes every due member and reschedules it at now + interval.
/// Scores are doubles, so fire times clamp at 2^53 - 1.
const LUA_PROMOTE_RECURRING: &str = r#"
local max_fire = 9007199254740991
local now = tonumber(ARGV[1])
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', now)
for _, member in ipairs(due) do
    redis.call('RPUSH', KEYS[3], member)
    local interval = redis.call('HGET', KEYS[2], member)
    if interval then
        redis.call('ZADD', KEYS[1], math.min(now + tonumber(interval), max_fire), member)
    else
        redis.call('ZREM', KEYS[1], member)
    end
end
return due
"#;

/// Redis-backed atomic store.
///
/// Holds a [`MultiplexedConnection`] for ordinary commands. Blocking claims
/// run on a second connection, opened on first use and kept for the life of
/// the store, so they never hold up the shared one. Concurrent blocking
/// claims on one store share that connection and wait their turn; a
/// connection that fails is dropped and reopened by the next claim.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: MultiplexedConnection,
    blocking: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl RedisStore {
    /// Connect to Redis at `url` (`redis://[:<password>@]<host>:<port>[/<db>]`).
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Connection(format!("failed to create Redis client: {}", e)))?;
        Self::from_client(client).await
    }

    /// Build a store from an existing client.
    pub async fn from_client(client: Client) -> StoreResult<Self> {
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(format!("failed to connect to Redis: {}", e)))?;
        Ok(Self {
            client,
            conn,
            blocking: Arc::new(Mutex::new(None)),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    /// The connection used for blocking claims, opened on first use.
    async fn blocking_conn(&self) -> StoreResult<MultiplexedConnection> {
        let cached = self.blocking.lock().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        debug!("Opened blocking Redis connection");
        // Another claim may have opened one meanwhile; keep the first.
        Ok(self.blocking.lock().get_or_insert(conn).clone())
    }
}

#[async_trait]
impl AtomicStore for RedisStore {
    async fn push(&self, queue: &str, item: &str) -> StoreResult<()> {
        let _: i64 = ::redis::cmd("RPUSH")
            .arg(queue)
            .arg(item)
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn pop_transfer(&self, src: &str, dst: &str) -> StoreResult<Option<String>> {
        let item: Option<String> = ::redis::cmd("LMOVE")
            .arg(src)
            .arg(dst)
            .arg("LEFT")
            .arg("RIGHT")
            .query_async(&mut self.conn())
            .await?;
        Ok(item)
    }

    async fn bpop_transfer(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        let mut blocking = self.blocking_conn().await?;
        let deadline = (!timeout.is_zero()).then(|| tokio::time::Instant::now() + timeout);

        // Each BLMOVE must return before the connection's response timeout,
        // so long waits are issued as a series of short ones.
        loop {
            let wait = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(tokio::time::Instant::now());
                    if left.is_zero() {
                        return Ok(None);
                    }
                    left.min(MAX_BLOCK)
                }
                None => MAX_BLOCK,
            };
            let item: Option<String> = match ::redis::cmd("BLMOVE")
                .arg(src)
                .arg(dst)
                .arg("LEFT")
                .arg("RIGHT")
                .arg(wait.as_secs_f64())
                .query_async(&mut blocking)
                .await
            {
                Ok(item) => item,
                Err(e) => {
                    self.blocking.lock().take();
                    return Err(e.into());
                }
            };
            if item.is_some() {
                return Ok(item);
            }
        }
    }

    async fn pull(&self, queue: &str, item: &str) -> StoreResult<u64> {
        let removed: u64 = ::redis::cmd("LREM")
            .arg(queue)
            .arg(1)
            .arg(item)
            .query_async(&mut self.conn())
            .await?;
        Ok(removed)
    }

    async fn move_item(&self, src: &str, dst: &str, item: &str) -> StoreResult<u64> {
        let moved: u64 = Script::new(LUA_MOVE_ITEM)
            .key(src)
            .key(dst)
            .arg(item)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(moved)
    }

    async fn len(&self, queue: &str) -> StoreResult<u64> {
        let len: u64 = ::redis::cmd("LLEN")
            .arg(queue)
            .query_async(&mut self.conn())
            .await?;
        Ok(len)
    }

    async fn range(&self, queue: &str) -> StoreResult<Vec<String>> {
        let items: Vec<String> = ::redis::cmd("LRANGE")
            .arg(queue)
            .arg(0)
            .arg(-1)
            .query_async(&mut self.conn())
            .await?;
        Ok(items)
    }

    async fn zadd(&self, set: &str, member: &str, score: i64) -> StoreResult<()> {
        let _: i64 = ::redis::cmd("ZADD")
            .arg(set)
            .arg(score)
            .arg(member)
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn zrem(&self, set: &str, member: &str) -> StoreResult<u64> {
        let removed: u64 = ::redis::cmd("ZREM")
            .arg(set)
            .arg(member)
            .query_async(&mut self.conn())
            .await?;
        Ok(removed)
    }

    async fn zscore(&self, set: &str, member: &str) -> StoreResult<Option<i64>> {
        let score: Option<f64> = ::redis::cmd("ZSCORE")
            .arg(set)
            .arg(member)
            .query_async(&mut self.conn())
            .await?;
        Ok(score.map(|s| s as i64))
    }

    async fn zcard(&self, set: &str) -> StoreResult<u64> {
        let card: u64 = ::redis::cmd("ZCARD")
            .arg(set)
            .query_async(&mut self.conn())
            .await?;
        Ok(card)
    }

    async fn drain_due(&self, set: &str, threshold: i64, dst: &str) -> StoreResult<Vec<String>> {
        let due: Vec<String> = Script::new(LUA_DRAIN_DUE)
            .key(set)
            .key(dst)
            .arg(threshold)
            .invoke_async(&mut self.conn())
            .await?;
        if !due.is_empty() {
            debug!("Drained {} due member(s) from {} into {}", due.len(), set, dst);
        }
        Ok(due)
    }

    async fn transfer_member(&self, set: &str, member: &str, dst: &str) -> StoreResult<u64> {
        let moved: u64 = Script::new(LUA_TRANSFER_MEMBER)
            .key(set)
            .key(dst)
            .arg(member)
            .invoke_async(&mut self.conn())
            .await?;
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
        let _: i64 = Script::new(LUA_SCHEDULE_RECURRING)
            .key(set)
            .key(intervals)
            .arg(member)
            .arg(interval_ms)
            .arg(first_fire)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn unschedule_recurring(
        &self,
        set: &str,
        intervals: &str,
        member: &str,
    ) -> StoreResult<u64> {
        let removed: u64 = Script::new(LUA_UNSCHEDULE_RECURRING)
            .key(set)
            .key(intervals)
            .arg(member)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(removed)
    }

    async fn promote_recurring(
        &self,
        set: &str,
        intervals: &str,
        now: i64,
        dst: &str,
    ) -> StoreResult<Vec<String>> {
        let due: Vec<String> = Script::new(LUA_PROMOTE_RECURRING)
            .key(set)
            .key(intervals)
            .key(dst)
            .arg(now)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(due)
    }

    async fn recurring_interval(&self, intervals: &str, member: &str) -> StoreResult<Option<i64>> {
        let interval: Option<i64> = ::redis::cmd("HGET")
            .arg(intervals)
            .arg(member)
            .query_async(&mut self.conn())
            .await?;
        Ok(interval)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = ::redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn())
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let _: () = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<u64> {
        let removed: u64 = ::redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn())
            .await?;
        Ok(removed)
    }
}

/// Opens a fresh [`RedisStore`] per [`connect`](StoreConnector::connect) call.
#[derive(Clone)]
pub struct RedisConnector {
    client: Client,
}

impl RedisConnector {
    /// Create a connector for `url`.
    pub fn new(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Connection(format!("failed to create Redis client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    async fn connect(&self) -> StoreResult<Arc<dyn AtomicStore>> {
        let store = RedisStore::from_client(self.client.clone()).await?;
        Ok(Arc::new(store))
    }
}

#[cfg(all(test, feature = "redis-tests"))]
#[path = "redis_tests.rs"]
mod tests;
