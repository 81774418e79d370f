//! # relayq store
//!
//! Atomic primitives the relayq queue coordinator is built on.
//!
//! ## Features
//!
//! - FIFO lists with atomic pop-and-transfer and move-by-value
//! - Time-scored sets that drain due members into a list in one operation
//! - Recurring sets that promote and reschedule in one operation
//! - A byte key-value space used by keyed task storage
//! - In-memory backend (default) and Redis backend (`redis` feature)

pub mod clock;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod store;
pub mod subscription;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::{RedisConnector, RedisStore};
pub use store::{AtomicStore, StoreConnector};
pub use subscription::Subscription;
