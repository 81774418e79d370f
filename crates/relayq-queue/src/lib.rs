//! # relayq queue
//!
//! A reliable, at-least-once task queue on top of an atomic store.
//!
//! ## Lifecycle
//!
//! ```text
//! push ──► todo ──claim──► doing ──finish──► done (dirty) / gone (clean)
//!           ▲                 └────fail────► failed ──finish──┘
//!           │
//!   deferred / recurring sweeps
//! ```
//!
//! Every move between queues is a single atomic store operation, so two
//! workers never claim the same ref and a ref is never lost between queues.
//!
//! ## Features
//!
//! - [`RelayQueue`]: push, claim, finish, fail, remove
//! - [`DeferredList`]: run a task at a future time
//! - [`RecurringList`]: run a task on a fixed interval
//! - [`Listener`]: continuous bounded-concurrency delivery to a [`TaskHandler`]

pub mod config;
pub mod deferred;
pub mod error;
pub mod listener;
pub mod queue;
pub mod recurring;
pub mod sweep;

pub use config::{FinishMode, ListenerConfig, QueueConfig, QueueName, SweepConfig};
pub use deferred::DeferredList;
pub use error::{ListenerError, QueueError, QueueResult};
pub use listener::{Completion, DROPPED_COMPLETION, Listener, TaskHandler};
pub use queue::{ERROR_FIELD, QueueCounts, RelayQueue};
pub use recurring::RecurringList;
pub use sweep::{Sweep, Sweeper};

pub use relayq_storage::Task;
