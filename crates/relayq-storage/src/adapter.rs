//! Storage adapters.
//!
//! An adapter maps a task ref to its record. The queue calls `set` before a
//! ref enters any queue and `del` after a clean finish or a remove.

use std::sync::Arc;

use async_trait::async_trait;
use relayq_store::AtomicStore;
use tracing::trace;

use crate::codec::{Codec, JsonCodec, PackedCodec};
use crate::error::StorageResult;
use crate::task::Task;

/// Maps task refs to task records.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Fetch the task for `task_ref`, or `None` if nothing is stored.
    async fn get(&self, task_ref: &str) -> StorageResult<Option<Task>>;

    /// Persist `task` under `task_ref`. Returns the ref.
    async fn set(&self, task: &Task, task_ref: &str) -> StorageResult<String>;

    /// Delete the task stored under `task_ref`. Returns the ref.
    async fn del(&self, task_ref: &str) -> StorageResult<String>;
}

/// Storage that persists nothing.
///
/// `get` rebuilds a task carrying only the id field set to the ref.
#[derive(Debug, Clone)]
pub struct IdentityStorage {
    id_field: String,
}

impl IdentityStorage {
    /// Create identity storage writing refs to `id_field`.
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
        }
    }
}

impl Default for IdentityStorage {
    fn default() -> Self {
        Self::new("id")
    }
}

#[async_trait]
impl StorageAdapter for IdentityStorage {
    async fn get(&self, task_ref: &str) -> StorageResult<Option<Task>> {
        let mut task = Task::new();
        task.set_id(&self.id_field, task_ref);
        Ok(Some(task))
    }

    async fn set(&self, _task: &Task, task_ref: &str) -> StorageResult<String> {
        Ok(task_ref.to_string())
    }

    async fn del(&self, task_ref: &str) -> StorageResult<String> {
        Ok(task_ref.to_string())
    }
}

/// Storage that encodes tasks with a [`Codec`] under `{prefix}{delimiter}{ref}`.
pub struct KeyedStorage<C> {
    store: Arc<dyn AtomicStore>,
    prefix: String,
    delimiter: String,
    codec: C,
}

/// JSON text storage.
pub type JsonStorage = KeyedStorage<JsonCodec>;

/// CBOR binary storage.
pub type PackedStorage = KeyedStorage<PackedCodec>;

impl<C: Codec> KeyedStorage<C> {
    /// Create keyed storage. Keys are `{prefix}{delimiter}{ref}`.
    pub fn new(
        store: Arc<dyn AtomicStore>,
        prefix: impl Into<String>,
        delimiter: impl Into<String>,
        codec: C,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            delimiter: delimiter.into(),
            codec,
        }
    }

    /// Storage key for a ref.
    pub fn key(&self, task_ref: &str) -> String {
        format!("{}{}{}", self.prefix, self.delimiter, task_ref)
    }
}

impl JsonStorage {
    /// JSON storage under `prefix`.
    pub fn json(
        store: Arc<dyn AtomicStore>,
        prefix: impl Into<String>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self::new(store, prefix, delimiter, JsonCodec)
    }
}

impl PackedStorage {
    /// Packed storage under `prefix`.
    pub fn packed(
        store: Arc<dyn AtomicStore>,
        prefix: impl Into<String>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self::new(store, prefix, delimiter, PackedCodec)
    }
}

#[async_trait]
impl<C: Codec> StorageAdapter for KeyedStorage<C> {
    async fn get(&self, task_ref: &str) -> StorageResult<Option<Task>> {
        let key = self.key(task_ref);
        match self.store.get(&key).await? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, task: &Task, task_ref: &str) -> StorageResult<String> {
        let bytes = self.codec.encode(task)?;
        let key = self.key(task_ref);
        trace!("Storing {} task at {} ({} bytes)", self.codec.name(), key, bytes.len());
        self.store.set(&key, &bytes).await?;
        Ok(task_ref.to_string())
    }

    async fn del(&self, task_ref: &str) -> StorageResult<String> {
        self.store.del(&self.key(task_ref)).await?;
        Ok(task_ref.to_string())
    }
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
