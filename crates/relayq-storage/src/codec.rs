//! Task serialization strategies.

use crate::error::{StorageError, StorageResult};
use crate::task::Task;

/// Encodes tasks to bytes and back.
pub trait Codec: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Encode a task.
    fn encode(&self, task: &Task) -> StorageResult<Vec<u8>>;

    /// Decode a task.
    fn decode(&self, bytes: &[u8]) -> StorageResult<Task>;
}

/// JSON text encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, task: &Task) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(task).map_err(|e| StorageError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> StorageResult<Task> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::Decode(e.to_string()))
    }
}

/// Binary packed encoding (CBOR).
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedCodec;

impl Codec for PackedCodec {
    fn name(&self) -> &'static str {
        "packed"
    }

    fn encode(&self, task: &Task) -> StorageResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(task, &mut buf).map_err(|e| StorageError::Encode(e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> StorageResult<Task> {
        ciborium::from_reader(bytes).map_err(|e| StorageError::Decode(e.to_string()))
    }
}
