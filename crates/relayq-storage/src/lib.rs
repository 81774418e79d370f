//! # relayq storage
//!
//! Task records and the adapters that persist them.
//!
//! The queue only ever moves refs around; adapters map a ref to the task
//! record it names. Pick one at construction time:
//!
//! - [`IdentityStorage`]: no persistence, the ref is the whole task
//! - [`JsonStorage`]: JSON text under a namespaced key
//! - [`PackedStorage`]: CBOR binary under a namespaced key

pub mod adapter;
pub mod codec;
pub mod error;
pub mod task;

pub use adapter::{IdentityStorage, JsonStorage, KeyedStorage, PackedStorage, StorageAdapter};
pub use codec::{Codec, JsonCodec, PackedCodec};
pub use error::{StorageError, StorageResult};
pub use task::Task;
