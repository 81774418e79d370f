//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

pub use relayq_queue::{FinishMode, ListenerConfig, QueueConfig, SweepConfig};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Key prefix for keyed task storage.
    pub fn storage_prefix(&self) -> String {
        self.storage
            .prefix
            .clone()
            .unwrap_or_else(|| self.queue.storage_prefix())
    }
}

/// Store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store. Only useful within a single process.
    #[default]
    Memory,
    /// Redis server.
    Redis,
}

/// Store connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`.
    #[serde(default)]
    pub url: Option<String>,
}

/// Task storage encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageCodec {
    /// Nothing stored; the ref is the task.
    #[default]
    Identity,
    /// JSON text.
    Json,
    /// CBOR binary.
    Packed,
}

/// Task storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub codec: StorageCodec,

    /// Key prefix. Defaults to `{queue.prefix}{queue.delimiter}jobs`.
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
