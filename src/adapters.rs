//! Wiring from configuration to store connectors and task storage.

use std::sync::Arc;

use tracing::{debug, warn};

use relayq_config::{AppConfig, StorageCodec, StoreBackend};
use relayq_queue::RelayQueue;
use relayq_storage::{IdentityStorage, JsonStorage, PackedStorage, StorageAdapter};
use relayq_store::{MemoryStore, RedisConnector, StoreConnector};

/// Build the store connector for the configured backend.
pub(crate) fn build_connector(
    config: &AppConfig,
) -> Result<Arc<dyn StoreConnector>, Box<dyn std::error::Error>> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory store; queue state is lost when this process exits");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let url = config
                .store
                .url
                .as_deref()
                .ok_or("store.url is required for the redis backend")?;
            debug!("Using Redis store at {}", url);
            Ok(Arc::new(RedisConnector::new(url)?))
        }
    }
}

/// Build task storage for the configured codec.
pub(crate) async fn build_storage(
    config: &AppConfig,
    connector: &Arc<dyn StoreConnector>,
) -> Result<Arc<dyn StorageAdapter>, Box<dyn std::error::Error>> {
    let delimiter = config.queue.delimiter.clone();
    let storage: Arc<dyn StorageAdapter> = match config.storage.codec {
        StorageCodec::Identity => Arc::new(IdentityStorage::new(config.queue.id_field.clone())),
        StorageCodec::Json => Arc::new(JsonStorage::json(
            connector.connect().await?,
            config.storage_prefix(),
            delimiter,
        )),
        StorageCodec::Packed => Arc::new(PackedStorage::packed(
            connector.connect().await?,
            config.storage_prefix(),
            delimiter,
        )),
    };
    Ok(storage)
}

/// Connect a coordinator for `config`.
pub(crate) async fn connect_queue(
    config: &AppConfig,
) -> Result<Arc<RelayQueue>, Box<dyn std::error::Error>> {
    let connector = build_connector(config)?;
    let storage = build_storage(config, &connector).await?;
    let queue = RelayQueue::connect(config.queue.clone(), connector, storage).await?;
    Ok(Arc::new(queue))
}
