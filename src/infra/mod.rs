pub mod chromium;
pub mod fs_store;
pub mod http_store;
pub mod memory_store;
pub mod s3_store;
pub mod scripted_browser;

use crate::app::ports::{BlobStorePort, BrowserEnginePort};
use crate::config::{Config, StorageDestination};
use std::sync::Arc;
use tracing::info;

/// Picks the blob store matching the configured destination.
pub async fn blob_store_for(config: &Config) -> anyhow::Result<Arc<dyn BlobStorePort>> {
    let store: Arc<dyn BlobStorePort> = match config.storage()? {
        StorageDestination::S3 { bucket, prefix } => {
            Arc::new(s3_store::S3BlobStore::from_env(&bucket, &prefix).await)
        }
        StorageDestination::Http(base_url) => Arc::new(http_store::HttpBlobStore::new(
            &base_url,
            config.storage_token.clone(),
            config.delivery_timeout(),
        )?),
        StorageDestination::Filesystem(root) => Arc::new(fs_store::FsBlobStore::new(root)),
    };
    info!("Delivering to {}", store.describe());
    Ok(store)
}

pub fn chromium_engine(config: &Config) -> Arc<dyn BrowserEnginePort> {
    Arc::new(chromium::ChromiumEngine::new(chromium::ChromiumOptions {
        executable: config.chrome_executable.clone(),
        user_agent: config.user_agent.clone(),
    }))
}
