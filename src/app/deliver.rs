use crate::app::ports::BlobStorePort;
use crate::common::constants::{CSV_EXTENSION, KEY_TIMESTAMP_FORMAT};
use crate::common::error::DeliveryError;
use crate::types::{DeliveryArtifact, DeliveryReceipt};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Hands encoded artifacts to the blob store. One put per artifact, no
/// retries; the caller decides what to do with a failure.
pub struct Deliverer {
    store: Arc<dyn BlobStorePort>,
    timeout: Duration,
}

impl Deliverer {
    pub fn new(store: Arc<dyn BlobStorePort>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    #[instrument(skip_all, fields(key = %artifact.key, bytes = artifact.payload.len()))]
    pub async fn deliver(&self, artifact: DeliveryArtifact) -> Result<DeliveryReceipt, DeliveryError> {
        let destination = self.store.describe();
        let DeliveryArtifact {
            payload,
            key,
            content_type,
        } = artifact;

        let put = self.store.put(&key, &payload, content_type);
        match tokio::time::timeout(self.timeout, put).await {
            Ok(Ok(())) => {
                let receipt = DeliveryReceipt {
                    location: format!("{}/{}", destination.trim_end_matches('/'), key),
                    bytes: payload.len(),
                    sha256: hex::encode(Sha256::digest(&payload)),
                    key,
                };
                info!("Delivered {} bytes to {}", receipt.bytes, receipt.location);
                Ok(receipt)
            }
            Ok(Err(e)) => {
                warn!("Delivery to {} failed: {:#}", destination, e);
                Err(DeliveryError::Write {
                    key,
                    destination,
                    message: format!("{e:#}"),
                })
            }
            Err(_) => {
                warn!("Delivery to {} timed out after {:?}", destination, self.timeout);
                Err(DeliveryError::Timeout {
                    key,
                    destination,
                    budget: self.timeout,
                })
            }
        }
    }
}

/// `<prefix><YYYYMMDD_HHMMSS>.csv`. Two runs in the same second produce the
/// same key and the later write replaces the earlier one.
pub fn destination_key(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}{}.{}", prefix, at.format(KEY_TIMESTAMP_FORMAT), CSV_EXTENSION)
}
