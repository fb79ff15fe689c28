use crate::app::ports::BlobStorePort;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

/// Object store reached over HTTP: each blob is a single
/// `PUT {base_url}/{key}`.
///
/// Works with Supabase Storage (`https://<ref>.supabase.co/storage/v1/object/<bucket>`)
/// and any S3-compatible endpoint that accepts bearer-token or pre-authorised
/// puts. The backend's single-object put is what makes delivery atomic.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl BlobStorePort for HttpBlobStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> anyhow::Result<()> {
        let url = self.object_url(key);
        let mut request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes.to_vec());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token).header("apikey", token.as_str());
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("object store responded {} - {}", status, body.trim());
        }
        debug!("PUT {} -> {}", url, status);
        Ok(())
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
