use async_trait::async_trait;
use std::path::Path;

// Render-side ports

/// Launches browser sessions. One session per render call.
#[async_trait]
pub trait BrowserEnginePort: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSessionPort>>;
}

/// A live browser process with a single page.
#[async_trait]
pub trait BrowserSessionPort: Send + Sync {
    async fn navigate(&self, url: &str) -> anyhow::Result<()>;

    /// Serialized markup of the page as currently rendered.
    async fn current_document(&self) -> anyhow::Result<String>;

    async fn screenshot(&self, path: &Path) -> anyhow::Result<()>;

    /// Ends the browser process. Called exactly once per session.
    async fn terminate(&mut self) -> anyhow::Result<()>;
}

// Delivery-side ports

#[async_trait]
pub trait BlobStorePort: Send + Sync {
    /// Stores `bytes` under `key` in a single write: readers either see the
    /// whole blob or nothing.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> anyhow::Result<()>;

    /// Human-readable destination, used in messages and logs.
    fn describe(&self) -> String;
}
