use crate::app::ports::{BrowserEnginePort, BrowserSessionPort};
use crate::common::constants::{BROWSER_CLOSE_TIMEOUT_SECS, WINDOW_HEIGHT, WINDOW_WIDTH};
use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Launch options for headless Chrome.
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub executable: Option<PathBuf>,
    pub user_agent: String,
}

/// Headless Chrome over the DevTools protocol.
pub struct ChromiumEngine {
    options: ChromiumOptions,
}

impl ChromiumEngine {
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }

    fn browser_config(&self) -> anyhow::Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", self.options.user_agent));
        if let Some(path) = &self.options.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(|e| anyhow::anyhow!(e))
    }
}

#[async_trait]
impl BrowserEnginePort for ChromiumEngine {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSessionPort>> {
        let config = self.browser_config()?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .context("launching headless chrome")?;

        // The CDP handler must be polled for the browser to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
            debug!("CDP handler finished");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                // No session owns this process yet.
                if let Err(cleanup_err) = shut_down(&mut browser).await {
                    warn!("Browser cleanup after failed page creation: {:#}", cleanup_err);
                }
                handler_task.abort();
                return Err(anyhow::anyhow!(e).context("opening browser page"));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
        }))
    }
}

/// Closes the browser over CDP, falling back to killing the process when the
/// close fails or does not finish within the budget. Reaping is bounded too.
async fn shut_down(browser: &mut Browser) -> anyhow::Result<()> {
    let budget = Duration::from_secs(BROWSER_CLOSE_TIMEOUT_SECS);
    let closed = match tokio::time::timeout(budget, browser.close()).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(anyhow::anyhow!(e).context("closing headless chrome")),
        Err(_) => Err(anyhow::anyhow!("closing headless chrome timed out after {:?}", budget)),
    };
    if let Err(e) = &closed {
        warn!("{:#}; killing the browser process", e);
        if let Some(Err(kill_err)) = browser.kill().await {
            warn!("Killing chrome failed: {}", kill_err);
        }
    }
    match tokio::time::timeout(budget, browser.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Waiting for chrome to exit failed: {}", e),
        Err(_) => warn!("Chrome did not exit within {:?}", budget),
    }
    closed
}

struct ChromiumSession {
    // Taken by terminate.
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSessionPort for ChromiumSession {
    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.page.goto(url).await.context("page navigation")?;
        Ok(())
    }

    async fn current_document(&self) -> anyhow::Result<String> {
        Ok(self.page.content().await?)
    }

    async fn screenshot(&self, path: &Path) -> anyhow::Result<()> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page.save_screenshot(params, path).await?;
        Ok(())
    }

    async fn terminate(&mut self) -> anyhow::Result<()> {
        let Some(mut browser) = self.browser.get_mut().take() else {
            return Ok(());
        };
        let closed = shut_down(&mut browser).await;
        self.handler_task.abort();
        closed
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
