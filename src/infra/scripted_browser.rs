use crate::app::ports::{BrowserEnginePort, BrowserSessionPort};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Lifecycle counters shared between a [`ScriptedBrowser`] and its sessions.
#[derive(Debug, Default)]
pub struct SessionStats {
    launched: AtomicUsize,
    terminated: AtomicUsize,
    document_reads: AtomicUsize,
}

impl SessionStats {
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn document_reads(&self) -> usize {
        self.document_reads.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
enum NavigationBehavior {
    Succeed,
    Fail(String),
    Stall,
}

/// Browser engine that serves prepared markup instead of driving Chrome.
///
/// Backs the `--replay` mode of the CLI (re-running extraction and delivery
/// against a saved page) and the render tests. Successive document reads walk
/// through `frames`; the last frame repeats forever, which lets a test model a
/// page that finishes rendering after a few polls or never at all.
#[derive(Debug, Clone)]
pub struct ScriptedBrowser {
    frames: Arc<Vec<String>>,
    navigation: NavigationBehavior,
    launch_error: Option<String>,
    hang_on_terminate: bool,
    stats: Arc<SessionStats>,
}

impl ScriptedBrowser {
    pub fn serving(markup: impl Into<String>) -> Self {
        Self::with_frames(vec![markup.into()])
    }

    pub fn with_frames(frames: Vec<String>) -> Self {
        Self {
            frames: Arc::new(frames),
            navigation: NavigationBehavior::Succeed,
            launch_error: None,
            hang_on_terminate: false,
            stats: Arc::new(SessionStats::default()),
        }
    }

    pub fn failing_navigation(mut self, message: impl Into<String>) -> Self {
        self.navigation = NavigationBehavior::Fail(message.into());
        self
    }

    /// Navigation never completes; only a timeout or cancellation ends it.
    pub fn stalling_navigation(mut self) -> Self {
        self.navigation = NavigationBehavior::Stall;
        self
    }

    /// Termination is counted, then never completes.
    pub fn stalling_termination(mut self) -> Self {
        self.hang_on_terminate = true;
        self
    }

    pub fn failing_launch(mut self, message: impl Into<String>) -> Self {
        self.launch_error = Some(message.into());
        self
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl BrowserEnginePort for ScriptedBrowser {
    async fn launch(&self) -> anyhow::Result<Box<dyn BrowserSessionPort>> {
        if let Some(message) = &self.launch_error {
            return Err(anyhow::anyhow!(message.clone()));
        }
        self.stats.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            frames: self.frames.clone(),
            navigation: self.navigation.clone(),
            hang_on_terminate: self.hang_on_terminate,
            stats: self.stats.clone(),
        }))
    }
}

struct ScriptedSession {
    frames: Arc<Vec<String>>,
    navigation: NavigationBehavior,
    hang_on_terminate: bool,
    stats: Arc<SessionStats>,
}

#[async_trait]
impl BrowserSessionPort for ScriptedSession {
    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        debug!("scripted navigation to {}", url);
        match &self.navigation {
            NavigationBehavior::Succeed => Ok(()),
            NavigationBehavior::Fail(message) => Err(anyhow::anyhow!(message.clone())),
            NavigationBehavior::Stall => std::future::pending().await,
        }
    }

    async fn current_document(&self) -> anyhow::Result<String> {
        let read = self.stats.document_reads.fetch_add(1, Ordering::SeqCst);
        let index = read.min(self.frames.len().saturating_sub(1));
        Ok(self.frames.get(index).cloned().unwrap_or_default())
    }

    async fn screenshot(&self, _path: &Path) -> anyhow::Result<()> {
        anyhow::bail!("scripted pages have no render surface to capture")
    }

    async fn terminate(&mut self) -> anyhow::Result<()> {
        self.stats.terminated.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_terminate {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}
