use crate::app::ports::{BrowserEnginePort, BrowserSessionPort};
use crate::common::constants::{SCREENSHOT_TIMEOUT_SECS, TERMINATE_TIMEOUT_SECS};
use crate::common::error::RenderError;
use crate::metrics::StageMetrics;
use crate::types::{ReadinessCondition, RenderRequest, RenderedDocument};
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Owns the browser lifecycle for one render call.
pub struct Renderer {
    engine: Arc<dyn BrowserEnginePort>,
    terminate_timeout: Duration,
}

impl Renderer {
    pub fn new(engine: Arc<dyn BrowserEnginePort>) -> Self {
        Self {
            engine,
            terminate_timeout: Duration::from_secs(TERMINATE_TIMEOUT_SECS),
        }
    }

    /// Bound on waiting for a session to terminate.
    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    /// Launches a session, drives it to the readiness condition and returns
    /// the rendered markup. The session is terminated before this returns on
    /// every path, waiting at most the terminate timeout; if the returned
    /// future is dropped mid-flight the guard terminates it in the background
    /// instead.
    #[instrument(skip(self, request), fields(url = %request.target_url, readiness = %request.readiness))]
    pub async fn render(&self, request: &RenderRequest) -> Result<RenderedDocument, RenderError> {
        let session = self
            .engine
            .launch()
            .await
            .map_err(|e| RenderError::Launch(format!("{e:#}")))?;
        let guard = SessionGuard::new(session, self.terminate_timeout);
        info!("Browser session launched");

        let outcome = Self::drive(guard.session(), request).await;
        guard.terminate().await;

        match &outcome {
            Ok(doc) => info!("Rendered document captured ({} bytes)", doc.len()),
            Err(e) => warn!("Render failed: {}", e),
        }
        outcome
    }

    async fn drive(
        session: &dyn BrowserSessionPort,
        request: &RenderRequest,
    ) -> Result<RenderedDocument, RenderError> {
        if let ReadinessCondition::SettleDelay(delay) = &request.readiness {
            warn!(
                "No structural readiness condition; falling back to a fixed {}ms settle delay",
                delay.as_millis()
            );
        }

        let budget = request.timeout;
        let waited = tokio::time::timeout(budget, async {
            session
                .navigate(&request.target_url)
                .await
                .map_err(|e| RenderError::Navigation {
                    url: request.target_url.clone(),
                    message: format!("{e:#}"),
                })?;
            debug!("Navigation finished, waiting for readiness");
            Self::await_readiness(session, request).await
        })
        .await;

        let markup = match waited {
            Ok(result) => result?,
            Err(_) => {
                StageMetrics::record_render_timeout();
                return Err(RenderError::Timeout {
                    condition: request.readiness.to_string(),
                    budget,
                });
            }
        };

        if let Some(path) = &request.screenshot_path {
            capture_screenshot(session, path).await;
        }

        Ok(RenderedDocument::new(markup))
    }

    /// Resolves with the first document that satisfies the condition. Never
    /// returns on its own while the condition is unmet; the caller bounds it.
    async fn await_readiness(
        session: &dyn BrowserSessionPort,
        request: &RenderRequest,
    ) -> Result<String, RenderError> {
        match &request.readiness {
            ReadinessCondition::SettleDelay(delay) => {
                tokio::time::sleep(*delay).await;
                read_document(session).await
            }
            ReadinessCondition::SelectorPresent(css) => {
                let selector = Selector::parse(css).map_err(|e| {
                    RenderError::Document(format!("invalid readiness selector '{css}': {e}"))
                })?;
                let mut polls = 0usize;
                loop {
                    let markup = read_document(session).await?;
                    polls += 1;
                    if document_matches(&markup, &selector) {
                        debug!("Readiness condition met after {} poll(s)", polls);
                        return Ok(markup);
                    }
                    tokio::time::sleep(request.poll_interval).await;
                }
            }
        }
    }
}

async fn read_document(session: &dyn BrowserSessionPort) -> Result<String, RenderError> {
    session
        .current_document()
        .await
        .map_err(|e| RenderError::Document(format!("{e:#}")))
}

fn document_matches(markup: &str, selector: &Selector) -> bool {
    Html::parse_document(markup).select(selector).next().is_some()
}

async fn capture_screenshot(session: &dyn BrowserSessionPort, path: &std::path::Path) {
    let budget = Duration::from_secs(SCREENSHOT_TIMEOUT_SECS);
    match tokio::time::timeout(budget, session.screenshot(path)).await {
        Ok(Ok(())) => info!("Saved diagnostic screenshot to {}", path.display()),
        Ok(Err(e)) => warn!("Screenshot to {} failed: {:#}", path.display(), e),
        Err(_) => warn!("Screenshot to {} timed out after {}s", path.display(), SCREENSHOT_TIMEOUT_SECS),
    }
}

/// Guard for a browser session.
///
/// `terminate` is the normal path and is awaited by the renderer. If the guard
/// is dropped while still holding the session (the render future was
/// cancelled or panicked), `Drop` spawns the termination on the runtime the
/// guard was created on. Both paths give up after `budget`, dropping the
/// session.
struct SessionGuard {
    session: Option<Box<dyn BrowserSessionPort>>,
    runtime: Option<tokio::runtime::Handle>,
    budget: Duration,
}

impl SessionGuard {
    fn new(session: Box<dyn BrowserSessionPort>, budget: Duration) -> Self {
        Self {
            session: Some(session),
            runtime: tokio::runtime::Handle::try_current().ok(),
            budget,
        }
    }

    fn session(&self) -> &dyn BrowserSessionPort {
        self.session
            .as_deref()
            .expect("SessionGuard: session already terminated")
    }

    async fn terminate(mut self) {
        if let Some(session) = self.session.take() {
            terminate_within(session, self.budget).await;
        }
    }
}

async fn terminate_within(mut session: Box<dyn BrowserSessionPort>, budget: Duration) {
    match tokio::time::timeout(budget, session.terminate()).await {
        Ok(Ok(())) => debug!("Browser session terminated"),
        Ok(Err(e)) => warn!("Browser termination reported an error: {:#}", e),
        Err(_) => warn!("Browser termination did not finish within {:?}; abandoning session", budget),
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match &self.runtime {
            Some(handle) => {
                handle.spawn(terminate_within(session, self.budget));
            }
            None => warn!("No runtime available to terminate an abandoned browser session"),
        }
    }
}
