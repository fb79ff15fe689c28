use crate::app::coordinator::Coordinator;
use crate::app::ports::{BlobStorePort, BrowserEnginePort};
use crate::common::error::{ConfigError, Result};
use crate::config::{Config, InvocationOptions};
use crate::infra::blob_store_for;
use crate::types::PipelineResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Handler-style response: `{"statusCode": 200|500, "body": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl From<&PipelineResult> for InvocationResponse {
    fn from(result: &PipelineResult) -> Self {
        Self {
            status_code: result.status_code(),
            body: result.message().to_string(),
        }
    }
}

impl InvocationResponse {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            status_code: crate::common::constants::STATUS_FAILED,
            body: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == crate::common::constants::STATUS_OK
    }
}

/// Browser and storage used for runs. A missing store means "build one from
/// the run's `storage_destination`".
#[derive(Clone)]
pub struct Capabilities {
    pub engine: Arc<dyn BrowserEnginePort>,
    pub store: Option<Arc<dyn BlobStorePort>>,
}

impl Capabilities {
    pub fn new(engine: Arc<dyn BrowserEnginePort>) -> Self {
        Self { engine, store: None }
    }

    pub fn with_store(mut self, store: Arc<dyn BlobStorePort>) -> Self {
        self.store = Some(store);
        self
    }
}

/// Validates `config`, wires a fresh coordinator and runs it once.
pub async fn run_once(config: &Config, caps: &Capabilities) -> Result<PipelineResult> {
    config.validate()?;
    let store = match &caps.store {
        Some(store) => store.clone(),
        None => blob_store_for(config).await.map_err(|e| ConfigError::Invalid {
            field: "storage_destination",
            reason: format!("{e:#}"),
        })?,
    };
    let coordinator = Coordinator::from_config(config, caps.engine.clone(), store)?;
    Ok(coordinator.run().await)
}

/// Parses the per-run overrides carried by an invocation event. `null` means
/// no overrides; unknown keys are ignored.
pub fn invocation_options(event: &serde_json::Value) -> Result<InvocationOptions> {
    if event.is_null() {
        return Ok(InvocationOptions::default());
    }
    Ok(serde_json::from_value(event.clone())?)
}

/// Entry point for a single triggered run. Never fails: configuration and
/// pipeline failures alike come back as a 500 response.
pub async fn handle_invocation(
    base: &Config,
    event: &serde_json::Value,
    caps: &Capabilities,
) -> InvocationResponse {
    let options = match invocation_options(event) {
        Ok(options) => options,
        Err(e) => {
            warn!("Rejected invocation event: {}", e);
            return InvocationResponse::failed(format!("Invalid invocation event: {e}"));
        }
    };

    let mut config = base.clone();
    config.apply_overrides(&options);

    match run_once(&config, caps).await {
        Ok(result) => InvocationResponse::from(&result),
        Err(e) => {
            error!("Run could not start: {}", e);
            InvocationResponse::failed(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub runs: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Runs the pipeline every `every` until Ctrl-C or `max_runs` is reached.
pub async fn schedule(
    config: &Config,
    caps: &Capabilities,
    every: Duration,
    max_runs: Option<u64>,
) -> ScheduleSummary {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };
    schedule_until(config, caps, every, max_runs, shutdown).await
}

/// Like [`schedule`], stopping when `shutdown` resolves. A run already in
/// progress is finished first.
pub async fn schedule_until<F>(
    config: &Config,
    caps: &Capabilities,
    every: Duration,
    max_runs: Option<u64>,
    shutdown: F,
) -> ScheduleSummary
where
    F: Future<Output = ()>,
{
    let mut summary = ScheduleSummary::default();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    while max_runs.map_or(true, |max| summary.runs < max) {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping schedule");
                break;
            }
            _ = ticker.tick() => {}
        }

        let response = handle_invocation(config, &serde_json::Value::Null, caps).await;
        summary.runs += 1;
        if response.is_success() {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
        info!(
            runs = summary.runs,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Scheduled run finished with status {}",
            response.status_code
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory_store::InMemoryBlobStore;
    use crate::infra::scripted_browser::ScriptedBrowser;
    use serde_json::json;

    const PAGE: &str = r#"<table class="stats"><tr><th>Team</th></tr><tr><td>Denver</td></tr></table>"#;

    fn config() -> Config {
        Config {
            target_url: "https://example.test/stats".to_string(),
            table_class: "stats".to_string(),
            poll_interval_millis: 10,
            ..Config::default()
        }
    }

    fn caps(store: Arc<InMemoryBlobStore>) -> Capabilities {
        Capabilities::new(Arc::new(ScriptedBrowser::serving(PAGE))).with_store(store)
    }

    #[test]
    fn test_response_serializes_status_code_key() {
        let response = InvocationResponse {
            status_code: 200,
            body: "done".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"statusCode": 200, "body": "done"})
        );
    }

    #[test]
    fn test_event_options_ignore_unknown_keys() {
        let options = invocation_options(&json!({
            "render_timeout_seconds": 9,
            "source": "aws.events"
        }))
        .unwrap();
        assert_eq!(options.render_timeout_seconds, Some(9));
        assert_eq!(options.target_url, None);
        assert!(invocation_options(&json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn test_invocation_success_is_200() {
        let store = Arc::new(InMemoryBlobStore::new());
        let response = handle_invocation(&config(), &json!({}), &caps(store.clone())).await;

        assert_eq!(response.status_code, 200, "{}", response.body);
        assert_eq!(store.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_override_is_500_without_running() {
        let store = Arc::new(InMemoryBlobStore::new());
        let browser = ScriptedBrowser::serving(PAGE);
        let stats = browser.stats();
        let caps = Capabilities::new(Arc::new(browser)).with_store(store.clone());

        let response =
            handle_invocation(&config(), &json!({"render_timeout_seconds": 0}), &caps).await;

        assert_eq!(response.status_code, 500);
        assert!(response.body.contains("render_timeout_seconds"));
        assert_eq!(stats.launched(), 0);
        assert_eq!(store.put_attempts(), 0);
    }

    #[tokio::test]
    async fn test_schedule_stops_after_max_runs() {
        let store = Arc::new(InMemoryBlobStore::new());
        let summary = schedule_until(
            &config(),
            &caps(store.clone()),
            Duration::from_millis(5),
            Some(2),
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(summary, ScheduleSummary { runs: 2, succeeded: 2, failed: 0 });
        assert_eq!(store.put_attempts(), 2);
    }

    #[tokio::test]
    async fn test_schedule_honours_shutdown() {
        let store = Arc::new(InMemoryBlobStore::new());
        let summary = schedule_until(
            &config(),
            &caps(store.clone()),
            Duration::from_millis(5),
            None,
            std::future::ready(()),
        )
        .await;

        assert_eq!(summary.runs, 0);
        assert_eq!(store.put_attempts(), 0);
    }
}
