use crate::app::deliver::{destination_key, Deliverer};
use crate::app::encode::Encoder;
use crate::app::extract::Extractor;
use crate::app::ports::{BlobStorePort, BrowserEnginePort};
use crate::app::render::Renderer;
use crate::common::error::ExtractionError;
use crate::config::Config;
use crate::metrics::{time_stage, StageMetrics};
use crate::types::{DeliveryArtifact, PipelineResult, PipelineStatus, RenderRequest};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Coordinator states. Every run starts at `Idle` and ends in `Done` or
/// `Failed`; no state is entered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Rendering,
    Extracting,
    Encoding,
    Delivering,
    Done,
    Failed(PipelineStatus),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => f.write_str("idle"),
            Stage::Rendering => f.write_str("rendering"),
            Stage::Extracting => f.write_str("extracting"),
            Stage::Encoding => f.write_str("encoding"),
            Stage::Delivering => f.write_str("delivering"),
            Stage::Done => f.write_str("done"),
            Stage::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

/// Sequences render, extract, encode and deliver for a single run.
///
/// `run` consumes the coordinator, so a run cannot be restarted mid-flight;
/// build a fresh one per invocation.
pub struct Coordinator {
    renderer: Renderer,
    extractor: Extractor,
    deliverer: Deliverer,
    request: RenderRequest,
    key_prefix: String,
    stage: Stage,
}

impl Coordinator {
    pub fn new(
        renderer: Renderer,
        extractor: Extractor,
        deliverer: Deliverer,
        request: RenderRequest,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            renderer,
            extractor,
            deliverer,
            request,
            key_prefix: key_prefix.into(),
            stage: Stage::Idle,
        }
    }

    /// Wires a coordinator from validated config and the given capabilities.
    pub fn from_config(
        config: &Config,
        engine: Arc<dyn BrowserEnginePort>,
        store: Arc<dyn BlobStorePort>,
    ) -> Result<Self, ExtractionError> {
        Ok(Self::new(
            Renderer::new(engine),
            Extractor::for_class(&config.table_class)?,
            Deliverer::new(store, config.delivery_timeout()),
            config.render_request(),
            config.key_prefix.clone(),
        ))
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub async fn run(self) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, url = %self.request.target_url);
        self.execute().instrument(span).await
    }

    async fn execute(mut self) -> PipelineResult {
        let started = Instant::now();
        info!("Starting scrape of {}", self.request.target_url);

        let result = self.drive().await;

        let elapsed = started.elapsed().as_secs_f64();
        StageMetrics::record_run(result.status(), elapsed);
        if result.is_success() {
            info!("Run finished in {:.2}s: {}", elapsed, result.message());
        } else {
            error!("Run failed in {:.2}s: {}", elapsed, result.message());
        }
        result
    }

    async fn drive(&mut self) -> PipelineResult {
        self.transition(Stage::Rendering);
        let document = {
            let _timer = time_stage("render");
            let rendered = self.renderer.render(&self.request).await;
            match rendered {
                Ok(doc) => doc,
                Err(e) => {
                    return self.fail(PipelineStatus::RenderFailed, format!("Rendering failed: {e}"))
                }
            }
        };

        self.transition(Stage::Extracting);
        let record = {
            let _timer = time_stage("extract");
            let extracted = self.extractor.extract(document);
            match extracted {
                Ok(record) => record,
                Err(e) => {
                    return self.fail(
                        PipelineStatus::ExtractionFailed,
                        format!("Extraction failed: {e}"),
                    )
                }
            }
        };
        StageMetrics::record_rows_extracted(record.row_count());

        self.transition(Stage::Encoding);
        let payload = {
            let _timer = time_stage("encode");
            let encoded = Encoder::encode(&record);
            match encoded {
                Ok(payload) => payload,
                Err(e) => {
                    return self.fail(
                        PipelineStatus::ExtractionFailed,
                        format!("Encoding failed: {e}"),
                    )
                }
            }
        };
        StageMetrics::record_payload_bytes(payload.len());

        self.transition(Stage::Delivering);
        let key = destination_key(&self.key_prefix, Utc::now());
        let receipt = {
            let _timer = time_stage("deliver");
            let delivered = self.deliverer.deliver(DeliveryArtifact::csv(payload, key)).await;
            match delivered {
                Ok(receipt) => receipt,
                Err(e) => {
                    return self.fail(
                        PipelineStatus::DeliveryFailed,
                        format!("Delivery failed: {e}"),
                    )
                }
            }
        };

        self.transition(Stage::Done);
        PipelineResult::new(
            PipelineStatus::Success,
            format!(
                "Scraping completed successfully: {} rows delivered to {} (sha256 {})",
                record.row_count(),
                receipt.location,
                receipt.sha256
            ),
        )
    }

    fn transition(&mut self, next: Stage) {
        info!(from = %self.stage, to = %next, "Pipeline stage transition");
        self.stage = next;
    }

    fn fail(&mut self, kind: PipelineStatus, message: String) -> PipelineResult {
        self.transition(Stage::Failed(kind));
        PipelineResult::new(kind, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory_store::InMemoryBlobStore;
    use crate::infra::scripted_browser::ScriptedBrowser;
    use crate::types::ReadinessCondition;
    use std::time::Duration;

    const PAGE: &str = r#"<html><body>
        <table class="stats">
          <tr><th>Team</th><th>W</th></tr>
          <tr><td>Boston Celtics</td><td>64</td></tr>
        </table>
    </body></html>"#;

    fn coordinator(browser: ScriptedBrowser, store: Arc<InMemoryBlobStore>) -> Coordinator {
        Coordinator::new(
            Renderer::new(Arc::new(browser)),
            Extractor::for_class("stats").unwrap(),
            Deliverer::new(store, Duration::from_secs(1)),
            RenderRequest {
                target_url: "https://example.test/stats".to_string(),
                readiness: ReadinessCondition::SelectorPresent("table.stats".to_string()),
                timeout: Duration::from_millis(200),
                poll_interval: Duration::from_millis(10),
                screenshot_path: None,
            },
            "stats_",
        )
    }

    #[tokio::test]
    async fn test_success_names_row_count_and_location() {
        let store = Arc::new(InMemoryBlobStore::new());
        let coordinator = coordinator(ScriptedBrowser::serving(PAGE), store.clone());
        assert_eq!(coordinator.stage(), Stage::Idle);

        let result = coordinator.run().await;

        assert!(result.is_success(), "{}", result.message());
        assert!(result.message().contains("1 rows delivered to memory://blobs/stats_"));
        let keys = store.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("stats_") && keys[0].ends_with(".csv"));
    }

    #[tokio::test]
    async fn test_render_failure_skips_later_stages() {
        let store = Arc::new(InMemoryBlobStore::new());
        let browser = ScriptedBrowser::serving(PAGE).failing_navigation("net::ERR_CONNECTION_RESET");

        let result = coordinator(browser, store.clone()).run().await;

        assert_eq!(result.status(), PipelineStatus::RenderFailed);
        assert!(result.message().starts_with("Rendering failed:"));
        assert_eq!(store.put_attempts(), 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_stops_before_delivery() {
        let store = Arc::new(InMemoryBlobStore::new());
        let page = r#"<html><body><table class="stats"><tr><th>Team</th></tr></table></body></html>"#;

        let result = coordinator(ScriptedBrowser::serving(page), store.clone()).run().await;

        assert_eq!(result.status(), PipelineStatus::ExtractionFailed);
        assert!(result.message().starts_with("Extraction failed:"));
        assert_eq!(store.put_attempts(), 0);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Delivering.to_string(), "delivering");
        assert_eq!(
            Stage::Failed(PipelineStatus::DeliveryFailed).to_string(),
            "failed(delivery_failed)"
        );
    }
}
