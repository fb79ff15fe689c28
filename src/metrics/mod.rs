//! Pipeline metrics.
//!
//! The library only emits through the `metrics` facade; nothing is recorded
//! unless the binary installs an exporter with [`init_metrics`].

pub mod core;

pub use self::core::{time_stage, TimingGuard};

use crate::types::PipelineStatus;
use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

pub const RUNS_TOTAL: &str = "scraper_runs_total";
pub const STAGE_DURATION: &str = "scraper_stage_duration_seconds";
pub const RUN_DURATION: &str = "scraper_run_duration_seconds";
pub const RENDER_TIMEOUTS_TOTAL: &str = "scraper_render_timeouts_total";
pub const ROWS_EXTRACTED: &str = "scraper_rows_extracted";
pub const ROWS_DROPPED_TOTAL: &str = "scraper_rows_dropped_total";
pub const PAYLOAD_BYTES: &str = "scraper_payload_bytes";

static INIT: Once = Once::new();

/// Installs the Prometheus exporter with an HTTP listener on `addr`.
/// Idempotent; must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
            Err(e) => warn!("Failed to install Prometheus exporter on {}: {}", addr, e),
        }
    });
}

/// Per-stage recording helpers, grouped so metric names live in one place.
pub struct StageMetrics;

impl StageMetrics {
    pub fn record_run(status: PipelineStatus, duration_secs: f64) {
        ::metrics::counter!(RUNS_TOTAL, "status" => status.as_str()).increment(1);
        ::metrics::histogram!(RUN_DURATION).record(duration_secs);
    }

    pub fn record_render_timeout() {
        ::metrics::counter!(RENDER_TIMEOUTS_TOTAL).increment(1);
    }

    pub fn record_rows_extracted(rows: usize) {
        ::metrics::histogram!(ROWS_EXTRACTED).record(rows as f64);
    }

    pub fn record_rows_dropped(rows: usize) {
        ::metrics::counter!(ROWS_DROPPED_TOTAL).increment(rows as u64);
    }

    pub fn record_payload_bytes(bytes: usize) {
        ::metrics::histogram!(PAYLOAD_BYTES).record(bytes as f64);
    }
}
