use crate::common::constants::{CSV_CONTENT_TYPE, STATUS_FAILED, STATUS_OK};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How the renderer decides that the page has finished rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessCondition {
    /// Wait until an element matching this CSS selector is present.
    SelectorPresent(String),
    /// Degraded mode: sleep a fixed delay, then snapshot whatever is there.
    SettleDelay(Duration),
}

impl fmt::Display for ReadinessCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessCondition::SelectorPresent(selector) => write!(f, "presence of '{selector}'"),
            ReadinessCondition::SettleDelay(delay) => {
                write!(f, "settle delay of {}ms", delay.as_millis())
            }
        }
    }
}

/// Everything the renderer needs for one run. Built once by the coordinator.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub target_url: String,
    pub readiness: ReadinessCondition,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Optional diagnostic screenshot destination.
    pub screenshot_path: Option<PathBuf>,
}

/// Markup exactly as the browser reported it once readiness was confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument(String);

impl RenderedDocument {
    pub fn new(markup: String) -> Self {
        Self(markup)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Headers and rows of the extracted table, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableRecord {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Encoded payload plus where it should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryArtifact {
    pub payload: Vec<u8>,
    pub key: String,
    pub content_type: &'static str,
}

impl DeliveryArtifact {
    pub fn csv(payload: Vec<u8>, key: String) -> Self {
        Self {
            payload,
            key,
            content_type: CSV_CONTENT_TYPE,
        }
    }
}

/// Confirmation returned by the deliverer once the blob is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub key: String,
    pub bytes: usize,
    pub sha256: String,
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Success,
    RenderFailed,
    ExtractionFailed,
    DeliveryFailed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Success => "success",
            PipelineStatus::RenderFailed => "render_failed",
            PipelineStatus::ExtractionFailed => "extraction_failed",
            PipelineStatus::DeliveryFailed => "delivery_failed",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sole outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    status: PipelineStatus,
    message: String,
}

impl PipelineResult {
    pub fn new(status: PipelineStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Success
    }

    /// 200 for a fully successful run, 500 for any failure.
    pub fn status_code(&self) -> u16 {
        if self.is_success() {
            STATUS_OK
        } else {
            STATUS_FAILED
        }
    }
}
