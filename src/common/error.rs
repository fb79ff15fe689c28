use thiserror::Error;

/// Problems found while loading or validating configuration. Raised once at
/// startup, before any browser is launched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Unsupported storage destination '{0}': expected s3://bucket[/prefix], an http(s) URL, a file:// URL or a directory path")]
    UnsupportedDestination(String),
}

/// Failures of the render stage. Every variant is reported after the
/// browser session has been terminated.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("reading the rendered document failed: {0}")]
    Document(String),

    #[error("readiness condition ({condition}) not met within {budget:?}")]
    Timeout {
        condition: String,
        budget: std::time::Duration,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("table not found: no element matches '{selector}'")]
    TableNotFound { selector: String },

    #[error("ambiguous table: {count} elements match '{selector}'")]
    AmbiguousTable { selector: String, count: usize },

    #[error("no headers in target table")]
    NoHeaders,

    #[error("no data rows in target table")]
    NoRows,

    #[error("invalid table selector '{selector}': {message}")]
    Selector { selector: String, message: String },
}

/// The record could not be written as CSV.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("row {row} has {found} field(s), expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("writing '{key}' to {destination} failed: {message}")]
    Write {
        key: String,
        destination: String,
        message: String,
    },

    #[error("writing '{key}' to {destination} timed out after {budget:?}")]
    Timeout {
        key: String,
        destination: String,
        budget: std::time::Duration,
    },
}

/// Errors that stop a run before the pipeline starts.
#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extractor setup failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScraperError>;
