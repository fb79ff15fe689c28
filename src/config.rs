use crate::app::extract::table_selector_for_class;
use crate::common::constants::*;
use crate::common::error::ConfigError;
use crate::types::{ReadinessCondition, RenderRequest};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Effective configuration for a pipeline run.
///
/// Layered lowest to highest: defaults, TOML file, environment, CLI flags,
/// per-invocation overrides. Call [`Config::validate`] once the layers are
/// applied and before building the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Page to render.
    pub target_url: String,
    /// Where the CSV goes: `s3://bucket[/prefix]`, an http(s) object-store
    /// base URL, a `file://` URL or a directory path.
    pub storage_destination: String,
    /// Budget for navigation plus readiness wait.
    pub render_timeout_seconds: u64,
    /// Class carried by the target `<table>`.
    pub table_class: String,
    /// Readiness selector. Unset waits for the target table itself; an empty
    /// string selects the fixed settle delay instead.
    pub readiness_selector: Option<String>,
    pub settle_delay_seconds: u64,
    pub poll_interval_millis: u64,
    pub key_prefix: String,
    pub delivery_timeout_seconds: u64,
    pub screenshot_path: Option<PathBuf>,
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: String,
    pub storage_token: Option<String>,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            storage_destination: "./output".to_string(),
            render_timeout_seconds: DEFAULT_RENDER_TIMEOUT_SECS,
            table_class: DEFAULT_TABLE_CLASS.to_string(),
            readiness_selector: None,
            settle_delay_seconds: DEFAULT_SETTLE_DELAY_SECS,
            poll_interval_millis: DEFAULT_POLL_INTERVAL_MILLIS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            delivery_timeout_seconds: DEFAULT_DELIVERY_TIMEOUT_SECS,
            screenshot_path: None,
            chrome_executable: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            storage_token: None,
            metrics_addr: None,
        }
    }
}

/// Options an invocation event may carry for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InvocationOptions {
    pub target_url: Option<String>,
    pub storage_destination: Option<String>,
    pub render_timeout_seconds: Option<u64>,
}

/// Parsed form of `storage_destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageDestination {
    S3 { bucket: String, prefix: String },
    Http(String),
    Filesystem(PathBuf),
}

impl StorageDestination {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("s3://") {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            if !is_bucket_name(bucket) {
                return Err(ConfigError::UnsupportedDestination(raw.to_string()));
            }
            return Ok(StorageDestination::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.trim_matches('/').to_string(),
            });
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            let url = reqwest::Url::parse(raw)
                .map_err(|_| ConfigError::UnsupportedDestination(raw.to_string()))?;
            if url.host_str().is_none() {
                return Err(ConfigError::UnsupportedDestination(raw.to_string()));
            }
            return Ok(StorageDestination::Http(raw.trim_end_matches('/').to_string()));
        }
        if let Some(path) = raw.strip_prefix("file://") {
            if path.is_empty() {
                return Err(ConfigError::UnsupportedDestination(raw.to_string()));
            }
            return Ok(StorageDestination::Filesystem(PathBuf::from(path)));
        }
        let looks_like_path = raw.starts_with('/')
            || raw.starts_with('.')
            || raw.contains(std::path::MAIN_SEPARATOR);
        if looks_like_path {
            return Ok(StorageDestination::Filesystem(PathBuf::from(raw)));
        }
        Err(ConfigError::UnsupportedDestination(raw.to_string()))
    }
}

impl Config {
    /// Defaults, then `path` (or `scraper.toml` when present), then the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loaded config file {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Applies environment overrides through `lookup`, which keeps tests off
    /// the real process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_TARGET_URL) {
            self.target_url = url;
        }
        if let Some(dest) = lookup(ENV_STORAGE_DESTINATION) {
            self.storage_destination = dest;
        } else if let Some(bucket) = lookup(ENV_LEGACY_BUCKET) {
            self.storage_destination = format!("s3://{}", bucket.trim());
        }
        if let Some(raw) = lookup(ENV_RENDER_TIMEOUT) {
            self.render_timeout_seconds =
                raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    field: "render_timeout_seconds",
                    reason: format!("'{raw}' is not a whole number of seconds"),
                })?;
        }
        if let Some(token) = lookup(ENV_STORAGE_TOKEN) {
            self.storage_token = Some(token);
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &InvocationOptions) {
        if let Some(url) = &overrides.target_url {
            self.target_url = url.clone();
        }
        if let Some(dest) = &overrides.storage_destination {
            self.storage_destination = dest.clone();
        }
        if let Some(timeout) = overrides.render_timeout_seconds {
            self.render_timeout_seconds = timeout;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.target_url).map_err(|e| ConfigError::Invalid {
            field: "target_url",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("target_url", "must be an http(s) URL"));
        }

        for (field, value) in [
            ("render_timeout_seconds", self.render_timeout_seconds),
            ("delivery_timeout_seconds", self.delivery_timeout_seconds),
            ("poll_interval_millis", self.poll_interval_millis),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }

        let class = self.table_class.trim();
        if class.is_empty() || class.chars().any(char::is_whitespace) {
            return Err(invalid("table_class", "must be a single class name"));
        }
        parse_css("table_class", &table_selector_for_class(class))?;

        match &self.readiness_selector {
            Some(css) if css.trim().is_empty() => {
                if self.settle_delay_seconds >= self.render_timeout_seconds {
                    return Err(invalid(
                        "settle_delay_seconds",
                        "must be shorter than render_timeout_seconds",
                    ));
                }
            }
            Some(css) => parse_css("readiness_selector", css)?,
            None => {}
        }

        if self.key_prefix.contains("..") || self.key_prefix.starts_with('/') {
            return Err(invalid("key_prefix", "must be a relative key prefix"));
        }

        StorageDestination::parse(&self.storage_destination)?;
        Ok(())
    }

    pub fn storage(&self) -> Result<StorageDestination, ConfigError> {
        StorageDestination::parse(&self.storage_destination)
    }

    pub fn readiness(&self) -> ReadinessCondition {
        match &self.readiness_selector {
            Some(css) if css.trim().is_empty() => {
                ReadinessCondition::SettleDelay(Duration::from_secs(self.settle_delay_seconds))
            }
            Some(css) => ReadinessCondition::SelectorPresent(css.trim().to_string()),
            None => ReadinessCondition::SelectorPresent(table_selector_for_class(&self.table_class)),
        }
    }

    pub fn render_request(&self) -> RenderRequest {
        RenderRequest {
            target_url: self.target_url.clone(),
            readiness: self.readiness(),
            timeout: Duration::from_secs(self.render_timeout_seconds),
            poll_interval: Duration::from_millis(self.poll_interval_millis),
            screenshot_path: self.screenshot_path.clone(),
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_seconds)
    }
}

/// S3 bucket naming: 3-63 lowercase letters, digits, dots or hyphens,
/// starting and ending with a letter or digit.
fn is_bucket_name(name: &str) -> bool {
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    (3..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
        && edge_ok(name.chars().next())
        && edge_ok(name.chars().last())
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn parse_css(field: &'static str, css: &str) -> Result<(), ConfigError> {
    Selector::parse(css).map(|_| ()).map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("'{css}' is not a valid selector: {e}"),
    })
}
