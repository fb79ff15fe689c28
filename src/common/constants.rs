//! Defaults for the stats page this scraper targets. All of them can be
//! overridden through configuration.

// Target page and the table rendered on it
pub const DEFAULT_TARGET_URL: &str = "https://www.nba.com/stats/teams/traditional";
pub const DEFAULT_TABLE_CLASS: &str = "Crom_table__p1iZz";

// Render budget
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 5;
pub const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 250;
pub const SCREENSHOT_TIMEOUT_SECS: u64 = 5;
pub const BROWSER_CLOSE_TIMEOUT_SECS: u64 = 5;
/// Upper bound on session termination; covers a CDP close plus kill and reap.
pub const TERMINATE_TIMEOUT_SECS: u64 = 15;

// Browser identity and surface
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const WINDOW_WIDTH: u32 = 1920;
pub const WINDOW_HEIGHT: u32 = 1080;

// Delivery
pub const DEFAULT_KEY_PREFIX: &str = "nba_team_stats_";
pub const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const CSV_EXTENSION: &str = "csv";
pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;

// Configuration sources
pub const DEFAULT_CONFIG_FILE: &str = "scraper.toml";
pub const ENV_TARGET_URL: &str = "SCRAPER_TARGET_URL";
pub const ENV_STORAGE_DESTINATION: &str = "SCRAPER_STORAGE_DESTINATION";
pub const ENV_RENDER_TIMEOUT: &str = "SCRAPER_RENDER_TIMEOUT_SECONDS";
pub const ENV_STORAGE_TOKEN: &str = "SCRAPER_STORAGE_TOKEN";
/// Older deployments only set a bucket name. Used when no destination is
/// given and mapped to the bucket's S3 endpoint.
pub const ENV_LEGACY_BUCKET: &str = "S3_BUCKET_NAME";

// Invocation response codes
pub const STATUS_OK: u16 = 200;
pub const STATUS_FAILED: u16 = 500;
