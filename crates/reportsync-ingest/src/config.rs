//! Connector configuration
//!
//! Loaded from `REPORTSYNC_*` environment variables. `main` reads a `.env`
//! file first, so both work.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_DIMENSIONS: &str = "pagePath,dateHourMinute";
pub const DEFAULT_MEASURES: &str = "pageviews";
pub const DEFAULT_TOPIC: &str = "analytics-reports";
pub const DEFAULT_BACKFILL_START: &str = "30DaysAgo";
pub const DEFAULT_INCREMENTAL_START: &str = "1DaysAgo";
pub const DEFAULT_END_DATE: &str = "yesterday";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
/// One day between incremental windows
pub const DEFAULT_MIN_FETCH_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_API_URL: &str = "https://analyticsreporting.googleapis.com";
pub const DEFAULT_PAGE_SIZE: u32 = 10_000;
/// Largest page the reporting API accepts
pub const MAX_PAGE_SIZE: u32 = 100_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Settings for one configured report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Reporting view to query
    pub view_id: String,
    /// Dimension names without the `ga:` prefix
    pub dimensions: Vec<String>,
    /// Metric names without the `ga:` prefix
    pub measures: Vec<String>,
    /// Topic records are published to; also the schema name
    pub topic: String,
    pub backfill_start: String,
    pub incremental_start: String,
    pub end_date: String,
    /// Sleep between idle cycles and after a failed cycle
    pub poll_interval_secs: u64,
    /// Minimum time between two completed incremental windows
    pub min_fetch_interval_secs: u64,
    pub api_url: String,
    /// Service-account key file exchanged for refreshed access tokens
    pub credentials_file: Option<PathBuf>,
    /// Static OAuth bearer token, never serialized
    #[serde(skip)]
    pub access_token: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
}

impl ConnectorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            view_id: std::env::var("REPORTSYNC_VIEW_ID")
                .context("REPORTSYNC_VIEW_ID must be set")?,
            dimensions: parse_list(&env_or("REPORTSYNC_DIMENSIONS", DEFAULT_DIMENSIONS)),
            measures: parse_list(&env_or("REPORTSYNC_MEASURES", DEFAULT_MEASURES)),
            topic: env_or("REPORTSYNC_TOPIC", DEFAULT_TOPIC),
            backfill_start: env_or("REPORTSYNC_BACKFILL_START", DEFAULT_BACKFILL_START),
            incremental_start: env_or("REPORTSYNC_INCREMENTAL_START", DEFAULT_INCREMENTAL_START),
            end_date: env_or("REPORTSYNC_END_DATE", DEFAULT_END_DATE),
            poll_interval_secs: env_parse(
                "REPORTSYNC_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?,
            min_fetch_interval_secs: env_parse(
                "REPORTSYNC_MIN_FETCH_INTERVAL_SECS",
                DEFAULT_MIN_FETCH_INTERVAL_SECS,
            )?,
            api_url: env_or("REPORTSYNC_API_URL", DEFAULT_API_URL),
            credentials_file: std::env::var_os("REPORTSYNC_CREDENTIALS_FILE")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            // Missing credentials are rejected when the HTTP source is built
            access_token: std::env::var("REPORTSYNC_ACCESS_TOKEN").unwrap_or_default(),
            page_size: env_parse("REPORTSYNC_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            request_timeout_secs: env_parse(
                "REPORTSYNC_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.view_id.trim().is_empty() {
            anyhow::bail!("REPORTSYNC_VIEW_ID cannot be empty");
        }
        if self.dimensions.is_empty() {
            anyhow::bail!("REPORTSYNC_DIMENSIONS must name at least one dimension");
        }
        if self.measures.is_empty() {
            anyhow::bail!("REPORTSYNC_MEASURES must name at least one metric");
        }
        if self.topic.trim().is_empty() {
            anyhow::bail!("REPORTSYNC_TOPIC cannot be empty");
        }
        if self.backfill_start == self.incremental_start {
            anyhow::bail!(
                "REPORTSYNC_BACKFILL_START and REPORTSYNC_INCREMENTAL_START must differ, both are {}",
                self.backfill_start
            );
        }
        if self.credentials_file.is_some() && !self.access_token.trim().is_empty() {
            anyhow::bail!(
                "Set only one of REPORTSYNC_CREDENTIALS_FILE and REPORTSYNC_ACCESS_TOKEN"
            );
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            anyhow::bail!(
                "REPORTSYNC_PAGE_SIZE must be between 1 and {}, got: {}",
                MAX_PAGE_SIZE,
                self.page_size
            );
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("REPORTSYNC_POLL_INTERVAL_SECS must be greater than 0");
        }
        if self.min_fetch_interval_secs == 0 {
            anyhow::bail!("REPORTSYNC_MIN_FETCH_INTERVAL_SECS must be greater than 0");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REPORTSYNC_REQUEST_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn min_fetch_interval(&self) -> Duration {
        Duration::from_secs(self.min_fetch_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Full URL of the `reports:batchGet` endpoint
    pub fn batch_get_url(&self) -> String {
        format!("{}/v4/reports:batchGet", self.api_url.trim_end_matches('/'))
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            view_id: String::new(),
            dimensions: parse_list(DEFAULT_DIMENSIONS),
            measures: parse_list(DEFAULT_MEASURES),
            topic: DEFAULT_TOPIC.to_string(),
            backfill_start: DEFAULT_BACKFILL_START.to_string(),
            incremental_start: DEFAULT_INCREMENTAL_START.to_string(),
            end_date: DEFAULT_END_DATE.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            min_fetch_interval_secs: DEFAULT_MIN_FETCH_INTERVAL_SECS,
            api_url: DEFAULT_API_URL.to_string(),
            credentials_file: None,
            access_token: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

/// Split a comma list, dropping blanks and a leading `ga:`
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .map(|item| item.strip_prefix("ga:").unwrap_or(item))
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
