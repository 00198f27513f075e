//! Price synchronization settings.
//!
//! Defaults live in [`crate::constants`]. Hosts can overlay `SCRAPMARKET_*`
//! environment variables with [`PriceSyncConfig::from_env`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use scrapmarket_market_data::{InstrumentCode, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::cache::{DataKind, FreshnessPolicy};
use crate::constants::*;
use crate::errors::ConfigError;
use crate::polling::AdaptiveInterval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessConfig {
    pub stale_after_secs: u64,
    pub expire_after_secs: u64,
}

impl FreshnessConfig {
    pub fn policy(&self) -> FreshnessPolicy {
        FreshnessPolicy::new(
            Duration::from_secs(self.stale_after_secs),
            Duration::from_secs(self.expire_after_secs),
        )
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.expire_after_secs == 0 {
            return Err(ConfigError::invalid(field, "expiry must be greater than zero"));
        }
        if self.stale_after_secs > self.expire_after_secs {
            return Err(ConfigError::invalid(
                field,
                format!(
                    "stale after {}s exceeds expiry after {}s",
                    self.stale_after_secs, self.expire_after_secs
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PollConfig {
    pub foreground_secs: u64,
    pub low_power_multiplier: u32,
    /// Background polling interval; `None` disables background polling.
    pub background_secs: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            foreground_secs: FOREGROUND_POLL_SECS,
            low_power_multiplier: LOW_POWER_MULTIPLIER,
            background_secs: None,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> AdaptiveInterval {
        AdaptiveInterval::new(Duration::from_secs(self.foreground_secs))
            .with_low_power_multiplier(self.low_power_multiplier)
            .with_background(self.background_secs.map(Duration::from_secs))
    }

    pub fn background_enabled(&self) -> bool {
        self.background_secs.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

/// Everything needed to wire the price pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PriceSyncConfig {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    /// Instruments whose latest price and history are kept warm.
    pub instruments: Vec<InstrumentCode>,
    pub history_days: u32,
    /// Buckets requested from the server when no history is cached.
    pub bucket_limit: u32,
    pub latest: FreshnessConfig,
    pub history: FreshnessConfig,
    pub bucket_stats: FreshnessConfig,
    pub poll: PollConfig,
    pub retry: RetryConfig,
    /// Directory for the file backup; `None` keeps backups in memory.
    pub backup_dir: Option<PathBuf>,
}

impl Default for PriceSyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api/v1".to_string(),
            api_key: None,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            instruments: InstrumentCode::supported().collect(),
            history_days: DEFAULT_HISTORY_DAYS,
            bucket_limit: DEFAULT_BUCKET_LIMIT,
            latest: FreshnessConfig {
                stale_after_secs: LATEST_STALE_AFTER_SECS,
                expire_after_secs: LATEST_EXPIRE_AFTER_SECS,
            },
            history: FreshnessConfig {
                stale_after_secs: HISTORY_STALE_AFTER_SECS,
                expire_after_secs: HISTORY_EXPIRE_AFTER_SECS,
            },
            bucket_stats: FreshnessConfig {
                stale_after_secs: HISTORY_STALE_AFTER_SECS,
                expire_after_secs: HISTORY_EXPIRE_AFTER_SECS,
            },
            poll: PollConfig::default(),
            retry: RetryConfig::default(),
            backup_dir: None,
        }
    }
}

impl PriceSyncConfig {
    /// Defaults overlaid with `SCRAPMARKET_*` environment variables, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("SCRAPMARKET_API_URL") {
            config.api_base_url = url.trim().to_string();
        }
        if let Some(key) = get("SCRAPMARKET_API_KEY") {
            config.api_key = Some(key);
        }
        if let Some(v) = parse_var(&get, "SCRAPMARKET_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = v;
        }
        if let Some(list) = get("SCRAPMARKET_INSTRUMENTS") {
            config.instruments = parse_instruments(&list)?;
        }
        if let Some(v) = parse_var(&get, "SCRAPMARKET_HISTORY_DAYS")? {
            config.history_days = v;
        }
        if let Some(v) = parse_var(&get, "SCRAPMARKET_BUCKET_LIMIT")? {
            config.bucket_limit = v;
        }
        if let Some(v) = parse_var(&get, "SCRAPMARKET_POLL_SECS")? {
            config.poll.foreground_secs = v;
        }
        if let Some(v) = parse_var(&get, "SCRAPMARKET_LOW_POWER_MULTIPLIER")? {
            config.poll.low_power_multiplier = v;
        }
        if let Some(v) = parse_var(&get, "SCRAPMARKET_BACKGROUND_POLL_SECS")? {
            config.poll.background_secs = Some(v);
        }
        if let Some(v) = parse_var(&get, "SCRAPMARKET_RETRY_ATTEMPTS")? {
            config.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(&get, "SCRAPMARKET_RETRY_BASE_MS")? {
            config.retry.base_delay_ms = v;
        }
        if let Some(v) = parse_var(&get, "SCRAPMARKET_RETRY_MAX_MS")? {
            config.retry.max_delay_ms = v;
        }
        if let Some(v) = parse_var(&get, "SCRAPMARKET_RETRY_JITTER")? {
            config.retry.jitter = v;
        }
        if let Some(dir) = get("SCRAPMARKET_BACKUP_DIR") {
            config.backup_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that can only be programmer errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(ConfigError::invalid(
                "api_base_url",
                format!("'{}' is not an http(s) URL", self.api_base_url),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("request_timeout_secs", "must be > 0"));
        }
        if self.instruments.is_empty() {
            return Err(ConfigError::invalid("instruments", "at least one is required"));
        }
        if self.history_days == 0 {
            return Err(ConfigError::invalid("history_days", "must be > 0"));
        }
        if self.bucket_limit == 0 {
            return Err(ConfigError::invalid("bucket_limit", "must be > 0"));
        }
        self.latest.validate("latest")?;
        self.history.validate("history")?;
        self.bucket_stats.validate("bucket_stats")?;
        if self.poll.foreground_secs == 0 {
            return Err(ConfigError::invalid("poll.foreground_secs", "must be > 0"));
        }
        if self.poll.low_power_multiplier == 0 {
            return Err(ConfigError::invalid("poll.low_power_multiplier", "must be >= 1"));
        }
        if self.poll.background_secs == Some(0) {
            return Err(ConfigError::invalid("poll.background_secs", "must be > 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be >= 1"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                "must not be below retry.base_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn freshness_for(&self, kind: DataKind) -> FreshnessPolicy {
        match kind {
            DataKind::Latest => self.latest.policy(),
            DataKind::History => self.history.policy(),
            DataKind::BucketStats => self.bucket_stats.policy(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T, G>(get: &G, var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Parse {
                var: var.to_string(),
                value: raw,
            }),
    }
}

/// Comma-separated codes or display names, e.g. `CU, Brass, al_can`.
fn parse_instruments(list: &str) -> Result<Vec<InstrumentCode>, ConfigError> {
    let mut codes: Vec<InstrumentCode> = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let code = InstrumentCode::from_display_name(item).map_err(|_| ConfigError::Parse {
            var: "SCRAPMARKET_INSTRUMENTS".to_string(),
            value: item.to_string(),
        })?;
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    Ok(codes)
}
