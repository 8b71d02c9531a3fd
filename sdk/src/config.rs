//! Configuration for the MarginDash shipper

use crate::error::{Result, ShipperError};
use std::env;
use std::time::Duration;

/// Default collector endpoint
pub const DEFAULT_BASE_URL: &str = "https://app.margindash.com/api/v1";

/// Event type applied when a tracked event does not set one
pub const DEFAULT_EVENT_TYPE: &str = "ai_request";

/// Largest batch the collector accepts; bigger requests get a 413
pub const MAX_BATCH_SIZE: usize = 100;

/// Main configuration for the shipper
#[derive(Debug, Clone)]
pub struct Config {
    /// API key sent as a bearer token
    pub api_key: Option<String>,

    /// Collector base URL (without trailing slash)
    pub base_url: String,

    /// Time between background flush cycles
    pub flush_interval: Duration,

    /// Maximum number of events held in memory
    pub max_queue_size: usize,

    /// Maximum number of events per request
    pub batch_size: usize,

    /// Maximum send attempts per batch (including the first)
    pub max_retries: u32,

    /// Delay before the first retry
    pub backoff_base: Duration,

    /// Upper bound for any single retry delay
    pub backoff_max: Duration,

    /// Random spread applied to each delay (0.0 - 1.0)
    pub jitter: f64,

    /// `event_type` applied to events that don't specify one
    pub default_event_type: String,

    /// Log level
    pub log_level: String,

    /// Log format (json or pretty)
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            flush_interval: Duration::from_secs(5),
            max_queue_size: 1000,
            batch_size: 25,
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            jitter: 0.5,
            default_event_type: DEFAULT_EVENT_TYPE.to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Configuration with the given API key and defaults for everything else
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration, jitter: f64) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self.jitter = jitter;
        self
    }

    pub fn with_default_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.default_event_type = event_type.into();
        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(key) = env::var("MARGINDASH_API_KEY") {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }

        if let Ok(url) = env::var("MARGINDASH_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        if let Ok(ms) = env::var("MARGINDASH_FLUSH_INTERVAL_MS") {
            let ms: u64 = ms.parse().map_err(|e| {
                ShipperError::Config(format!("invalid MARGINDASH_FLUSH_INTERVAL_MS: {e}"))
            })?;
            config.flush_interval = Duration::from_millis(ms);
        }

        if let Ok(size) = env::var("MARGINDASH_MAX_QUEUE_SIZE") {
            config.max_queue_size = size.parse().map_err(|e| {
                ShipperError::Config(format!("invalid MARGINDASH_MAX_QUEUE_SIZE: {e}"))
            })?;
        }

        if let Ok(size) = env::var("MARGINDASH_BATCH_SIZE") {
            config.batch_size = size
                .parse()
                .map_err(|e| ShipperError::Config(format!("invalid MARGINDASH_BATCH_SIZE: {e}")))?;
        }

        if let Ok(retries) = env::var("MARGINDASH_MAX_RETRIES") {
            config.max_retries = retries
                .parse()
                .map_err(|e| ShipperError::Config(format!("invalid MARGINDASH_MAX_RETRIES: {e}")))?;
        }

        if let Ok(event_type) = env::var("MARGINDASH_DEFAULT_EVENT_TYPE") {
            config.default_event_type = event_type;
        }

        if let Ok(level) = env::var("MARGINDASH_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(format) = env::var("MARGINDASH_LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(ShipperError::Config(format!(
                        "invalid MARGINDASH_LOG_FORMAT: {other} (expected 'json' or 'pretty')"
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval.is_zero() {
            return Err(ShipperError::Config("flush_interval must be > 0".into()));
        }
        if self.max_queue_size == 0 {
            return Err(ShipperError::Config("max_queue_size must be >= 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ShipperError::Config("batch_size must be >= 1".into()));
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(ShipperError::Config(format!(
                "batch_size must be <= {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.max_retries == 0 {
            return Err(ShipperError::Config("max_retries must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ShipperError::Config(format!(
                "jitter must be within 0.0..=1.0, got {}",
                self.jitter
            )));
        }
        if self.backoff_base > self.backoff_max {
            return Err(ShipperError::Config(
                "backoff_base must not exceed backoff_max".into(),
            ));
        }
        if self.batch_size > self.max_queue_size {
            tracing::warn!(
                batch_size = self.batch_size,
                max_queue_size = self.max_queue_size,
                "batch_size exceeds max_queue_size, batches will never be full"
            );
        }
        Ok(())
    }
}
