//! Client configuration (layered: code > env > defaults).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::store::TokenStoreConfig;
use crate::error::{ApiError, Result};
use crate::util::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Everything the [`ApiClient`](crate::client::ApiClient) needs to know
/// about its backend and its resilience knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Fixed per-attempt timeout.
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub default_cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub cache_sweep_interval: Duration,
    pub refresh_path: String,
    /// Tokens expiring within this window are refreshed ahead of time.
    pub refresh_leeway: Duration,
    /// Upper bound on how long a caller waits for an offline-queued call.
    /// `None` waits until connectivity returns.
    pub queue_wait_timeout: Option<Duration>,
    pub token_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            default_cache_ttl: Duration::from_secs(5 * 60),
            cache_max_entries: 512,
            cache_sweep_interval: Duration::from_secs(60),
            refresh_path: "/auth/refresh".to_string(),
            refresh_leeway: Duration::from_secs(30),
            queue_wait_timeout: None,
            token_dir: TokenStoreConfig::default_dir(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load from `.env` and `CIVIC_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are rejected.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("CIVIC_BASE_URL") {
            config.base_url = url;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CIVIC_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = parse_var(&lookup, "CIVIC_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CIVIC_RETRY_BASE_DELAY_MS")? {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CIVIC_CACHE_TTL_SECS")? {
            config.default_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(entries) = parse_var(&lookup, "CIVIC_CACHE_MAX_ENTRIES")? {
            config.cache_max_entries = entries;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CIVIC_CACHE_SWEEP_SECS")? {
            config.cache_sweep_interval = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("CIVIC_REFRESH_PATH") {
            config.refresh_path = path;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CIVIC_REFRESH_LEEWAY_SECS")? {
            config.refresh_leeway = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CIVIC_QUEUE_WAIT_MS")? {
            config.queue_wait_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(dir) = lookup("CIVIC_TOKEN_DIR") {
            config.token_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_default_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = ttl;
        self
    }

    pub fn with_cache_max_entries(mut self, entries: usize) -> Self {
        self.cache_max_entries = entries;
        self
    }

    pub fn with_cache_sweep_interval(mut self, interval: Duration) -> Self {
        self.cache_sweep_interval = interval;
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_refresh_leeway(mut self, leeway: Duration) -> Self {
        self.refresh_leeway = leeway;
        self
    }

    pub fn with_queue_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.queue_wait_timeout = timeout;
        self
    }

    pub fn with_token_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.token_dir = dir.into();
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
            ..RetryPolicy::default()
        }
    }

    pub fn refresh_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.refresh_path.trim_start_matches('/')
        )
    }

    pub fn token_store_config(&self) -> TokenStoreConfig {
        TokenStoreConfig::new(self.token_dir.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ApiError::validation(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ApiError::validation("request_timeout must be non-zero"));
        }
        if self.cache_max_entries == 0 {
            return Err(ApiError::validation("cache_max_entries must be at least 1"));
        }
        if self.cache_sweep_interval.is_zero() {
            return Err(ApiError::validation("cache_sweep_interval must be non-zero"));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ApiError::validation(format!("{name}={raw:?}: {e}"))),
    }
}
