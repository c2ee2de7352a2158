//! Engine configuration.
//!
//! The credential/config provider is an external collaborator; everything it
//! supplies lands in [`EngineConfig`], which is validated before the engine
//! issues its first request.

use crate::Result;
use crate::error::Error;
use crate::github::RetryPolicy;
use core::time::Duration;

/// Default GitHub API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Default freshness window for cached pages: ten minutes.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

const DEFAULT_MAX_CACHE_ENTRIES: usize = 256;
const DEFAULT_PAGE_SIZE: u8 = 100;
const DEFAULT_MAX_PAGES: u32 = 10;
const DEFAULT_WINDOW: usize = 6;
const DEFAULT_ANOMALY_THRESHOLD: f64 = 2.0;

/// Everything the engine needs from its credential/config provider.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// GitHub access token. Required.
    pub token: String,

    /// Base API URL; overridable for mock servers.
    pub base_url: String,

    /// How long cached pages stay fresh.
    pub cache_ttl: Duration,

    /// Size bound enforced by the cache sweep.
    pub max_cache_entries: usize,

    /// Serve an expired cache entry when its refresh fails.
    pub serve_stale_on_error: bool,

    /// Retry and rate-limit bounds for the fetcher.
    pub retry: RetryPolicy,

    /// Page size requested from list endpoints (1..=100).
    pub page_size: u8,

    /// Upper bound on pages fetched per endpoint per call.
    pub max_pages: u32,

    /// Trailing window, in buckets, for trend statistics.
    pub window: usize,

    /// Anomaly threshold, in standard deviations.
    pub anomaly_threshold: f64,
}

impl EngineConfig {
    /// Create a configuration with the given token and default parameters.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            max_cache_entries: DEFAULT_MAX_CACHE_ENTRIES,
            serve_stale_on_error: false,
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            window: DEFAULT_WINDOW,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
        }
    }

    /// Check the configuration, surfacing problems before any fetch is
    /// attempted.
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::Configuration("a GitHub access token is required".to_string()));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::Configuration("the API base URL must not be empty".to_string()));
        }
        if self.cache_ttl.is_zero() {
            return Err(Error::Configuration("the cache TTL must be positive".to_string()));
        }
        if self.max_cache_entries == 0 {
            return Err(Error::Configuration("the cache must allow at least one entry".to_string()));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(Error::Configuration("the page size must be between 1 and 100".to_string()));
        }
        if self.max_pages == 0 {
            return Err(Error::Configuration("at least one page must be allowed per call".to_string()));
        }
        if self.window == 0 {
            return Err(Error::Configuration(
                "the moving-average window must be at least 1".to_string(),
            ));
        }
        if !self.anomaly_threshold.is_finite() || self.anomaly_threshold <= 0.0 {
            return Err(Error::Configuration("the anomaly threshold must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_token_are_valid() {
        let config = EngineConfig::new("ghp_example");
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert_eq!(config.page_size, 100);
    }

    #[test]
    fn missing_token_is_a_configuration_error() {
        let config = EngineConfig::new("");
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn whitespace_token_is_a_configuration_error() {
        let config = EngineConfig::new("   ");
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut config = EngineConfig::new("token");
        config.cache_ttl = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_page_size_is_rejected() {
        let mut config = EngineConfig::new("token");
        config.page_size = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut config = EngineConfig::new("token");
        config.window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let mut config = EngineConfig::new("token");
        config.anomaly_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }
}
