//! GitHub API client
//!
//! Thin HTTP client for the GitHub REST API: authentication, media types,
//! and response-header parsing for rate limits and pagination.

use crate::Result;
use crate::error::Error;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, LINK};

const USER_AGENT: &str = concat!("repo-pulse/", env!("CARGO_PKG_VERSION"));

/// Default REST media type.
const DEFAULT_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Media type asking the stargazers endpoint to include starred timestamps.
const STAR_MEDIA_TYPE: &str = "application/vnd.github.star+json";

/// Rate limit information from response headers.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    /// Requests left in the current quota window.
    pub remaining: u64,

    /// When the quota resets.
    pub reset_at: DateTime<Utc>,
}

/// Authenticated GitHub API client.
///
/// Issues single requests only; retry and rate-limit handling live in
/// [`RateLimitedFetcher`](super::RateLimitedFetcher).
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Create a client with the required access token and base API URL.
    ///
    /// The base URL is injectable so tests can point at a mock server. An
    /// access token that cannot form a valid header is a configuration
    /// error, surfaced before any request is made.
    pub fn new(token: &str, base_url: impl Into<String>) -> Result<Self> {
        use reqwest::header::{AUTHORIZATION, HeaderValue};

        let mut auth_val = HeaderValue::from_str(&format!("token {token}"))
            .map_err(|e| Error::Configuration(format!("access token is not a valid header value: {e}")))?;
        auth_val.set_sensitive(true);

        let mut headers = HeaderMap::new();
        let _ = headers.insert(AUTHORIZATION, auth_val);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Configuration(format!("could not build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// The base API URL for this client.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a single GET against `url` with the media type the endpoint
    /// needs.
    pub async fn get(&self, url: &str) -> core::result::Result<reqwest::Response, reqwest::Error> {
        let accept = if url.contains("/stargazers") {
            STAR_MEDIA_TYPE
        } else {
            DEFAULT_MEDIA_TYPE
        };
        self.http.get(url).header(reqwest::header::ACCEPT, accept).send().await
    }
}

/// Extract rate limit information from API response headers.
pub(crate) fn extract_rate_limit(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?.parse::<u64>().ok()?;
    let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse::<i64>().ok()?;
    let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;
    Some(RateLimitInfo { remaining, reset_at })
}

/// Parse the `Retry-After` header value as seconds.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.parse::<u64>().ok()
}

/// Extract the `rel="next"` target from a `Link` header, if present.
pub(crate) fn parse_next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, rel) = part.split_once(';')?;
        if !rel.contains(r#"rel="next""#) {
            return None;
        }
        Some(target.trim().strip_prefix('<')?.strip_suffix('>')?.to_string())
    })
}
