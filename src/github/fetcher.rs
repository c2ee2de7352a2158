//! Rate-limited, retrying page fetcher.
//!
//! [`RateLimitedFetcher`] issues one paginated request per call, honoring the
//! provider's rate-limit headers and retrying transient failures with
//! exponential backoff and jitter. The retry flow is an explicit state
//! machine so the bounded-wait and bounded-retry invariants stay visible and
//! independently testable.

use super::client::{Client, RateLimitInfo, extract_rate_limit, parse_next_link, parse_retry_after};
use crate::Result;
use crate::clock::Clock;
use crate::error::Error;
use chrono::{DateTime, Utc};
use core::time::Duration;
use rand::Rng;
use std::sync::Arc;
use url::Url;

const LOG_TARGET: &str = "     fetch";

/// Fallback wait when the provider signals a rate limit without saying when
/// it resets.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Minimum rate-limit pause; keeps a reset time in the past from producing a
/// zero-length wait loop.
const MIN_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Opaque pagination position: the next-page URL handed out by the
/// provider's `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor(pub(crate) String);

impl PageCursor {
    /// The raw cursor token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of raw API data plus the cursor for the next page, if any.
#[derive(Debug, Clone)]
pub struct Page {
    /// Provider-defined JSON payload.
    pub payload: serde_json::Value,

    /// `None` means this was the last page; callers loop until then.
    pub next: Option<PageCursor>,
}

/// Retry and rate-limit bounds for the fetcher.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Upper bound on cumulative rate-limit waiting; a reset further out
    /// fails the call instead of blocking.
    pub max_rate_limit_wait: Duration,

    /// Retry attempts on transient failures, on top of the original request.
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rate_limit_wait: Duration::from_secs(300),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Where a fetch currently stands in its retry lifecycle.
#[derive(Debug, Clone, Copy)]
enum FetchState {
    /// No request issued yet.
    Idle,

    /// Suspended until `until`, then the request is reissued.
    Waiting { reason: WaitReason, until: DateTime<Utc> },

    /// Reissuing the request; `attempt` requests have already gone out.
    Retrying { attempt: u32 },
}

/// Why a fetch is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitReason {
    /// The provider's quota is exhausted until its reset time.
    RateLimit,

    /// Exponential backoff after a transient failure.
    Backoff,
}

/// Outcome of a single request attempt.
enum AttemptOutcome {
    /// The page came back; the call is done.
    Done(Page),

    /// The provider refused for quota reasons; wait until the reset.
    RateLimited(RateLimitInfo),

    /// A fault that retrying may fix: network error, timeout, or 5xx.
    Transient { status: Option<u16>, cause: String },
}

/// Issues paginated GET requests with bounded rate-limit waits and bounded
/// retries.
///
/// Does not cache; see [`ResponseCache`](crate::cache::ResponseCache) for
/// that. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RateLimitedFetcher {
    client: Client,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RateLimitedFetcher {
    /// Create a fetcher over `client` with the given retry policy and clock.
    #[must_use]
    pub fn new(client: Client, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { client, policy, clock }
    }

    /// Fetch one page of `endpoint` with `params`, resuming from `cursor`
    /// when given. Callers loop until the returned cursor is `None`.
    pub async fn fetch(&self, endpoint: &str, params: &[(String, String)], cursor: Option<&PageCursor>) -> Result<Page> {
        let url = match cursor {
            Some(cursor) => cursor.as_str().to_string(),
            None => self.request_url(endpoint, params)?,
        };

        let mut state = FetchState::Idle;
        let mut attempts = 0u32;
        let mut transient_failures = 0u32;
        let mut waited_for_reset = Duration::ZERO;

        loop {
            state = match state {
                FetchState::Waiting { reason, until } => {
                    let now = self.clock.now();
                    if until > now {
                        let wait = (until - now).to_std().unwrap_or(Duration::ZERO);
                        log::debug!(
                            target: LOG_TARGET,
                            "waiting {}ms ({reason:?}) before retrying {url}",
                            wait.as_millis()
                        );
                        tokio::time::sleep(wait).await;
                    }
                    FetchState::Retrying { attempt: attempts }
                }

                FetchState::Idle | FetchState::Retrying { .. } => {
                    if let FetchState::Retrying { attempt } = state {
                        log::trace!(target: LOG_TARGET, "reissuing {url} after {attempt} earlier attempt(s)");
                    }
                    attempts += 1;
                    match self.attempt(&url).await? {
                        AttemptOutcome::Done(page) => return Ok(page),

                        AttemptOutcome::RateLimited(info) => {
                            let now = self.clock.now();
                            let reset_in = (info.reset_at - now)
                                .to_std()
                                .unwrap_or(Duration::ZERO)
                                .max(MIN_RATE_LIMIT_WAIT);
                            if waited_for_reset + reset_in > self.policy.max_rate_limit_wait {
                                return Err(Error::RateLimitExceeded {
                                    reset_in,
                                    max_wait: self.policy.max_rate_limit_wait,
                                });
                            }
                            waited_for_reset += reset_in;
                            log::warn!(
                                target: LOG_TARGET,
                                "rate limit hit for {url}, resuming at {}",
                                info.reset_at.format("%T")
                            );
                            FetchState::Waiting {
                                reason: WaitReason::RateLimit,
                                until: now + chrono::Duration::from_std(reset_in).unwrap_or_else(|_| chrono::Duration::zero()),
                            }
                        }

                        AttemptOutcome::Transient { status, cause } => {
                            transient_failures += 1;
                            if transient_failures > self.policy.max_retries {
                                return Err(Error::FetchFailed { attempts, status, cause });
                            }
                            let delay = self.backoff_delay(transient_failures);
                            log::debug!(
                                target: LOG_TARGET,
                                "transient failure for {url} (attempt {attempts}): {cause}; backing off {}ms",
                                delay.as_millis()
                            );
                            FetchState::Waiting {
                                reason: WaitReason::Backoff,
                                until: self.clock.now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
                            }
                        }
                    }
                }
            };
        }
    }

    /// Issue one request and classify the response.
    async fn attempt(&self, url: &str) -> Result<AttemptOutcome> {
        let resp = match self.client.get(url).await {
            Ok(resp) => resp,
            Err(e) => {
                return Ok(AttemptOutcome::Transient {
                    status: None,
                    cause: e.to_string(),
                });
            }
        };

        let rate_limit = extract_rate_limit(resp.headers());
        let status = resp.status();

        if status.is_success() {
            let next = parse_next_link(resp.headers()).map(PageCursor);
            return match resp.json().await {
                Ok(payload) => Ok(AttemptOutcome::Done(Page { payload, next })),
                Err(e) => Ok(AttemptOutcome::Transient {
                    status: Some(status.as_u16()),
                    cause: format!("could not decode response body: {e}"),
                }),
            };
        }

        // Primary rate limit: 429, or 403 with the quota headers reporting
        // zero remaining.
        let quota_exhausted = rate_limit.as_ref().is_some_and(|info| info.remaining == 0);
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || (status == reqwest::StatusCode::FORBIDDEN && quota_exhausted)
        {
            let info = rate_limit.unwrap_or_else(|| {
                let wait = parse_retry_after(resp.headers()).map_or(DEFAULT_RATE_LIMIT_WAIT, Duration::from_secs);
                RateLimitInfo {
                    remaining: 0,
                    reset_at: self.clock.now() + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::zero()),
                }
            });
            return Ok(AttemptOutcome::RateLimited(info));
        }

        if status.is_client_error() {
            let cause = status.canonical_reason().unwrap_or("client error").to_string();
            return Err(Error::RequestRejected {
                status: status.as_u16(),
                cause,
            });
        }

        Ok(AttemptOutcome::Transient {
            status: Some(status.as_u16()),
            cause: format!("server returned {status}"),
        })
    }

    /// Exponential backoff: `base * 2^(n-1)` plus up to half the base delay
    /// of random jitter.
    fn backoff_delay(&self, failure: u32) -> Duration {
        let exponent = failure.saturating_sub(1).min(16);
        let backoff = self.policy.base_delay.saturating_mul(2u32.saturating_pow(exponent));
        let jitter_bound = u64::try_from(self.policy.base_delay.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = if jitter_bound == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_bound)
        };
        backoff + Duration::from_millis(jitter)
    }

    /// Build the absolute URL for the first page of `endpoint` with `params`.
    fn request_url(&self, endpoint: &str, params: &[(String, String)]) -> Result<String> {
        let joined = format!(
            "{}/{}",
            self.client.base_url().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        let mut url =
            Url::parse(&joined).map_err(|e| Error::Configuration(format!("invalid endpoint URL '{joined}': {e}")))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                let _ = pairs.append_pair(key, value);
            }
        }
        Ok(url.into())
    }
}
