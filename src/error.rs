//! Error taxonomy for the activity engine.

use core::time::Duration;

/// Errors surfaced by the engine.
///
/// Cloneable so a single failure can fan out to every caller coalesced onto
/// the same in-flight fetch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The remote API quota is exhausted and its reset lies beyond the
    /// configured maximum wait.
    #[error("rate limit exceeded: reset in {reset_in:?} exceeds maximum wait of {max_wait:?}")]
    RateLimitExceeded {
        /// Time remaining until the provider resets the quota.
        reset_in: Duration,

        /// The wait bound that was exceeded.
        max_wait: Duration,
    },

    /// Retries were exhausted on a transient fault.
    #[error("fetch failed after {attempts} attempt(s): {cause}")]
    FetchFailed {
        /// Total number of requests issued, including the original.
        attempts: u32,

        /// HTTP status of the final attempt, if a response was received.
        status: Option<u16>,

        /// Description of the final failure.
        cause: String,
    },

    /// The server rejected the request with a non-retryable client error.
    #[error("request rejected with status {status}: {cause}")]
    RequestRejected {
        /// The HTTP status code returned by the server.
        status: u16,

        /// Description of the rejection.
        cause: String,
    },

    /// Missing or invalid credential or parameter.
    #[error("configuration error: {0}")]
    Configuration(String),
}
