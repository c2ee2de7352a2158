//! GitHub API access: repository coordinates, the HTTP client, and the
//! rate-limited page fetcher.

mod client;
mod fetcher;

pub use client::{Client, RateLimitInfo};
pub use fetcher::{Page, PageCursor, RateLimitedFetcher, RetryPolicy};

use crate::Result;
use crate::error::Error;

/// Coordinates of a repository on the provider: owner plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// Create a repo id from its owner and name.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let name = name.into();
        if owner.is_empty() || name.is_empty() || owner.contains('/') || name.contains('/') {
            return Err(Error::Configuration(format!(
                "invalid repository coordinates '{owner}/{name}'"
            )));
        }
        Ok(Self { owner, name })
    }

    /// The account that owns the repository.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl core::fmt::Display for RepoId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl core::str::FromStr for RepoId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((owner, name)) = s.split_once('/') else {
            return Err(Error::Configuration(format!(
                "expected repository as owner/name, got '{s}'"
            )));
        };
        Self::new(owner, name)
    }
}

impl serde::Serialize for RepoId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
