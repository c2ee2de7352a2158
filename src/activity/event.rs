//! Normalized activity records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a normalized event represents.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Commit,
    Issue,
    PullRequest,
    Star,
    Other,
}

/// A single normalized activity record.
///
/// Produced only by the normalizer; immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub kind: EventKind,

    /// When the activity happened, in UTC.
    pub timestamp: DateTime<Utc>,

    /// Who performed it: account login, or author name as a fallback.
    pub actor: String,

    /// The repository the activity belongs to, as `owner/name`.
    pub repo: String,

    /// Provider-supplied id, unique within `(kind, repo)`.
    pub id: String,

    /// Aggregation weight; 1.0 unless a mapper says otherwise.
    pub weight: f64,
}

impl ActivityEvent {
    /// Identity used for deduplication.
    #[must_use]
    pub fn identity(&self) -> (EventKind, &str, &str) {
        (self.kind, self.repo.as_str(), self.id.as_str())
    }
}
