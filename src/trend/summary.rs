//! Trailing-window activity counts.

use crate::activity::{ActivityEvent, EventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counts of events over trailing time windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub last_7_days: u64,
    pub last_30_days: u64,
    pub total: u64,
}

/// Per-kind windowed counts for one repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivitySummary {
    pub commits: WindowCounts,
    pub issues: WindowCounts,
    pub pull_requests: WindowCounts,
    pub stars: WindowCounts,
    pub other: WindowCounts,
}

impl ActivitySummary {
    /// The counts for `kind`.
    #[must_use]
    pub const fn for_kind(&self, kind: EventKind) -> &WindowCounts {
        match kind {
            EventKind::Commit => &self.commits,
            EventKind::Issue => &self.issues,
            EventKind::PullRequest => &self.pull_requests,
            EventKind::Star => &self.stars,
            EventKind::Other => &self.other,
        }
    }
}

/// Count `events` into per-kind trailing windows anchored at `now`.
#[must_use]
pub fn summarize(events: &[ActivityEvent], now: DateTime<Utc>) -> ActivitySummary {
    let cutoff_7 = now - chrono::Duration::days(7);
    let cutoff_30 = now - chrono::Duration::days(30);

    let mut summary = ActivitySummary::default();
    for event in events {
        let counts = match event.kind {
            EventKind::Commit => &mut summary.commits,
            EventKind::Issue => &mut summary.issues,
            EventKind::PullRequest => &mut summary.pull_requests,
            EventKind::Star => &mut summary.stars,
            EventKind::Other => &mut summary.other,
        };
        increment_window(counts, event.timestamp, cutoff_7, cutoff_30);
    }
    summary
}

/// Increment trailing-window counters for a given timestamp.
fn increment_window(counts: &mut WindowCounts, ts: DateTime<Utc>, cutoff_7: DateTime<Utc>, cutoff_30: DateTime<Utc>) {
    counts.total += 1;
    if ts >= cutoff_30 {
        counts.last_30_days += 1;
        if ts >= cutoff_7 {
            counts.last_7_days += 1;
        }
    }
}
