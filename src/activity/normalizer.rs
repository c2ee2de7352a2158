//! Converts raw GitHub payloads into uniform [`ActivityEvent`] records.
//!
//! Each [`EventKind`] has its own field-mapping function. Malformed
//! sub-records are skipped and counted rather than failing the batch, so a
//! systematic parsing problem shows up as a diagnostic instead of an error.

use super::event::{ActivityEvent, EventKind};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;

const LOG_TARGET: &str = " normalize";

/// Default weight for a normalized event.
const DEFAULT_WEIGHT: f64 = 1.0;

/// Events produced from one or more raw payloads, plus a count of
/// sub-records that could not be mapped.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    /// Deduplicated events in non-decreasing timestamp order.
    pub events: Vec<ActivityEvent>,

    /// Sub-records that could not be mapped.
    pub skipped: u64,
}

impl NormalizedBatch {
    /// Fold `other` into this batch, dropping events already present by
    /// identity and restoring timestamp order if the merge violated it.
    pub fn merge(&mut self, other: Self) {
        self.events.extend(other.events);
        self.skipped += other.skipped;
        dedup_events(&mut self.events);
        ensure_sorted(&mut self.events);
    }
}

/// Normalize a raw list payload of the given kind into events for `repo`.
///
/// The payload must be the provider's JSON array form; anything else counts
/// as one skipped record. Events are deduplicated by `(kind, repo, id)` and
/// returned in non-decreasing timestamp order, so normalizing the same
/// payload twice can never hand duplicates to the analyzer.
#[must_use]
pub fn normalize(payload: &Value, kind: EventKind, repo: &str) -> NormalizedBatch {
    let Some(items) = payload.as_array() else {
        log::warn!(target: LOG_TARGET, "expected an array payload for {kind} events in {repo}");
        return NormalizedBatch {
            events: Vec::new(),
            skipped: 1,
        };
    };

    let mut batch = NormalizedBatch::default();
    for item in items {
        match map_record(item, kind, repo) {
            Some(event) => batch.events.push(event),
            None => {
                batch.skipped += 1;
                log::debug!(target: LOG_TARGET, "skipping malformed {kind} record in {repo}");
            }
        }
    }

    dedup_events(&mut batch.events);
    ensure_sorted(&mut batch.events);
    batch
}

/// Drop events whose identity was already seen, keeping first occurrences.
pub fn dedup_events(events: &mut Vec<ActivityEvent>) {
    let mut seen: HashSet<(EventKind, String, String)> = HashSet::with_capacity(events.len());
    events.retain(|event| seen.insert((event.kind, event.repo.clone(), event.id.clone())));
}

/// Restore the non-decreasing timestamp invariant if it was violated.
fn ensure_sorted(events: &mut [ActivityEvent]) {
    if !events.is_sorted_by_key(|event| event.timestamp) {
        events.sort_by_key(|event| event.timestamp);
    }
}

/// Dispatch to the mapper for `kind`.
fn map_record(item: &Value, kind: EventKind, repo: &str) -> Option<ActivityEvent> {
    match kind {
        EventKind::Commit => map_commit(item, repo),
        EventKind::Issue => map_issue(item, repo),
        EventKind::PullRequest => map_pull_request(item, repo),
        EventKind::Star => map_star(item, repo),
        EventKind::Other => map_other(item, repo),
    }
}

/// Parse an RFC 3339 timestamp into UTC.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    DateTime::parse_from_rfc3339(raw).ok().map(|ts| ts.with_timezone(&Utc))
}

/// Stringify an id that the provider reports as either a string or a number.
fn string_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn build(kind: EventKind, repo: &str, id: String, timestamp: DateTime<Utc>, actor: &str) -> ActivityEvent {
    ActivityEvent {
        kind,
        timestamp,
        actor: actor.to_string(),
        repo: repo.to_string(),
        id,
        weight: DEFAULT_WEIGHT,
    }
}

/// `/commits` records: id from `sha`, timestamp from the author line of the
/// underlying commit, actor from the linked account when present.
fn map_commit(item: &Value, repo: &str) -> Option<ActivityEvent> {
    let id = string_id(item.get("sha")?)?;
    let timestamp = parse_timestamp(item.get("commit")?.get("author")?.get("date")?)?;
    let actor = item
        .get("author")
        .and_then(|author| author.get("login"))
        .or_else(|| item.get("commit").and_then(|c| c.get("author")).and_then(|a| a.get("name")))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    Some(build(EventKind::Commit, repo, id, timestamp, actor))
}

/// `/issues` records. The issues endpoint interleaves pull requests; records
/// carrying the `pull_request` marker are mapped as such, so identity dedup
/// lines them up with `/pulls` pages instead of double-counting.
fn map_issue(item: &Value, repo: &str) -> Option<ActivityEvent> {
    let kind = if item.get("pull_request").is_some_and(|marker| !marker.is_null()) {
        EventKind::PullRequest
    } else {
        EventKind::Issue
    };
    map_numbered(item, kind, repo)
}

fn map_pull_request(item: &Value, repo: &str) -> Option<ActivityEvent> {
    map_numbered(item, EventKind::PullRequest, repo)
}

/// Issues and pull requests share their shape: `number`, `created_at`, `user`.
fn map_numbered(item: &Value, kind: EventKind, repo: &str) -> Option<ActivityEvent> {
    let id = string_id(item.get("number").or_else(|| item.get("id"))?)?;
    let timestamp = parse_timestamp(item.get("created_at")?)?;
    let actor = item
        .get("user")
        .and_then(|user| user.get("login"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    Some(build(kind, repo, id, timestamp, actor))
}

/// `/stargazers` records with the `star+json` media type: one star per user,
/// so the user login doubles as the id.
fn map_star(item: &Value, repo: &str) -> Option<ActivityEvent> {
    let timestamp = parse_timestamp(item.get("starred_at")?)?;
    let actor = item.get("user").and_then(|user| user.get("login")).and_then(Value::as_str)?;
    Some(build(EventKind::Star, repo, actor.to_string(), timestamp, actor))
}

/// Fallback mapper for payloads this engine has no dedicated shape for.
fn map_other(item: &Value, repo: &str) -> Option<ActivityEvent> {
    let id = string_id(item.get("id").or_else(|| item.get("node_id"))?)?;
    let timestamp = parse_timestamp(item.get("created_at").or_else(|| item.get("timestamp"))?)?;
    let actor = item
        .get("actor")
        .and_then(|actor| actor.get("login"))
        .or_else(|| item.get("user").and_then(|user| user.get("login")))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    Some(build(EventKind::Other, repo, id, timestamp, actor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REPO: &str = "octocat/hello-world";

    fn commit_record(sha: &str, date: &str, login: &str) -> Value {
        json!({
            "sha": sha,
            "commit": { "author": { "name": login, "date": date } },
            "author": { "login": login }
        })
    }

    #[test]
    fn maps_well_formed_commit() {
        let payload = json!([commit_record("abc123", "2024-03-01T10:00:00Z", "octocat")]);
        let batch = normalize(&payload, EventKind::Commit, REPO);

        assert_eq!(batch.skipped, 0);
        assert_eq!(batch.events.len(), 1);
        let event = &batch.events[0];
        assert_eq!(event.kind, EventKind::Commit);
        assert_eq!(event.id, "abc123");
        assert_eq!(event.actor, "octocat");
        assert_eq!(event.repo, REPO);
        assert_eq!(event.timestamp.timestamp(), 1_709_287_200);
        assert!((event.weight - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unparsable_timestamp_is_skipped_not_fatal() {
        let payload = json!([
            commit_record("good", "2024-03-01T10:00:00Z", "octocat"),
            commit_record("bad", "not-a-timestamp", "octocat"),
        ]);
        let batch = normalize(&payload, EventKind::Commit, REPO);

        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.events[0].id, "good");
    }

    #[test]
    fn non_array_payload_counts_as_one_skip() {
        let payload = json!({ "message": "Not Found" });
        let batch = normalize(&payload, EventKind::Commit, REPO);
        assert!(batch.events.is_empty());
        assert_eq!(batch.skipped, 1);
    }

    #[test]
    fn normalizing_twice_produces_no_duplicates() {
        let payload = json!([commit_record("abc123", "2024-03-01T10:00:00Z", "octocat")]);

        let mut first = normalize(&payload, EventKind::Commit, REPO);
        let second = normalize(&payload, EventKind::Commit, REPO);
        first.merge(second);

        assert_eq!(first.events.len(), 1);
    }

    #[test]
    fn duplicate_records_within_one_payload_are_deduplicated() {
        let payload = json!([
            commit_record("abc123", "2024-03-01T10:00:00Z", "octocat"),
            commit_record("abc123", "2024-03-01T10:00:00Z", "octocat"),
        ]);
        let batch = normalize(&payload, EventKind::Commit, REPO);
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.skipped, 0);
    }

    #[test]
    fn issue_with_pull_request_marker_maps_as_pull_request() {
        let payload = json!([
            {
                "number": 7,
                "created_at": "2024-03-01T10:00:00Z",
                "user": { "login": "octocat" }
            },
            {
                "number": 8,
                "created_at": "2024-03-01T11:00:00Z",
                "user": { "login": "octocat" },
                "pull_request": { "url": "https://api.github.com/repos/o/r/pulls/8" }
            }
        ]);
        let batch = normalize(&payload, EventKind::Issue, REPO);

        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].kind, EventKind::Issue);
        assert_eq!(batch.events[1].kind, EventKind::PullRequest);
    }

    #[test]
    fn pr_from_issues_page_dedups_against_pulls_page() {
        let issues_page = json!([
            {
                "number": 8,
                "created_at": "2024-03-01T11:00:00Z",
                "user": { "login": "octocat" },
                "pull_request": { "url": "https://api.github.com/repos/o/r/pulls/8" }
            }
        ]);
        let pulls_page = json!([
            {
                "number": 8,
                "created_at": "2024-03-01T11:00:00Z",
                "user": { "login": "octocat" }
            }
        ]);

        let mut batch = normalize(&issues_page, EventKind::Issue, REPO);
        batch.merge(normalize(&pulls_page, EventKind::PullRequest, REPO));

        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].kind, EventKind::PullRequest);
    }

    #[test]
    fn maps_star_record_with_starred_timestamp() {
        let payload = json!([
            { "starred_at": "2024-03-02T09:30:00Z", "user": { "login": "stargazer" } }
        ]);
        let batch = normalize(&payload, EventKind::Star, REPO);

        assert_eq!(batch.events.len(), 1);
        let event = &batch.events[0];
        assert_eq!(event.kind, EventKind::Star);
        assert_eq!(event.actor, "stargazer");
        assert_eq!(event.id, "stargazer");
    }

    #[test]
    fn star_without_user_is_skipped() {
        let payload = json!([{ "starred_at": "2024-03-02T09:30:00Z" }]);
        let batch = normalize(&payload, EventKind::Star, REPO);
        assert!(batch.events.is_empty());
        assert_eq!(batch.skipped, 1);
    }

    #[test]
    fn commit_without_linked_account_falls_back_to_author_name() {
        let payload = json!([
            {
                "sha": "abc123",
                "commit": { "author": { "name": "Jane Dev", "date": "2024-03-01T10:00:00Z" } },
                "author": null
            }
        ]);
        let batch = normalize(&payload, EventKind::Commit, REPO);
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].actor, "Jane Dev");
    }

    #[test]
    fn out_of_order_records_are_resorted() {
        let payload = json!([
            commit_record("later", "2024-03-02T10:00:00Z", "octocat"),
            commit_record("earlier", "2024-03-01T10:00:00Z", "octocat"),
        ]);
        let batch = normalize(&payload, EventKind::Commit, REPO);

        assert_eq!(batch.events.len(), 2);
        assert!(batch.events[0].timestamp <= batch.events[1].timestamp);
        assert_eq!(batch.events[0].id, "earlier");
    }

    #[test]
    fn merge_restores_order_across_pages() {
        let newer_page = json!([commit_record("c2", "2024-03-05T00:00:00Z", "octocat")]);
        let older_page = json!([commit_record("c1", "2024-03-01T00:00:00Z", "octocat")]);

        let mut batch = normalize(&newer_page, EventKind::Commit, REPO);
        batch.merge(normalize(&older_page, EventKind::Commit, REPO));

        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].id, "c1");
        assert_eq!(batch.events[1].id, "c2");
    }

    #[test]
    fn timestamps_are_normalized_to_utc() {
        let payload = json!([commit_record("abc", "2024-03-01T12:00:00+02:00", "octocat")]);
        let batch = normalize(&payload, EventKind::Commit, REPO);
        assert_eq!(batch.events[0].timestamp.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn other_kind_uses_generic_fields() {
        let payload = json!([
            {
                "id": 99,
                "created_at": "2024-03-01T10:00:00Z",
                "actor": { "login": "octocat" }
            }
        ]);
        let batch = normalize(&payload, EventKind::Other, REPO);
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].id, "99");
        assert_eq!(batch.events[0].actor, "octocat");
    }
}
