//! Orchestration: fetch pages through the cache, normalize, and analyze.
//!
//! [`ActivityEngine`] is the façade the presentation layer talks to. It
//! fans out one paginated fetch per event kind, routes every page through
//! the single-flight response cache, merges the normalized batches, and
//! hands the result to the trend analyzer.

use crate::Result;
use crate::activity::{self, ActivityEvent, EventKind, NormalizedBatch};
use crate::cache::{RequestSignature, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::github::{Client, Page, PageCursor, RateLimitedFetcher, RepoId};
use crate::trend::{self, ActivitySummary, TrendOptions, TrendResult};
use chrono::{DateTime, Utc};
use core::time::Duration;
use futures_util::future::join_all;
use std::sync::Arc;

const LOG_TARGET: &str = "    engine";

/// The kinds fetched when the caller doesn't narrow them down.
pub const ALL_KINDS: &[EventKind] = &[
    EventKind::Commit,
    EventKind::Issue,
    EventKind::PullRequest,
    EventKind::Star,
];

/// Normalized activity for one repository, possibly partial.
#[derive(Debug, Clone)]
pub struct ActivityBatch {
    pub repo: RepoId,

    /// Events in non-decreasing timestamp order, deduplicated.
    pub events: Vec<ActivityEvent>,

    /// Sub-records the normalizer could not map.
    pub skipped: u64,

    /// Failures on individual kinds or pages. Non-empty means `events` is a
    /// partial view; history already fetched is never thrown away because a
    /// newer page failed.
    pub errors: Vec<Error>,
}

/// A full trend report for one repository.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrendReport {
    pub repo: RepoId,
    pub result: TrendResult,
    pub summary: ActivitySummary,

    /// Sub-records the normalizer could not map.
    pub skipped: u64,

    /// Rendered fetch errors, if the underlying batch was partial.
    pub errors: Vec<String>,
}

/// The activity analytics engine: rate-limited fetching, caching,
/// normalization, and trend analysis behind one façade.
///
/// Cheap to clone; clones share the response cache.
#[derive(Debug, Clone)]
pub struct ActivityEngine {
    fetcher: RateLimitedFetcher,
    cache: ResponseCache<Arc<Page>>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl ActivityEngine {
    /// Create an engine over the system clock.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine with an injected clock, for deterministic tests.
    ///
    /// The configuration is validated here, so a missing or invalid token
    /// surfaces before any fetch is attempted.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let client = Client::new(&config.token, config.base_url.clone())?;
        let fetcher = RateLimitedFetcher::new(client, config.retry, Arc::clone(&clock));
        let cache = ResponseCache::new(
            config.cache_ttl,
            config.max_cache_entries,
            config.serve_stale_on_error,
            Arc::clone(&clock),
        );

        Ok(Self {
            fetcher,
            cache,
            config,
            clock,
        })
    }

    /// Fetch and normalize activity of the given kinds since `since`.
    ///
    /// Kinds are fetched concurrently. Partial failures are collected on the
    /// batch rather than discarding events that were already normalized; the
    /// call only fails outright when every kind failed and nothing at all
    /// was fetched.
    pub async fn activity(&self, repo: &RepoId, kinds: &[EventKind], since: DateTime<Utc>) -> Result<ActivityBatch> {
        let results = join_all(kinds.iter().map(|&kind| self.fetch_kind(repo, kind, since))).await;

        let mut combined = NormalizedBatch::default();
        let mut errors = Vec::new();
        for (batch, error) in results {
            combined.merge(batch);
            if let Some(e) = error {
                errors.push(e);
            }
        }

        if combined.events.is_empty() && !errors.is_empty() && errors.len() == kinds.len() {
            return Err(errors.swap_remove(0));
        }

        log::info!(
            target: LOG_TARGET,
            "normalized {} event(s) for {repo} ({} skipped, {} error(s))",
            combined.events.len(),
            combined.skipped,
            errors.len()
        );

        Ok(ActivityBatch {
            repo: repo.clone(),
            events: combined.events,
            skipped: combined.skipped,
            errors,
        })
    }

    /// Produce a full trend report for `repo` over `[range_start, range_end)`.
    pub async fn trend(
        &self,
        repo: &RepoId,
        kinds: &[EventKind],
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        bucket_width: Duration,
    ) -> Result<TrendReport> {
        let options = TrendOptions {
            bucket_width,
            window: self.config.window,
            threshold: self.config.anomaly_threshold,
        };

        let batch = self.activity(repo, kinds, range_start).await?;
        let result = trend::analyze(&batch.events, range_start, range_end, &options)?;
        let summary = trend::summarize(&batch.events, self.clock.now());

        Ok(TrendReport {
            repo: repo.clone(),
            result,
            summary,
            skipped: batch.skipped,
            errors: batch.errors.iter().map(ToString::to_string).collect(),
        })
    }

    /// Sweep the cache: drop expired entries and enforce the size bound.
    pub fn sweep_cache(&self) {
        self.cache.sweep();
    }

    /// Fetch and normalize every page of one kind, stopping at the page cap.
    ///
    /// A failed page ends the loop but keeps the pages already normalized;
    /// the error is reported alongside the partial batch.
    async fn fetch_kind(&self, repo: &RepoId, kind: EventKind, since: DateTime<Utc>) -> (NormalizedBatch, Option<Error>) {
        let (endpoint, params) = self.request_parts(repo, kind, since);
        let repo_key = repo.to_string();

        let mut batch = NormalizedBatch::default();
        let mut cursor: Option<PageCursor> = None;
        let mut page_num = 0u32;

        loop {
            page_num += 1;
            if page_num > self.config.max_pages {
                log::debug!(
                    target: LOG_TARGET,
                    "reached page cap ({}) for {kind} in {repo}",
                    self.config.max_pages
                );
                return (batch, None);
            }

            let signature = RequestSignature::new(
                endpoint.clone(),
                params.iter().map(|(k, v)| (k.clone(), v.clone())),
                cursor.as_ref().map(|c| c.as_str().to_string()),
            );

            let fetcher = self.fetcher.clone();
            let fetch_endpoint = endpoint.clone();
            let fetch_params = params.clone();
            let fetch_cursor = cursor.clone();
            let fetched = self
                .cache
                .get_or_fetch(signature, move || async move {
                    fetcher
                        .fetch(&fetch_endpoint, &fetch_params, fetch_cursor.as_ref())
                        .await
                        .map(Arc::new)
                })
                .await;

            match fetched {
                Ok(page) => {
                    batch.merge(activity::normalize(&page.payload, kind, &repo_key));
                    match &page.next {
                        Some(next) => cursor = Some(next.clone()),
                        None => return (batch, None),
                    }
                }
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "could not fetch {kind} page {page_num} for {repo}: {e}");
                    return (batch, Some(e));
                }
            }
        }
    }

    /// Endpoint and query parameters for fetching `kind` since `since`.
    fn request_parts(&self, repo: &RepoId, kind: EventKind, since: DateTime<Utc>) -> (String, Vec<(String, String)>) {
        let per_page = ("per_page".to_string(), self.config.page_size.to_string());
        let since_param = (
            "since".to_string(),
            since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        );
        let state_all = ("state".to_string(), "all".to_string());
        let owner = repo.owner();
        let name = repo.name();

        match kind {
            EventKind::Commit => (format!("repos/{owner}/{name}/commits"), vec![per_page, since_param]),
            EventKind::Issue => (
                format!("repos/{owner}/{name}/issues"),
                vec![per_page, state_all, since_param],
            ),
            EventKind::PullRequest => (format!("repos/{owner}/{name}/pulls"), vec![per_page, state_all]),
            EventKind::Star => (format!("repos/{owner}/{name}/stargazers"), vec![per_page]),
            EventKind::Other => (format!("repos/{owner}/{name}/events"), vec![per_page]),
        }
    }
}
