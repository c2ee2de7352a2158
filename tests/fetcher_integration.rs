//! Integration tests for the rate-limited fetcher against a wiremock server.

use core::time::Duration;
use repo_pulse::github::{Client, RateLimitedFetcher, RetryPolicy};
use repo_pulse::{Error, SystemClock};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_for(server: &MockServer, policy: RetryPolicy) -> RateLimitedFetcher {
    let client = Client::new("test-token", server.uri()).expect("valid client");
    RateLimitedFetcher::new(client, policy, Arc::new(SystemClock))
}

fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        max_rate_limit_wait: Duration::from_secs(5),
        max_retries: 2,
        base_delay: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn rate_limited_fetch_waits_for_reset_then_succeeds() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 2;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str()),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server, quick_policy());

    let started = Instant::now();
    let page = fetcher.fetch("repos/o/r/commits", &[], None).await.expect("succeeds after reset");
    let elapsed = started.elapsed();

    assert!(page.next.is_none());
    assert!(elapsed >= Duration::from_millis(900), "resumed too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "waited too long: {elapsed:?}");
}

#[tokio::test]
async fn rate_limit_reset_beyond_bound_fails_without_waiting() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 3600;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str()),
        )
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server, quick_policy());

    let started = Instant::now();
    let result = fetcher.fetch("repos/o/r/commits", &[], None).await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(Error::RateLimitExceeded { .. })));
    assert!(elapsed < Duration::from_secs(1), "should fail fast, took {elapsed:?}");
}

#[tokio::test]
async fn client_error_is_rejected_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/o/missing/commits"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server, quick_policy());
    let result = fetcher.fetch("repos/o/missing/commits", &[], None).await;

    assert!(matches!(result, Err(Error::RequestRejected { status: 404, .. })));
    // expect(1) is verified when the server drops: exactly one request went out.
}

#[tokio::test]
async fn transient_failures_exhaust_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3) // original request plus two retries
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server, quick_policy());
    let result = fetcher.fetch("repos/o/r/commits", &[], None).await;

    match result {
        Err(Error::FetchFailed { attempts, status, .. }) => {
            assert_eq!(attempts, 3);
            assert_eq!(status, Some(500));
        }
        other => panic!("expected FetchFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_failure_then_success_recovers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server, quick_policy());
    let page = fetcher.fetch("repos/o/r/commits", &[], None).await.expect("recovers on retry");
    assert!(page.payload.as_array().is_some_and(Vec::is_empty));
}

#[tokio::test]
async fn success_with_exhausted_quota_still_returns_the_page() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 3600;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server, quick_policy());

    let started = Instant::now();
    let page = fetcher.fetch("repos/o/r/commits", &[], None).await.expect("page delivered");
    assert!(page.next.is_none());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn link_header_becomes_the_next_cursor() {
    let server = MockServer::start().await;
    let next_url = format!("{}/repos/o/r/commits?page=2", server.uri());

    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .insert_header("link", format!("<{next_url}>; rel=\"next\"").as_str()),
        )
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server, quick_policy());
    let page = fetcher.fetch("repos/o/r/commits", &[], None).await.expect("first page");

    let cursor = page.next.expect("next cursor present");
    assert_eq!(cursor.as_str(), next_url);
}
