//! Request executor behaviour against a mock API: caching, backoff, rate limits

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use stock_insights::api::{AttemptError, Endpoint, FetchError, CACHE_INDICATOR_HEADER};
use stock_insights::clock::ManualClock;
use stock_insights::models::{Config, PeRatio};
use stock_insights::{FinancialDataProvider, StockApiClient};

use crate::common::logging::log_test_step;
use crate::common::{fixtures, request_count, MockApi};

const PE_PATH: &str = "/api/pe_ratio/AAPL";

#[tokio::test]
async fn test_fresh_cache_entry_skips_network() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::pe_ratio("AAPL")))
        .expect(1)
        .mount(&api.server)
        .await;

    let first = api.client.get_pe_ratio("AAPL").await.unwrap();
    assert!(!first.served_from_cache);
    assert_eq!(first.value.pe_ratio, Some(28.4));

    api.clock.advance(Duration::from_secs(60 * 60));
    let second = api.client.get_pe_ratio("AAPL").await.unwrap();

    assert!(second.served_from_cache);
    assert_eq!(second.value, first.value);
    assert_eq!(request_count(&api.server).await, 1);
}

#[tokio::test]
async fn test_server_cache_header_sets_provenance() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(fixtures::pe_ratio("AAPL"))
                .insert_header(CACHE_INDICATOR_HEADER, "true"),
        )
        .mount(&api.server)
        .await;

    let outcome = api.client.get_pe_ratio("AAPL").await.unwrap();

    assert!(outcome.served_from_cache);
    assert_eq!(request_count(&api.server).await, 1);
}

#[tokio::test]
async fn test_entry_exactly_ttl_old_is_refetched() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::pe_ratio("AAPL")))
        .expect(2)
        .mount(&api.server)
        .await;

    let client = api.client.with_cache_ttl(Duration::from_secs(60));
    client.get_pe_ratio("AAPL").await.unwrap();

    api.clock.advance(Duration::from_secs(59));
    assert!(client.get_pe_ratio("AAPL").await.unwrap().served_from_cache);

    api.clock.advance(Duration::from_secs(1));
    let refreshed = client.get_pe_ratio("AAPL").await.unwrap();

    assert!(!refreshed.served_from_cache);
    assert_eq!(request_count(&api.server).await, 2);
}

#[tokio::test]
async fn test_backoff_delays_between_attempts() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::pe_ratio("AAPL")))
        .mount(&api.server)
        .await;

    let outcome = api.client.get_pe_ratio("AAPL").await.unwrap();

    assert!(!outcome.served_from_cache);
    assert_eq!(
        api.clock.sleeps(),
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );
    assert_eq!(request_count(&api.server).await, 3);
}

#[tokio::test]
async fn test_exhaustion_reports_attempts_and_last_error() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_json(fixtures::error_body("upstream quota exhausted")))
        .mount(&api.server)
        .await;

    let err = api.client.get_pe_ratio("AAPL").await.unwrap_err();

    assert_eq!(err.to_string(), "Failed after 3 attempts: upstream quota exhausted");
    assert_matches!(
        err,
        FetchError::Exhausted {
            attempts: 3,
            last: AttemptError::Status { status: 503, .. }
        }
    );
    assert_eq!(request_count(&api.server).await, 3);
    assert!(api.client.executor().cache().is_empty(), "failures must not be cached");
}

#[tokio::test]
async fn test_status_text_used_without_error_body() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string("<html>nope</html>"))
        .mount(&api.server)
        .await;

    let err = api.client.get_pe_ratio("AAPL").await.unwrap_err();

    assert_eq!(err.to_string(), "Failed after 3 attempts: API error: 404 Not Found");
}

#[tokio::test]
async fn test_rate_limit_does_not_consume_attempts() {
    log_test_step("429, 429, 200 with a three-attempt budget");
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::pe_ratio("AAPL")))
        .mount(&api.server)
        .await;

    let outcome = api.client.get_pe_ratio("AAPL").await.unwrap();

    assert_eq!(outcome.value.ticker.as_deref(), Some("AAPL"));
    assert_eq!(request_count(&api.server).await, 3);
    // Server hint first, then the 5 second default; no backoff delays
    assert_eq!(
        api.clock.sleeps(),
        vec![Duration::from_secs(2), Duration::from_secs(5)]
    );
}

#[tokio::test]
async fn test_rate_limit_between_failures_keeps_budget() {
    let api = MockApi::start().await;
    for status in [500, 429, 500] {
        Mock::given(method("GET"))
            .and(path(PE_PATH))
            .respond_with(ResponseTemplate::new(status))
            .up_to_n_times(1)
            .mount(&api.server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::pe_ratio("AAPL")))
        .mount(&api.server)
        .await;

    api.client.get_pe_ratio("AAPL").await.unwrap();

    assert_eq!(request_count(&api.server).await, 4);
    assert_eq!(
        api.clock.sleeps(),
        vec![
            Duration::from_millis(1000),
            Duration::from_secs(5),
            Duration::from_millis(2000)
        ]
    );
}

#[tokio::test]
async fn test_endless_rate_limiting_is_capped() {
    let api = MockApi::start_with(|config| config.max_rate_limit_waits = 2).await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .mount(&api.server)
        .await;

    let err = api.client.get_pe_ratio("AAPL").await.unwrap_err();

    assert_eq!(err, FetchError::RateLimitExceeded { waits: 2 });
    assert_eq!(request_count(&api.server).await, 3);
}

#[tokio::test]
async fn test_undecodable_body_counts_as_failed_attempt() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .up_to_n_times(1)
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::pe_ratio("AAPL")))
        .mount(&api.server)
        .await;

    let outcome = api.client.get_pe_ratio("AAPL").await.unwrap();

    assert_eq!(outcome.value.industry_pe_ratio, Some(24.0));
    assert_eq!(api.clock.sleeps(), vec![Duration::from_millis(1000)]);
}

#[tokio::test]
async fn test_failed_refresh_keeps_stale_entry() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::pe_ratio("AAPL")))
        .up_to_n_times(1)
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(502))
        .mount(&api.server)
        .await;

    let client = api.client.with_cache_ttl(Duration::from_secs(10));
    client.get_pe_ratio("AAPL").await.unwrap();
    api.clock.advance(Duration::from_secs(30));

    assert!(client.get_pe_ratio("AAPL").await.is_err());

    // The stale entry is still there and fresh under a longer window
    let cache = client.executor().cache();
    assert_eq!(cache.len(), 1);
    let longer = client.with_cache_ttl(Duration::from_secs(3600));
    assert!(longer.get_pe_ratio("AAPL").await.unwrap().served_from_cache);
}

#[tokio::test]
async fn test_concurrent_identical_fetches_both_hit_network() {
    let api = MockApi::start().await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(fixtures::pe_ratio("AAPL"))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&api.server)
        .await;

    let executor = api.client.executor();
    let key = executor.key_for(&Endpoint::new("pe_ratio").segment("AAPL")).unwrap();
    let ttl = Duration::from_secs(60);

    let (a, b) = futures::future::join(
        executor.execute::<PeRatio>(&key, ttl),
        executor.execute::<PeRatio>(&key, ttl),
    )
    .await;

    assert!(!a.unwrap().served_from_cache);
    assert!(!b.unwrap().served_from_cache);
    assert_eq!(request_count(&api.server).await, 2);
    assert_eq!(executor.cache().len(), 1);
}

#[tokio::test]
async fn test_connection_failures_are_retried_then_exhausted() {
    // Nothing listens on the discard port
    let config = Config::with_base_url("http://127.0.0.1:9/api").unwrap();
    let clock = Arc::new(ManualClock::default());
    let client = StockApiClient::with_clock(&config, clock.clone()).unwrap();

    let err = client.get_pe_ratio("AAPL").await.unwrap_err();

    assert_matches!(
        err,
        FetchError::Exhausted {
            attempts: 3,
            last: AttemptError::Transport(_)
        }
    );
    assert!(err.to_string().starts_with("Failed after 3 attempts: network error:"));
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(1000), Duration::from_millis(2000)]
    );
    assert!(client.executor().cache().is_empty());
}

#[tokio::test]
async fn test_pacing_applies_to_network_attempts_only() {
    let api = MockApi::start_with(|config| config.rate_limit_per_minute = Some(1)).await;
    Mock::given(method("GET"))
        .and(path(PE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::pe_ratio("AAPL")))
        .mount(&api.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/balance_sheet/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::balance_sheet("AAPL")))
        .mount(&api.server)
        .await;

    // Uses the only permit for this minute
    api.client.get_pe_ratio("AAPL").await.unwrap();

    // A cache hit needs no permit
    let cached = tokio::time::timeout(Duration::from_millis(200), api.client.get_pe_ratio("AAPL"))
        .await
        .expect("cache hit must not wait on the limiter")
        .unwrap();
    assert!(cached.served_from_cache);

    // A new resource has to wait for the next permit
    let blocked = tokio::time::timeout(Duration::from_millis(500), api.client.get_balance_sheet("AAPL")).await;
    assert!(blocked.is_err(), "second network fetch should still be paced");
    assert_eq!(request_count(&api.server).await, 1);
}
