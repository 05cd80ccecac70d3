use std::time::Duration;

use addonpulse_lib::curseforge_api::Client;
use addonpulse_lib::{ModSearchQuery, ResilientClient, RetryConfig, UpstreamConfig, UpstreamError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config(max_attempts: u32, breaker_threshold: u32) -> UpstreamConfig {
    UpstreamConfig {
        retry: RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        breaker_threshold,
        request_delay: Duration::ZERO,
    }
}

fn client_for(server: &MockServer, config: UpstreamConfig) -> ResilientClient {
    let inner = Client::with_base_url(&server.uri(), "test-key").unwrap();
    ResilientClient::new(inner, config)
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/mods_search.json")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_config(3, 10));
    let page = client.fetch_page(&ModSearchQuery::default()).await.unwrap();
    assert_eq!(page.data.len(), 2);

    let stats = client.tracker().summary();
    assert_eq!(stats.requests_made, 3);
    assert_eq!(stats.requests_transient, 2);
    assert_eq!(stats.requests_succeeded, 1);
    assert_eq!(client.breaker().failures(), 0, "success resets the breaker");
}

#[tokio::test]
async fn exhausted_retries_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_config(3, 10));
    let err = client
        .fetch_page(&ModSearchQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Transient { attempts: 3, .. }));
    assert!(!err.aborts_strategy());
}

#[tokio::test]
async fn fatal_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_config(3, 10));
    let err = client
        .fetch_page(&ModSearchQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Fatal(_)));
    assert!(err.aborts_strategy());
    assert_eq!(client.breaker().failures(), 0);
}

#[tokio::test]
async fn malformed_body_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"data\": [oops"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_config(3, 10));
    let err = client
        .fetch_page(&ModSearchQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Fatal(_)));
}

#[tokio::test]
async fn retry_after_takes_precedence_over_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/mods_search_empty.json")),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, fast_config(3, 10));
    let page = client.fetch_page(&ModSearchQuery::default()).await.unwrap();
    assert!(page.data.is_empty());

    let stats = client.tracker().summary();
    assert!(
        stats.total_backoff_secs >= 1.0,
        "waited {}s, expected the server's 1s",
        stats.total_backoff_secs
    );
}

#[tokio::test]
async fn breaker_opens_after_consecutive_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(502))
        .expect(10)
        .mount(&server)
        .await;

    let client = client_for(&server, fast_config(3, 10));
    let query = ModSearchQuery::default();

    // Three requests exhaust their retries: nine consecutive failures.
    for _ in 0..3 {
        let err = client.fetch_page(&query).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transient { .. }));
    }
    assert!(!client.breaker().is_open());

    // The tenth failure opens the circuit mid-retry.
    let err = client.fetch_page(&query).await.unwrap_err();
    assert!(matches!(err, UpstreamError::CircuitOpen { failures: 10 }));

    // No further network traffic once open.
    let err = client.fetch_page(&query).await.unwrap_err();
    assert!(matches!(err, UpstreamError::CircuitOpen { .. }));
    assert!(err.aborts_strategy());

    let stats = client.tracker().summary();
    assert_eq!(stats.requests_made, 10);
    assert_eq!(stats.short_circuited, 2);
}

#[tokio::test]
async fn oversized_body_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .expect(1)
        .mount(&server)
        .await;

    let inner = Client::with_base_url(&server.uri(), "k")
        .unwrap()
        .with_max_body_bytes(1024);
    let client = ResilientClient::new(inner, fast_config(3, 10));
    let err = client
        .fetch_page(&ModSearchQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UpstreamError::Fatal(addonpulse_lib::curseforge_api::Error::BodyTooLarge { .. })
    ));
}
