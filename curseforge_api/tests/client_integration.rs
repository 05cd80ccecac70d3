use std::time::Duration;

use curseforge_api::{Client, Error, ModSearchQuery, ModSortField, Query};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
}

#[tokio::test]
async fn search_mods_success() {
    let mock_server = MockServer::start().await;
    let body = load_fixture("mods_search.json");

    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .and(header("x-api-key", "test-key"))
        .and(query_param("sortField", "3"))
        .and(query_param("index", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_string(&body))
        .mount(&mock_server)
        .await;

    let client = Client::with_base_url(&mock_server.uri(), "test-key").unwrap();
    let query = ModSearchQuery::default()
        .with_sort_field(ModSortField::LastUpdated)
        .with_index(50)
        .with_page_size(50);
    let resp = client.search_mods(&query).await.unwrap();
    assert_eq!(resp.data.len(), 2);
    assert_eq!(resp.data[0].id, 238222);
}

#[tokio::test]
async fn search_mods_server_error_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&mock_server)
        .await;

    let client = Client::with_base_url(&mock_server.uri(), "k").unwrap();
    let err = client
        .search_mods(&ModSearchQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 502, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn search_mods_rate_limited_carries_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "4"))
        .mount(&mock_server)
        .await;

    let client = Client::with_base_url(&mock_server.uri(), "k").unwrap();
    let err = client
        .search_mods(&ModSearchQuery::default())
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
}

#[tokio::test]
async fn search_mods_forbidden_is_fatal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
        .mount(&mock_server)
        .await;

    let client = Client::with_base_url(&mock_server.uri(), "k").unwrap();
    let err = client
        .search_mods(&ModSearchQuery::default())
        .await
        .unwrap_err();
    assert!(!err.is_transient());
}

#[tokio::test]
async fn search_mods_malformed_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not valid json}"))
        .mount(&mock_server)
        .await;

    let client = Client::with_base_url(&mock_server.uri(), "k").unwrap();
    let err = client
        .search_mods(&ModSearchQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn search_mods_oversized_body_is_rejected() {
    let mock_server = MockServer::start().await;
    let body = load_fixture("mods_search.json");

    Mock::given(method("GET"))
        .and(path("/v1/mods/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(&body))
        .mount(&mock_server)
        .await;

    let client = Client::with_base_url(&mock_server.uri(), "k")
        .unwrap()
        .with_max_body_bytes(256);
    let err = client
        .search_mods(&ModSearchQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BodyTooLarge { limit: 256 }));
    assert!(!err.is_transient());
}
