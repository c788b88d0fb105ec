//! Tests for the HTTP client module

use super::*;
use crate::auth::{AuthConfig, AuthProvider, RequestInfo};
use crate::error::Error;
use crate::types::BackoffType;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config(base_url: &str, max_retries: u32) -> HttpClientConfig {
    HttpClientConfig::builder()
        .base_url(base_url)
        .max_retries(max_retries)
        .backoff(
            BackoffType::Exponential,
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
        .build()
}

fn client(base_url: &str, max_retries: u32) -> HttpClient {
    HttpClient::new(
        fast_config(base_url, max_retries),
        &TransportConfig::default(),
        AuthConfig::None,
    )
    .unwrap()
}

#[test]
fn test_http_client_config_builder() {
    let config = HttpClientConfig::builder()
        .base_url("https://api.example.com")
        .max_retries(7)
        .backoff(
            BackoffType::Linear,
            Duration::from_millis(200),
            Duration::from_secs(30),
        )
        .header("X-Custom", "value")
        .rate_limit(RateLimiterConfig::new(2, 1))
        .build();

    assert_eq!(config.base_url, "https://api.example.com");
    assert_eq!(config.max_retries, 7);
    assert_eq!(config.backoff_type, BackoffType::Linear);
    assert_eq!(config.initial_backoff, Duration::from_millis(200));
    assert_eq!(config.max_backoff, Duration::from_secs(30));
    assert_eq!(
        config.default_headers.get("X-Custom"),
        Some(&"value".to_string())
    );
    assert!(config.rate_limit.is_some());
}

#[test]
fn test_calculate_backoff() {
    let config = HttpClientConfig::builder()
        .base_url("https://api.example.com")
        .backoff(
            BackoffType::Exponential,
            Duration::from_millis(100),
            Duration::from_millis(700),
        )
        .build();
    let client =
        HttpClient::new(config, &TransportConfig::default(), AuthConfig::None).unwrap();

    assert_eq!(client.calculate_backoff(0), Duration::from_millis(100));
    assert_eq!(client.calculate_backoff(1), Duration::from_millis(200));
    assert_eq!(client.calculate_backoff(2), Duration::from_millis(400));
    // Capped at max_backoff
    assert_eq!(client.calculate_backoff(3), Duration::from_millis(700));
    assert_eq!(client.calculate_backoff(40), Duration::from_millis(700));
}

#[test]
fn test_invalid_base_url() {
    let config = HttpClientConfig::builder().base_url("not a url").build();
    let result = HttpClient::new(config, &TransportConfig::default(), AuthConfig::None);
    assert!(matches!(result, Err(Error::InvalidUrl(_))));
}

#[test]
fn test_parse_retry_after() {
    let mut headers = HeaderMap::new();
    assert_eq!(parse_retry_after(&headers), None);

    headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
    assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

    // A date in the past means "retry now"
    headers.insert(
        RETRY_AFTER,
        HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
    );
    assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));

    headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
    assert_eq!(parse_retry_after(&headers), None);
}

#[tokio::test]
async fn test_get_json_with_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/item/"))
        .and(query_param("page_size", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"id": 1}]
        })))
        .mount(&server)
        .await;

    let client = client(&server.uri(), 0);
    let query = vec![("page_size".to_string(), "10".to_string())];
    let body: serde_json::Value = client
        .get_json("/item/", &query, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(body["results"][0]["id"], 1);
}

#[tokio::test]
async fn test_default_headers_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("X-Tenant", "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .header("X-Tenant", "acme")
        .build();
    let client =
        HttpClient::new(config, &TransportConfig::default(), AuthConfig::None).unwrap();

    client
        .get("/", &[], &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_retry_on_503_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let client = client(&server.uri(), 3);
    let response = client
        .get("/flaky", &[], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.retries, 2);
    assert_eq!(client.total_retries(), 2);
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 2);
    let err = client
        .get("/down", &[], &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::MaxRetriesExceeded {
            max_retries,
            last_error,
        } => {
            assert_eq!(max_retries, 2);
            assert!(last_error.contains("500"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_retries_counted_when_budget_runs_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 2);
    let mut retries = 0;
    let err = client
        .get_counted("/down", &[], &CancellationToken::new(), &mut retries)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MaxRetriesExceeded { .. }));
    assert_eq!(retries, 2);
    assert_eq!(client.total_retries(), 2);
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server.uri(), 3);
    let err = client
        .get("/missing", &[], &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn test_rate_limited_honours_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let client = client(&server.uri(), 2);
    let response = client
        .get("/limited", &[], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.retries, 1);
}

#[tokio::test]
async fn test_retry_after_capped_by_max_backoff() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "86400"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let client = client(&server.uri(), 2);
    let response = tokio::time::timeout(
        Duration::from_secs(5),
        client.get("/limited", &[], &CancellationToken::new()),
    )
    .await
    .expect("a day-long Retry-After is capped")
    .unwrap();
    assert_eq!(response.retries, 1);
}

#[tokio::test]
async fn test_cancelled_before_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let client = client(&server.uri(), 2);
    let err = client.get("/anything", &[], &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

/// Auth provider that hands out a new token on every refresh
struct RotatingAuth {
    generation: AtomicU32,
    refreshable: bool,
}

#[async_trait]
impl AuthProvider for RotatingAuth {
    async fn headers_for(&self, _request: &RequestInfo<'_>) -> crate::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let token = format!("Bearer token-{}", self.generation.load(Ordering::SeqCst));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&token).unwrap());
        Ok(headers)
    }

    async fn refresh(&self) -> crate::Result<bool> {
        if self.refreshable {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.refreshable)
    }
}

#[tokio::test]
async fn test_unauthorized_refreshes_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("Authorization", "Bearer token-0"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("Authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(RotatingAuth {
        generation: AtomicU32::new(0),
        refreshable: true,
    });
    let transport = Arc::new(ReqwestTransport::new(&TransportConfig::default()).unwrap());
    let client = HttpClient::with_parts(fast_config(&server.uri(), 0), transport, auth).unwrap();

    let response = client
        .get("/secure", &[], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_unauthorized_without_refresh_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secure"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(RotatingAuth {
        generation: AtomicU32::new(0),
        refreshable: false,
    });
    let transport = Arc::new(ReqwestTransport::new(&TransportConfig::default()).unwrap());
    let client = HttpClient::with_parts(fast_config(&server.uri(), 3), transport, auth).unwrap();

    let err = client
        .get("/secure", &[], &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth { .. }));
    assert_eq!(err.scope(), crate::error::ErrorScope::Run);
}
