//! HTTP client with retry and rate limiting
//!
//! Wraps a [`Transport`] and handles:
//! - Automatic retries with configurable backoff for 5xx and network errors
//! - `Retry-After` aware handling of 429 responses
//! - One credential refresh and retry after a 401
//! - Rate limiting shared across all entities
//! - Cancellation of in-flight requests and backoff sleeps

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use super::transport::{RawResponse, ReqwestTransport, Transport, TransportConfig};
use crate::auth::{AuthConfig, AuthProvider, Authenticator, RequestInfo};
use crate::error::{Error, Result};
use crate::types::BackoffType;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for all relative paths
    pub base_url: String,
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            backoff_type: BackoffType::Exponential,
            rate_limit: None,
            default_headers: HashMap::new(),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set max retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff_type = backoff_type;
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// A successful response plus how many retries it took
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code (always 2xx)
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body
    pub body: Bytes,
    /// Retries spent before this response arrived
    pub retries: u32,
}

impl HttpResponse {
    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::decode(format!("Response body is not valid JSON: {e}")))
    }
}

/// HTTP client with retry, auth refresh and rate limiting
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthProvider>,
    config: HttpClientConfig,
    base_url: Url,
    default_headers: HeaderMap,
    rate_limiter: Option<RateLimiter>,
    total_retries: AtomicU64,
}

impl HttpClient {
    /// Create a client with a reqwest transport and config-driven auth
    pub fn new(
        config: HttpClientConfig,
        transport_config: &TransportConfig,
        auth: AuthConfig,
    ) -> Result<Self> {
        let transport = ReqwestTransport::new(transport_config)?;
        let authenticator = Authenticator::with_client(auth, transport.inner().clone());
        Self::with_parts(config, Arc::new(transport), Arc::new(authenticator))
    }

    /// Create a client from explicit collaborators
    pub fn with_parts(
        config: HttpClientConfig,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;

        let mut default_headers = HeaderMap::new();
        for (key, value) in &config.default_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::invalid_value("http.headers", format!("{key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::invalid_value("http.headers", format!("{key}: {e}")))?;
            default_headers.insert(name, value);
        }

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            transport,
            auth,
            config,
            base_url,
            default_headers,
            rate_limiter,
            total_retries: AtomicU64::new(0),
        })
    }

    /// The configured base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Retries spent across all requests made by this client
    pub fn total_retries(&self) -> u64 {
        self.total_retries.load(Ordering::Relaxed)
    }

    /// GET a path (relative to the base URL) or an absolute URL
    pub async fn get(
        &self,
        path_or_url: &str,
        query: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        let mut retries = 0;
        self.get_counted(path_or_url, query, cancel, &mut retries)
            .await
    }

    /// Like [`HttpClient::get`], adding each retry to `retries` as it happens
    ///
    /// The count is kept when the request finally fails.
    pub async fn get_counted(
        &self,
        path_or_url: &str,
        query: &[(String, String)],
        cancel: &CancellationToken,
        retries: &mut u32,
    ) -> Result<HttpResponse> {
        let url = self.resolve_url(path_or_url)?;
        let max_retries = self.config.max_retries;

        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            if let Some(ref limiter) = self.rate_limiter {
                limiter.wait().await;
            }

            let mut headers = self.default_headers.clone();
            let info = RequestInfo {
                url: &url,
                base_headers: &self.default_headers,
            };
            headers.extend(self.auth.headers_for(&info).await?);

            let sent = tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                r = self.transport.get(&url, query, &headers) => r,
            };

            let (delay, last_error) = match sent {
                Ok(response) => match classify_response(response) {
                    Outcome::Success(response) => {
                        debug!("GET {url} succeeded after {attempt} retries");
                        return Ok(HttpResponse {
                            status: response.status,
                            headers: response.headers,
                            body: response.body,
                            retries: attempt,
                        });
                    }
                    Outcome::Unauthorized(body) => {
                        if !refreshed && self.auth.refresh().await? {
                            refreshed = true;
                            continue;
                        }
                        return Err(Error::auth(format!("HTTP 401 from {url}: {body}")));
                    }
                    Outcome::RateLimited(retry_after) => {
                        let delay = match retry_after {
                            Some(wait) if wait > self.config.max_backoff => {
                                warn!(
                                    "GET {url}: Retry-After of {wait:?} exceeds the maximum backoff; waiting {:?}",
                                    self.config.max_backoff
                                );
                                self.config.max_backoff
                            }
                            Some(wait) => wait,
                            None => self.calculate_backoff(attempt),
                        };
                        let err = Error::RateLimited {
                            retry_after_seconds: delay.as_secs(),
                        };
                        (delay, err)
                    }
                    Outcome::Transient(status, body) => (
                        self.calculate_backoff(attempt),
                        Error::TransientHttp { status, body },
                    ),
                    Outcome::Fatal(status, body) => {
                        return Err(Error::http_status(status, body));
                    }
                },
                Err(e) if e.is_retryable() => (self.calculate_backoff(attempt), e),
                Err(e) => return Err(e),
            };

            if attempt >= max_retries {
                return Err(Error::MaxRetriesExceeded {
                    max_retries,
                    last_error: last_error.to_string(),
                });
            }

            warn!(
                "GET {url} failed ({last_error}), attempt {}/{}, retrying in {delay:?}",
                attempt + 1,
                max_retries + 1,
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
            *retries += 1;
            self.total_retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// GET and parse the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path_or_url: &str,
        query: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.get(path_or_url, query, cancel).await?.json()
    }

    /// Resolve a path against the base URL; absolute URLs pass through
    pub fn resolve_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// Calculate backoff delay for a given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let delay = match self.config.backoff_type {
            BackoffType::Constant => self.config.initial_backoff,
            BackoffType::Linear => self.config.initial_backoff * (attempt + 1),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.config.initial_backoff.saturating_mul(factor)
            }
        };

        std::cmp::min(delay, self.config.max_backoff)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url.as_str())
            .field("max_retries", &self.config.max_retries)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// How the client should react to a response
enum Outcome {
    Success(RawResponse),
    Unauthorized(String),
    RateLimited(Option<Duration>),
    Transient(u16, String),
    Fatal(u16, String),
}

fn classify_response(response: RawResponse) -> Outcome {
    match response.status {
        200..=299 => Outcome::Success(response),
        401 => Outcome::Unauthorized(response.body_text()),
        429 => Outcome::RateLimited(parse_retry_after(&response.headers)),
        500..=599 => Outcome::Transient(response.status, response.body_text()),
        status => Outcome::Fatal(status, response.body_text()),
    }
}

/// Parse a `Retry-After` header given as delta-seconds or an HTTP-date
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Some(wait)
}
