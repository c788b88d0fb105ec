//! Transport abstraction
//!
//! The transport performs a single GET and hands back status, headers and the
//! raw body. It knows nothing about retries, auth refresh or rate limits; those
//! live in [`super::HttpClient`].

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// A response as received from the wire
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: Bytes,
}

impl RawResponse {
    /// Body as lossy UTF-8, for error messages
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs GET requests against the remote API
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET request with query parameters and headers
    async fn get(
        &self,
        url: &Url,
        query: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<RawResponse>;
}

/// Settings for the reqwest-backed transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout (connect + read)
    pub timeout: Duration,
    /// Maximum idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// User agent string
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 4,
            user_agent: format!("entity-tap/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// [`Transport`] backed by a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport with its own connection pool
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// The underlying reqwest client, shared with token endpoints
    pub fn inner(&self) -> &Client {
        &self.client
    }

    fn classify(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if e.is_connect() {
            Error::Connect {
                message: e.to_string(),
            }
        } else {
            Error::Http(e)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &Url,
        query: &[(String, String)],
        headers: &HeaderMap,
    ) -> Result<RawResponse> {
        let mut req = self.client.get(url.clone()).headers(headers.clone());
        if !query.is_empty() {
            req = req.query(query);
        }

        let response = req.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
