//! HTTP client module
//!
//! Provides the HTTP client used for listing, describe and record requests.
//!
//! # Features
//!
//! - **Transport seam**: `Transport` trait with a pooled reqwest implementation
//! - **Automatic Retries**: 5xx, timeouts and connect errors with backoff
//! - **429 Handling**: honours `Retry-After` (seconds or HTTP-date)
//! - **Auth Refresh**: one refresh-and-retry after a 401
//! - **Rate Limiting**: token bucket rate limiter using governor

mod client;
mod rate_limit;
mod transport;

pub use client::{parse_retry_after, HttpClient, HttpClientConfig, HttpResponse};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportConfig};

#[cfg(test)]
mod tests;
