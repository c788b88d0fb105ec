//! Authentication module
//!
//! Supports: None, Basic, Bearer, OAuth2 (refresh token and client credentials)
//!
//! The `AuthProvider` trait is the seam the HTTP client talks to; the
//! `Authenticator` is the config-driven implementation and manages token
//! caching for the OAuth2 grants.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{AuthConfig, AuthProvider, CachedToken, RequestInfo};
