//! Auth configuration types
//!
//! These types represent the runtime auth configuration after template
//! interpolation has been applied.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// Authentication configuration (after template interpolation)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication required
    #[default]
    None,

    /// HTTP Basic authentication
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },

    /// Static bearer token
    Bearer {
        /// The bearer token
        token: String,
    },

    /// OAuth2 Refresh Token flow
    Oauth2Refresh {
        /// Token endpoint URL
        token_url: String,
        /// Client ID
        client_id: String,
        /// Client secret
        client_secret: String,
        /// Refresh token
        refresh_token: String,
    },

    /// OAuth2 Client Credentials flow
    Oauth2ClientCredentials {
        /// Token endpoint URL
        token_url: String,
        /// Client ID
        client_id: String,
        /// Client secret
        client_secret: String,
        /// Requested scopes
        #[serde(default)]
        scopes: Vec<String>,
    },
}

impl AuthConfig {
    /// Whether this auth type obtains tokens from a token endpoint
    pub fn uses_token_endpoint(&self) -> bool {
        matches!(
            self,
            AuthConfig::Oauth2Refresh { .. } | AuthConfig::Oauth2ClientCredentials { .. }
        )
    }
}

/// What a provider gets to see about an outgoing request
#[derive(Debug, Clone)]
pub struct RequestInfo<'a> {
    /// Fully resolved request URL
    pub url: &'a Url,
    /// Headers that will be sent regardless of auth
    pub base_headers: &'a HeaderMap,
}

/// Supplies authentication headers for outgoing requests
///
/// Providers own their credential lifecycle. The HTTP client only calls
/// [`AuthProvider::refresh`] after a 401, and retries the request once if the
/// provider reports that it obtained fresh credentials.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Headers to attach to the given request
    async fn headers_for(&self, request: &RequestInfo<'_>) -> Result<HeaderMap>;

    /// Discard cached credentials and obtain new ones.
    ///
    /// Returns `false` when the provider has nothing to refresh.
    async fn refresh(&self) -> Result<bool> {
        Ok(false)
    }
}

/// Cached token with expiration
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The access token
    pub token: String,
    /// When the token expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a new cached token
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Create a token that expires in N seconds from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        let expires_at = Utc::now() + chrono::Duration::seconds(seconds);
        Self {
            token,
            expires_at: Some(expires_at),
        }
    }

    /// Check if the token is expired (with 30 second buffer)
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let buffer = chrono::Duration::seconds(30);
                Utc::now() + buffer >= expires_at
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod type_tests {
    use super::*;

    #[test]
    fn test_cached_token_not_expired() {
        let token = CachedToken::expires_in("test".to_string(), 3600);
        assert!(!token.is_expired());
    }

    #[test]
    fn test_cached_token_expired() {
        let token = CachedToken::expires_in("test".to_string(), -100);
        assert!(token.is_expired());
    }

    #[test]
    fn test_cached_token_no_expiration() {
        let token = CachedToken::new("test".to_string(), None);
        assert!(!token.is_expired());
    }

    #[test]
    fn test_auth_config_default() {
        let config = AuthConfig::default();
        assert!(matches!(config, AuthConfig::None));
        assert!(!config.uses_token_endpoint());
    }

    #[test]
    fn test_auth_config_deserialize() {
        let config: AuthConfig = serde_json::from_value(serde_json::json!({
            "type": "basic",
            "username": "svc",
            "password": "secret"
        }))
        .unwrap();
        assert_eq!(
            config,
            AuthConfig::Basic {
                username: "svc".to_string(),
                password: "secret".to_string()
            }
        );

        let config: AuthConfig = serde_json::from_value(serde_json::json!({
            "type": "oauth2_client_credentials",
            "token_url": "https://auth.example.com/token",
            "client_id": "id",
            "client_secret": "secret"
        }))
        .unwrap();
        assert!(config.uses_token_endpoint());
    }
}
