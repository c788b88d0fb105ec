//! Authenticator implementation
//!
//! Builds authentication headers for requests and manages token refresh for
//! the OAuth2 grant types.

use super::types::{AuthConfig, AuthProvider, CachedToken, RequestInfo};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default [`AuthProvider`] driven by an [`AuthConfig`]
pub struct Authenticator {
    /// Auth configuration
    config: AuthConfig,
    /// Cached token for OAuth2 auth
    cached_token: Arc<RwLock<Option<CachedToken>>>,
    /// HTTP client for token requests
    http_client: Client,
}

impl Authenticator {
    /// Create a new authenticator with the given config
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            cached_token: Arc::new(RwLock::new(None)),
            http_client: Client::new(),
        }
    }

    /// Create an authenticator with a custom HTTP client
    pub fn with_client(config: AuthConfig, http_client: Client) -> Self {
        Self {
            config,
            cached_token: Arc::new(RwLock::new(None)),
            http_client,
        }
    }

    /// Get the current auth config
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Clear the cached token
    pub async fn clear_cache(&self) {
        let mut cached = self.cached_token.write().await;
        *cached = None;
    }

    /// Get a valid token, refreshing if necessary
    async fn get_or_refresh_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired() {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.cached_token.write().await;

        // Another task may have refreshed while we waited for the write lock
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }

        let new_token = self.fetch_new_token().await?;
        let token_str = new_token.token.clone();
        *cached = Some(new_token);

        Ok(token_str)
    }

    /// Fetch a new token based on auth type
    async fn fetch_new_token(&self) -> Result<CachedToken> {
        match &self.config {
            AuthConfig::Oauth2ClientCredentials {
                token_url,
                client_id,
                client_secret,
                scopes,
            } => {
                let mut form = vec![
                    ("grant_type", "client_credentials".to_string()),
                    ("client_id", client_id.clone()),
                    ("client_secret", client_secret.clone()),
                ];
                if !scopes.is_empty() {
                    form.push(("scope", scopes.join(" ")));
                }
                self.request_token(token_url, &form).await
            }

            AuthConfig::Oauth2Refresh {
                token_url,
                client_id,
                client_secret,
                refresh_token,
            } => {
                let form = vec![
                    ("grant_type", "refresh_token".to_string()),
                    ("client_id", client_id.clone()),
                    ("client_secret", client_secret.clone()),
                    ("refresh_token", refresh_token.clone()),
                ];
                self.request_token(token_url, &form).await
            }

            _ => Err(Error::auth(
                "Token refresh not supported for this auth type",
            )),
        }
    }

    /// POST a form to the token endpoint and parse the token response
    async fn request_token(&self, token_url: &str, form: &[(&str, String)]) -> Result<CachedToken> {
        debug!("Requesting OAuth2 token from {token_url}");

        let response = self
            .http_client
            .post(token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| Error::TokenRefresh {
                message: format!("Token request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::TokenRefresh {
                message: format!("Token request failed with status {status}: {body}"),
            });
        }

        let token_response: TokenResponse =
            response.json().await.map_err(|e| Error::TokenRefresh {
                message: format!("Invalid token response: {e}"),
            })?;
        Ok(token_response.into_cached_token())
    }
}

#[async_trait]
impl AuthProvider for Authenticator {
    async fn headers_for(&self, _request: &RequestInfo<'_>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        let value = match &self.config {
            AuthConfig::None => return Ok(headers),
            AuthConfig::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                format!("Basic {encoded}")
            }
            AuthConfig::Bearer { token } => format!("Bearer {token}"),
            AuthConfig::Oauth2Refresh { .. } | AuthConfig::Oauth2ClientCredentials { .. } => {
                let token = self.get_or_refresh_token().await?;
                format!("Bearer {token}")
            }
        };

        let mut value = HeaderValue::from_str(&value)
            .map_err(|e| Error::auth(format!("Credentials are not a valid header value: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    async fn refresh(&self) -> Result<bool> {
        if !self.config.uses_token_endpoint() {
            return Ok(false);
        }

        info!("Refreshing OAuth2 access token after authorization failure");
        let new_token = self.fetch_new_token().await?;
        let mut cached = self.cached_token.write().await;
        *cached = Some(new_token);
        Ok(true)
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.config {
            AuthConfig::None => "none",
            AuthConfig::Basic { .. } => "basic",
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::Oauth2Refresh { .. } => "oauth2_refresh",
            AuthConfig::Oauth2ClientCredentials { .. } => "oauth2_client_credentials",
        };
        f.debug_struct("Authenticator")
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_cached_token(self) -> CachedToken {
        match self.expires_in {
            Some(secs) => CachedToken::expires_in(self.access_token, secs),
            None => CachedToken::new(self.access_token, None),
        }
    }
}
