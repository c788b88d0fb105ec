//! Error types for entity-tap
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Errors fall into two scopes (see [`ErrorScope`]): run-scoped errors halt a
//! whole batch because no entity can make progress, entity-scoped errors only
//! abort the entity that raised them.

use thiserror::Error;

/// The main error type for entity-tap
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Token refresh failed: {message}")]
    TokenRefresh { message: String },

    // ============================================================================
    // Discovery / Schema Errors
    // ============================================================================
    #[error("Entity discovery failed: {message}")]
    Discovery { message: String },

    #[error("Schema error for entity '{entity}': {message}")]
    Schema { entity: String, message: String },

    #[error("Entity '{entity}' has no replication key; incremental sync is not possible")]
    ReplicationKeyMissing { entity: String },

    // ============================================================================
    // HTTP / Pagination Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Page fetch failed for entity '{entity}': {message}")]
    PageFetch { entity: String, message: String },

    #[error("Transient HTTP {status}: {body}")]
    TransientHttp { status: u16, body: String },

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Pagination loop detected for entity '{entity}': cursor '{cursor}' was already visited")]
    PaginationLoop { entity: String, cursor: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection failed: {message}")]
    Connect { message: String },

    #[error("Max retries ({max_retries}) exceeded: {last_error}")]
    MaxRetriesExceeded { max_retries: u32, last_error: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    // ============================================================================
    // State Errors
    // ============================================================================
    #[error("State error: {message}")]
    State { message: String },

    #[error("Sync cancelled")]
    Cancelled,

    // ============================================================================
    // Template Errors
    // ============================================================================
    #[error("Template error: {message}")]
    Template { message: String },

    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// How far an error reaches within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// No entity can proceed; the whole batch stops
    Run,
    /// Only the entity that raised the error is aborted
    Entity,
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a discovery error
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a page fetch error
    pub fn page_fetch(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PageFetch {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a template error
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TransientHttp { .. }
            | Error::RateLimited { .. }
            | Error::Timeout { .. }
            | Error::Connect { .. } => true,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Whether this error halts the whole batch or only one entity
    pub fn scope(&self) -> ErrorScope {
        match self {
            Error::Auth { .. }
            | Error::TokenRefresh { .. }
            | Error::Discovery { .. }
            | Error::Config { .. }
            | Error::MissingConfigField { .. }
            | Error::InvalidConfigValue { .. }
            | Error::Cancelled => ErrorScope::Run,
            _ => ErrorScope::Entity,
        }
    }

    /// Short machine-readable name for reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config { .. }
            | Error::MissingConfigField { .. }
            | Error::InvalidConfigValue { .. }
            | Error::YamlParse(_) => "config",
            Error::Auth { .. } | Error::TokenRefresh { .. } => "auth",
            Error::Discovery { .. } => "discovery",
            Error::Schema { .. } => "schema",
            Error::ReplicationKeyMissing { .. } => "replication_key_missing",
            Error::PageFetch { .. } => "page_fetch",
            Error::PaginationLoop { .. } => "pagination_loop",
            Error::RateLimited { .. } => "rate_limited",
            Error::State { .. } => "state",
            Error::Cancelled => "cancelled",
            _ => "other",
        }
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500..=599)
}

/// Result type alias for entity-tap
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::missing_field("base_url");
        assert_eq!(err.to_string(), "Missing required config field: base_url");

        let err = Error::ReplicationKeyMissing {
            entity: "item".to_string(),
        };
        assert!(err.to_string().contains("'item'"));

        let err = Error::PaginationLoop {
            entity: "item".to_string(),
            cursor: "abc".to_string(),
        };
        assert!(err.to_string().contains("cursor 'abc'"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::RateLimited {
            retry_after_seconds: 60
        }
        .is_retryable());
        assert!(Error::Timeout { timeout_ms: 1000 }.is_retryable());
        assert!(Error::TransientHttp {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(Error::http_status(429, "").is_retryable());
        assert!(Error::http_status(500, "").is_retryable());
        assert!(Error::http_status(503, "").is_retryable());

        assert!(!Error::http_status(400, "").is_retryable());
        assert!(!Error::http_status(401, "").is_retryable());
        assert!(!Error::http_status(404, "").is_retryable());
        assert!(!Error::page_fetch("item", "boom").is_retryable());
        assert!(!Error::config("test").is_retryable());
    }

    #[test]
    fn test_error_scope() {
        assert_eq!(Error::auth("denied").scope(), ErrorScope::Run);
        assert_eq!(Error::discovery("down").scope(), ErrorScope::Run);
        assert_eq!(Error::Cancelled.scope(), ErrorScope::Run);

        assert_eq!(Error::schema("item", "bad").scope(), ErrorScope::Entity);
        assert_eq!(Error::page_fetch("item", "404").scope(), ErrorScope::Entity);
        assert_eq!(
            Error::ReplicationKeyMissing {
                entity: "item".to_string()
            }
            .scope(),
            ErrorScope::Entity
        );
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }
}
