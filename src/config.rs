//! Configuration for a tap run
//!
//! A single YAML (or JSON) document describes the remote API, credentials,
//! HTTP behaviour, discovery, schema generation, pagination and sync
//! settings. `{{ env.NAME }}` placeholders are interpolated when the file is
//! loaded; other placeholders such as `{{ entity }}` are left for the
//! components that resolve them.
//!
//! ```yaml
//! base_url: https://api.example.com/v1
//! auth:
//!   type: bearer
//!   token: "{{ env.API_TOKEN }}"
//! http:
//!   max_retries: 5
//!   backoff: { type: exponential, initial: 500ms, max: 60s }
//! sync:
//!   mode: incremental
//!   overlap_window: 10m
//!   concurrency: 4
//! entities:
//!   item: { replication_key: mod_ts }
//! ```

use crate::auth::AuthConfig;
use crate::discovery::DiscovererConfig;
use crate::engine::SyncConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClientConfig, RateLimiterConfig, TransportConfig};
use crate::pagination::{
    PaginatorConfig, DEFAULT_MAX_PAGE_SIZE, DEFAULT_NEXT_PAGE_PATH, DEFAULT_ORDERING_PARAM,
    DEFAULT_PAGE_SIZE_PARAM, DEFAULT_RECORDS_PATH,
};
use crate::schema::{GeneratorConfig, DEFAULT_REPLICATION_KEY_CANDIDATES, DEFAULT_SEPARATOR};
use crate::template::{render_value, TemplateContext};
use crate::types::{BackoffType, OptionStringExt, SyncMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete tap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TapConfig {
    /// Base URL of the remote API
    pub base_url: String,

    /// Authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// HTTP client behaviour
    #[serde(default)]
    pub http: HttpConfig,

    /// Entity discovery
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Schema generation
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Response layout and query parameter names
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Sync defaults
    #[serde(default)]
    pub sync: SyncSettings,

    /// Per-entity overrides
    #[serde(default)]
    pub entities: BTreeMap<String, EntityConfig>,

    /// Bookmark file; bookmarks are kept in memory when unset
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl TapConfig {
    /// Load configuration from a YAML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_str(&content)
    }

    /// Parse, interpolate and validate a configuration document
    ///
    /// JSON is accepted as well since it is a subset of YAML.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_yaml::from_str(content)?;
        Self::from_value(&raw)
    }

    /// Build from an already parsed document
    pub fn from_value(raw: &serde_json::Value) -> Result<Self> {
        let rendered = render_value(raw, &TemplateContext::from_env().env_only())?;
        let config: Self = serde_json::from_value(rendered)
            .map_err(|e| Error::config(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::missing_field("base_url"));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| Error::invalid_value("base_url", e.to_string()))?;

        if self.http.timeout.is_zero() {
            return Err(Error::invalid_value("http.timeout", "must be greater than zero"));
        }
        if self.http.backoff.initial > self.http.backoff.max {
            return Err(Error::invalid_value(
                "http.backoff",
                "initial delay exceeds the maximum delay",
            ));
        }
        if let Some(limit) = &self.http.rate_limit {
            if limit.requests_per_second == 0 {
                return Err(Error::invalid_value(
                    "http.rate_limit.requests_per_second",
                    "must be greater than zero",
                ));
            }
        }

        if self.schema.flatten_separator.is_empty() {
            return Err(Error::invalid_value(
                "schema.flatten_separator",
                "must not be empty",
            ));
        }
        if self.pagination.max_page_size == 0 {
            return Err(Error::invalid_value(
                "pagination.max_page_size",
                "must be greater than zero",
            ));
        }

        if self.sync.concurrency == 0 {
            return Err(Error::invalid_value(
                "sync.concurrency",
                "must be at least 1",
            ));
        }
        if self.sync.page_size == 0 {
            return Err(Error::invalid_value("sync.page_size", "must be greater than zero"));
        }
        if self.sync.message_buffer == 0 {
            return Err(Error::invalid_value(
                "sync.message_buffer",
                "must be at least 1",
            ));
        }
        if self.sync.filter_operator.is_empty() {
            return Err(Error::invalid_value(
                "sync.filter_operator",
                "must not be empty",
            ));
        }

        for (name, entity) in &self.entities {
            if entity.page_size == Some(0) {
                return Err(Error::invalid_value(
                    format!("entities.{name}.page_size"),
                    "must be greater than zero",
                ));
            }
            if entity.replication_key.as_deref().is_some_and(str::is_empty) {
                return Err(Error::invalid_value(
                    format!("entities.{name}.replication_key"),
                    "must not be empty",
                ));
            }
        }

        Ok(())
    }

    // ========================================================================
    // Typed component settings
    // ========================================================================

    /// Settings for the HTTP client
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            base_url: self.base_url.clone(),
            max_retries: self.http.max_retries,
            initial_backoff: self.http.backoff.initial,
            max_backoff: self.http.backoff.max,
            backoff_type: self.http.backoff.backoff_type,
            rate_limit: self.http.rate_limit.clone(),
            default_headers: self.http.headers.clone(),
        }
    }

    /// Settings for the reqwest transport
    pub fn transport_config(&self) -> TransportConfig {
        let mut config = TransportConfig {
            timeout: self.http.timeout,
            pool_max_idle_per_host: self.http.pool_max_idle_per_host,
            ..TransportConfig::default()
        };
        if let Some(agent) = self.http.user_agent.clone().none_if_empty() {
            config.user_agent = agent;
        }
        config
    }

    /// Settings for the entity discoverer
    pub fn discoverer_config(&self) -> DiscovererConfig {
        DiscovererConfig {
            list_endpoint: self.discovery.list_endpoint.clone(),
            list_path_template: self.discovery.list_path_template.clone(),
            describe_path_template: self.discovery.describe_path_template.clone(),
            cache_ttl: self.discovery.cache_ttl,
        }
    }

    /// Settings for the schema generator
    pub fn generator_config(&self) -> GeneratorConfig {
        let replication_key_overrides = self
            .entities
            .iter()
            .filter_map(|(name, e)| e.replication_key.clone().map(|key| (name.clone(), key)))
            .collect();

        GeneratorConfig {
            replication_key_candidates: self.schema.replication_key_candidates.clone(),
            replication_key_overrides,
            flatten: self.schema.flatten,
            flatten_separator: self.schema.flatten_separator.clone(),
        }
    }

    /// Settings for the paginator
    pub fn paginator_config(&self) -> PaginatorConfig {
        PaginatorConfig {
            page_size_param: self.pagination.page_size_param.clone(),
            ordering_param: self.pagination.ordering_param.clone(),
            records_path: self.pagination.records_path.clone(),
            next_page_path: self.pagination.next_page_path.clone(),
            max_page_size: self.pagination.max_page_size,
        }
    }

    /// Settings for the sync engine
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            overlap_window: self.sync.overlap_window,
            page_size: self.sync.page_size,
            concurrency: self.sync.concurrency,
            flatten: self.schema.flatten,
            flatten_separator: self.schema.flatten_separator.clone(),
            filter_operator: self.sync.filter_operator.clone(),
            ordering: self.sync.ordering.clone(),
            order_by_replication_key: self.sync.order_by_replication_key,
        }
    }

    /// Replication mode of an entity
    pub fn mode_for(&self, entity: &str) -> SyncMode {
        self.entities
            .get(entity)
            .and_then(|e| e.mode)
            .unwrap_or(self.sync.mode)
    }

    /// Overrides of an entity, if any
    pub fn entity(&self, entity: &str) -> Option<&EntityConfig> {
        self.entities.get(entity)
    }
}

// ============================================================================
// HTTP Config
// ============================================================================

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Per-request timeout
    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retry backoff
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Optional client-side rate limit
    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,

    /// Idle connections kept per host
    #[serde(default = "default_pool_idle")]
    pub pool_max_idle_per_host: usize,

    /// User agent override
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            backoff: BackoffConfig::default(),
            rate_limit: None,
            pool_max_idle_per_host: default_pool_idle(),
            user_agent: None,
            headers: HashMap::new(),
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    5
}

fn default_pool_idle() -> usize {
    4
}

/// Backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    /// Type of backoff
    #[serde(rename = "type", default)]
    pub backoff_type: BackoffType,

    /// First delay
    #[serde(default = "default_initial_backoff", with = "duration_str")]
    pub initial: Duration,

    /// Upper bound for any delay
    #[serde(default = "default_max_backoff", with = "duration_str")]
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            initial: default_initial_backoff(),
            max: default_max_backoff(),
        }
    }
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(60)
}

// ============================================================================
// Discovery / Schema / Pagination
// ============================================================================

/// Entity discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Path of the entity listing
    #[serde(default = "default_list_endpoint")]
    pub list_endpoint: String,

    /// List path for entities the listing gives no path for
    #[serde(default = "default_list_path_template")]
    pub list_path_template: String,

    /// Describe path for entities the listing gives no path for
    #[serde(default = "default_describe_path_template")]
    pub describe_path_template: String,

    /// How long a discovery result is reused; forever when unset
    #[serde(default, with = "duration_str::option")]
    pub cache_ttl: Option<Duration>,

    /// Glob patterns of entities to sync; all when empty
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns of entities to skip
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            list_endpoint: default_list_endpoint(),
            list_path_template: default_list_path_template(),
            describe_path_template: default_describe_path_template(),
            cache_ttl: None,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

fn default_list_endpoint() -> String {
    "/".to_string()
}

fn default_list_path_template() -> String {
    "/{{ entity }}/".to_string()
}

fn default_describe_path_template() -> String {
    "/{{ entity }}/describe/".to_string()
}

/// Schema generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Replication key candidates, in priority order
    #[serde(default = "default_candidates")]
    pub replication_key_candidates: Vec<String>,

    /// Lift nested fields and record objects into flat columns
    #[serde(default)]
    pub flatten: bool,

    /// Separator for flattened names
    #[serde(default = "default_separator")]
    pub flatten_separator: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            replication_key_candidates: default_candidates(),
            flatten: false,
            flatten_separator: default_separator(),
        }
    }
}

fn default_candidates() -> Vec<String> {
    DEFAULT_REPLICATION_KEY_CANDIDATES
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

/// Response layout and query parameter names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size_param")]
    pub page_size_param: String,

    #[serde(default = "default_ordering_param")]
    pub ordering_param: String,

    /// Dotted path to the record array
    #[serde(default = "default_records_path")]
    pub records_path: String,

    /// Dotted path to the next-page link
    #[serde(default = "default_next_page_path")]
    pub next_page_path: String,

    /// Page size cap when an entity advertises none
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size_param: default_page_size_param(),
            ordering_param: default_ordering_param(),
            records_path: default_records_path(),
            next_page_path: default_next_page_path(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_page_size_param() -> String {
    DEFAULT_PAGE_SIZE_PARAM.to_string()
}

fn default_ordering_param() -> String {
    DEFAULT_ORDERING_PARAM.to_string()
}

fn default_records_path() -> String {
    DEFAULT_RECORDS_PATH.to_string()
}

fn default_next_page_path() -> String {
    DEFAULT_NEXT_PAGE_PATH.to_string()
}

fn default_max_page_size() -> u32 {
    DEFAULT_MAX_PAGE_SIZE
}

// ============================================================================
// Sync Config
// ============================================================================

/// Sync defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    /// Mode for entities without an override
    #[serde(default)]
    pub mode: SyncMode,

    /// Re-read window subtracted from timestamp bookmarks
    #[serde(default = "default_overlap", with = "duration_str")]
    pub overlap_window: Duration,

    /// Requested page size
    #[serde(default = "default_max_page_size")]
    pub page_size: u32,

    /// Entities synced at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Operator of the incremental lower bound (`<key>__<op>`)
    #[serde(default = "default_filter_operator")]
    pub filter_operator: String,

    /// Ordering for every entity without an override
    #[serde(default)]
    pub ordering: Option<String>,

    /// Order by the replication key when no ordering is set
    #[serde(default = "default_true")]
    pub order_by_replication_key: bool,

    /// Messages queued for the consumer before extraction waits
    #[serde(default = "default_message_buffer")]
    pub message_buffer: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            overlap_window: default_overlap(),
            page_size: default_max_page_size(),
            concurrency: default_concurrency(),
            filter_operator: default_filter_operator(),
            ordering: None,
            order_by_replication_key: true,
            message_buffer: default_message_buffer(),
        }
    }
}

fn default_message_buffer() -> usize {
    16
}

fn default_overlap() -> Duration {
    Duration::from_secs(600)
}

fn default_concurrency() -> usize {
    1
}

fn default_filter_operator() -> String {
    "gte".to_string()
}

fn default_true() -> bool {
    true
}

/// Per-entity overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    /// Replication mode
    #[serde(default)]
    pub mode: Option<SyncMode>,

    /// Replication key, taking precedence over detection
    #[serde(default)]
    pub replication_key: Option<String>,

    /// Requested page size
    #[serde(default)]
    pub page_size: Option<u32>,

    /// Static filters sent with the first page
    #[serde(default)]
    pub filters: BTreeMap<String, String>,

    /// Ordering
    #[serde(default)]
    pub ordering: Option<String>,
}

// ============================================================================
// Duration fields
// ============================================================================

/// Serde adapter for human-readable durations (`"10m"`, `"500ms"`)
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
