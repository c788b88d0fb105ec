//! Entity discovery against the listing endpoint

use super::cache::DiscoveryCache;
use super::glob::NameFilter;
use super::types::{DiscovererConfig, EntityRef};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::template::{render, TemplateContext};
use crate::types::JsonValue;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Keys under which a listing object may hold its entity array
const LISTING_KEYS: &[&str] = &["results", "entities", "data"];

/// Enumerates the entities exposed by the remote API
#[derive(Debug)]
pub struct EntityDiscoverer {
    client: Arc<HttpClient>,
    config: DiscovererConfig,
    cache: DiscoveryCache,
}

impl EntityDiscoverer {
    /// Create a discoverer
    pub fn new(client: Arc<HttpClient>, config: DiscovererConfig) -> Self {
        let cache = DiscoveryCache::new(config.cache_ttl);
        Self {
            client,
            config,
            cache,
        }
    }

    /// Discover entities whose names pass the include/exclude globs
    pub async fn discover(
        &self,
        include: &[String],
        exclude: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<EntityRef>> {
        let filter = NameFilter::new(include, exclude)?;
        let all = self.discover_all(cancel).await?;

        let selected: Vec<EntityRef> = all
            .iter()
            .filter(|e| filter.matches(&e.name))
            .cloned()
            .collect();

        debug!(
            "Selected {} of {} discovered entities",
            selected.len(),
            all.len()
        );
        Ok(selected)
    }

    /// The full, unfiltered entity list (cached)
    pub async fn discover_all(&self, cancel: &CancellationToken) -> Result<Arc<Vec<EntityRef>>> {
        self.cache.get_or_fill(|| self.fetch_listing(cancel)).await
    }

    async fn fetch_listing(&self, cancel: &CancellationToken) -> Result<Vec<EntityRef>> {
        let body: JsonValue = self
            .client
            .get_json(&self.config.list_endpoint, &[], cancel)
            .await
            .map_err(|e| match e {
                Error::Auth { .. } | Error::TokenRefresh { .. } | Error::Cancelled => e,
                other => Error::discovery(format!("listing request failed: {other}")),
            })?;

        let entities = self.parse_listing(&body)?;
        info!("Discovered {} entities", entities.len());
        Ok(entities)
    }

    /// Forget the cached discovery result
    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    /// Turn a listing body into entity references
    pub fn parse_listing(&self, body: &JsonValue) -> Result<Vec<EntityRef>> {
        let entries = match body {
            JsonValue::Array(items) => items,
            JsonValue::Object(map) => LISTING_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(JsonValue::as_array))
                .ok_or_else(|| {
                    Error::discovery(format!(
                        "listing object has none of the keys {LISTING_KEYS:?} holding an array"
                    ))
                })?,
            _ => return Err(Error::discovery("listing body is not an array or object")),
        };

        let mut seen = HashSet::new();
        let mut entities = Vec::with_capacity(entries.len());

        for entry in entries {
            let entity = self.parse_entry(entry)?;
            if !seen.insert(entity.name.clone()) {
                warn!("Duplicate entity '{}' in listing, keeping the first", entity.name);
                continue;
            }
            entities.push(entity);
        }

        Ok(entities)
    }

    fn parse_entry(&self, entry: &JsonValue) -> Result<EntityRef> {
        let (name, list_path, describe_path) = match entry {
            JsonValue::String(name) => (name.as_str(), None, None),
            JsonValue::Object(map) => {
                let name = map
                    .get("name")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| Error::discovery(format!("listing entry has no name: {entry}")))?;
                (
                    name,
                    map.get("list_path").and_then(JsonValue::as_str),
                    map.get("describe_path").and_then(JsonValue::as_str),
                )
            }
            _ => {
                return Err(Error::discovery(format!(
                    "listing entry is neither a name nor an object: {entry}"
                )))
            }
        };

        if name.is_empty() {
            return Err(Error::discovery("listing entry has an empty name"));
        }

        let ctx = TemplateContext::with_vars(json!({ "entity": name }));
        let list_path = match list_path {
            Some(p) => p.to_string(),
            None => render(&self.config.list_path_template, &ctx)?,
        };
        let describe_path = match describe_path {
            Some(p) => p.to_string(),
            None => render(&self.config.describe_path_template, &ctx)?,
        };

        Ok(EntityRef::new(name, list_path, describe_path))
    }
}
