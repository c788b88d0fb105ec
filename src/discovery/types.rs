//! Discovery types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An entity exposed by the remote API
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity name, unique within one discovery
    pub name: String,
    /// Path of the record listing endpoint
    pub list_path: String,
    /// Path of the field metadata endpoint
    pub describe_path: String,
}

impl EntityRef {
    /// Create an entity reference
    pub fn new(
        name: impl Into<String>,
        list_path: impl Into<String>,
        describe_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            list_path: list_path.into(),
            describe_path: describe_path.into(),
        }
    }
}

/// Settings for [`super::EntityDiscoverer`]
#[derive(Debug, Clone)]
pub struct DiscovererConfig {
    /// Path of the entity listing endpoint
    pub list_endpoint: String,
    /// Template for an entity's list path (`{{ entity }}` is replaced)
    pub list_path_template: String,
    /// Template for an entity's describe path
    pub describe_path_template: String,
    /// How long a discovery result stays fresh; `None` keeps it for the
    /// lifetime of the discoverer
    pub cache_ttl: Option<Duration>,
}

impl Default for DiscovererConfig {
    fn default() -> Self {
        Self {
            list_endpoint: "/".to_string(),
            list_path_template: "/{{ entity }}/".to_string(),
            describe_path_template: "/{{ entity }}/describe/".to_string(),
            cache_ttl: None,
        }
    }
}
