//! Schema generation from describe metadata

use super::flatten::{flatten_fields, DEFAULT_SEPARATOR};
use super::mapper::SchemaTypeMapper;
use super::types::{CanonicalType, FieldMetadata, Schema, SchemaField};
use crate::discovery::EntityRef;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Replication key names tried in order when no override is configured
pub const DEFAULT_REPLICATION_KEY_CANDIDATES: &[&str] = &[
    "mod_ts",
    "modified_at",
    "updated_at",
    "last_modified",
    "date_modified",
    "modified",
];

/// Settings for [`SchemaGenerator`]
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Ordered replication key candidates
    pub replication_key_candidates: Vec<String>,
    /// Per-entity replication key overrides
    pub replication_key_overrides: HashMap<String, String>,
    /// Lift nested fields into `parent<sep>child` columns
    pub flatten: bool,
    /// Separator for flattened names
    pub flatten_separator: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            replication_key_candidates: DEFAULT_REPLICATION_KEY_CANDIDATES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            replication_key_overrides: HashMap::new(),
            flatten: false,
            flatten_separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

/// Parsed describe response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeResponse {
    /// Top-level field descriptors
    pub fields: Vec<FieldMetadata>,
    /// Page size cap advertised by the remote
    pub max_page_size: Option<u32>,
}

/// Builds canonical schemas from the describe endpoint
#[derive(Debug)]
pub struct SchemaGenerator {
    client: Arc<HttpClient>,
    mapper: SchemaTypeMapper,
    config: GeneratorConfig,
}

impl SchemaGenerator {
    /// Create a generator
    pub fn new(client: Arc<HttpClient>, config: GeneratorConfig) -> Self {
        Self {
            client,
            mapper: SchemaTypeMapper::new(),
            config,
        }
    }

    /// Fetch an entity's metadata and build its schema
    pub async fn generate(&self, entity: &EntityRef, cancel: &CancellationToken) -> Result<Schema> {
        let body: JsonValue = self
            .client
            .get_json(&entity.describe_path, &[], cancel)
            .await
            .map_err(|e| match e {
                Error::Auth { .. } | Error::TokenRefresh { .. } | Error::Cancelled => e,
                other => Error::schema(&entity.name, format!("describe request failed: {other}")),
            })?;

        self.build_schema(&entity.name, &body)
    }

    /// Build a schema from a describe body
    pub fn build_schema(&self, entity: &str, body: &JsonValue) -> Result<Schema> {
        let describe = parse_describe(entity, body)?;

        let fields = if self.config.flatten {
            flatten_fields(&describe.fields, &self.config.flatten_separator)
        } else {
            describe.fields
        };

        let schema_fields = fields
            .iter()
            .map(|f| self.to_schema_field(f))
            .collect::<Vec<_>>();

        let schema = Schema::new(entity, schema_fields)?;
        let replication_key = self.detect_replication_key(&schema);
        debug!(
            "Generated schema for '{entity}': {} fields, replication key {:?}",
            schema.fields.len(),
            replication_key
        );

        Ok(schema
            .with_replication_key(replication_key)
            .with_max_page_size(describe.max_page_size))
    }

    /// Pick the replication key: override first, then the candidate list
    pub fn detect_replication_key(&self, schema: &Schema) -> Option<String> {
        if let Some(key) = self.config.replication_key_overrides.get(&schema.entity) {
            if schema.has_field(key) {
                return Some(key.clone());
            }
            warn!(
                "Replication key override '{key}' is not a field of '{}', falling back to detection",
                schema.entity
            );
        }

        self.config
            .replication_key_candidates
            .iter()
            .find(|candidate| schema.has_field(candidate))
            .cloned()
    }

    fn to_schema_field(&self, field: &FieldMetadata) -> SchemaField {
        // Unflattened nested descriptors stay a single object column
        let canonical_type = if field.children.is_empty() {
            self.mapper.map(&field.native_type)
        } else {
            CanonicalType::Object
        };
        SchemaField::new(&field.name, canonical_type, field.nullable)
            .with_format(self.mapper.format_hint(&field.native_type))
    }
}

/// Parse a describe body into field descriptors
pub fn parse_describe(entity: &str, body: &JsonValue) -> Result<DescribeResponse> {
    let (list, max_page_size) = match body {
        JsonValue::Array(items) => (items, None),
        JsonValue::Object(map) => {
            let list = map
                .get("fields")
                .and_then(JsonValue::as_array)
                .ok_or_else(|| Error::schema(entity, "describe response has no field list"))?;
            let max = match map.get("max_page_size") {
                None | Some(JsonValue::Null) => None,
                Some(v) => Some(
                    v.as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                        .filter(|n| *n > 0)
                        .ok_or_else(|| {
                            Error::schema(entity, format!("invalid max_page_size: {v}"))
                        })?,
                ),
            };
            (list, max)
        }
        _ => return Err(Error::schema(entity, "describe response has no field list")),
    };

    let fields = parse_fields(entity, list)?;
    Ok(DescribeResponse {
        fields,
        max_page_size,
    })
}

fn parse_fields(entity: &str, list: &[JsonValue]) -> Result<Vec<FieldMetadata>> {
    let mut fields = Vec::with_capacity(list.len());
    for item in list {
        let obj = item
            .as_object()
            .ok_or_else(|| Error::schema(entity, format!("field descriptor is not an object: {item}")))?;

        let name = obj
            .get("name")
            .and_then(JsonValue::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::schema(entity, format!("field without a name: {item}")))?;

        let native_type = match obj.get("type") {
            Some(JsonValue::String(t)) => t.clone(),
            Some(other) => {
                return Err(Error::schema(
                    entity,
                    format!("type of field '{name}' is not a string: {other}"),
                ))
            }
            None => {
                return Err(Error::schema(entity, format!("field '{name}' has no type")));
            }
        };

        let nullable = obj
            .get("nullable")
            .and_then(JsonValue::as_bool)
            .unwrap_or(true);

        let children = match obj.get("fields").and_then(JsonValue::as_array) {
            Some(children) => parse_fields(entity, children)?,
            None => Vec::new(),
        };

        fields.push(FieldMetadata {
            name: name.to_string(),
            native_type,
            nullable,
            children,
        });
    }
    Ok(fields)
}
