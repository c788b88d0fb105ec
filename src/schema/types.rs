//! Schema types

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ============================================================================
// Canonical Types
// ============================================================================

/// Canonical field type, shared by every entity regardless of the remote's
/// native type names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Null,
}

impl CanonicalType {
    /// Lowercase name as used in JSON Schema
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalType::String => "string",
            CanonicalType::Integer => "integer",
            CanonicalType::Number => "number",
            CanonicalType::Boolean => "boolean",
            CanonicalType::Object => "object",
            CanonicalType::Array => "array",
            CanonicalType::Null => "null",
        }
    }
}

impl std::fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Remote Field Metadata
// ============================================================================

/// One field as described by the remote describe endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMetadata {
    /// Field name
    pub name: String,
    /// Native type descriptor, e.g. `varchar(255)` or `ForeignKey`
    pub native_type: String,
    /// Whether the field may be null
    pub nullable: bool,
    /// Nested field descriptors, when the remote provides them
    pub children: Vec<FieldMetadata>,
}

impl FieldMetadata {
    /// Create a leaf field
    pub fn new(name: impl Into<String>, native_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.into(),
            nullable,
            children: Vec::new(),
        }
    }
}

// ============================================================================
// Canonical Schema
// ============================================================================

/// A field of a generated schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field name (flattened names use the configured separator)
    pub name: String,
    /// Canonical type
    #[serde(rename = "type")]
    pub canonical_type: CanonicalType,
    /// Whether the field may be null
    pub nullable: bool,
    /// JSON Schema format hint such as `date-time`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl SchemaField {
    /// Create a field without a format hint
    pub fn new(name: impl Into<String>, canonical_type: CanonicalType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            canonical_type,
            nullable,
            format: None,
        }
    }

    /// Attach a format hint
    #[must_use]
    pub fn with_format(mut self, format: Option<&str>) -> Self {
        self.format = format.map(str::to_string);
        self
    }
}

/// Canonical schema of one entity
///
/// Field names are unique. Once built, a schema is never mutated; the
/// builder-style setters consume `self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Entity name
    pub entity: String,
    /// Fields in describe order
    pub fields: Vec<SchemaField>,
    /// Field used to bound incremental reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_key: Option<String>,
    /// Largest page size the remote accepts for this entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_page_size: Option<u32>,
}

impl Schema {
    /// Create a schema, rejecting duplicate field names
    pub fn new(entity: impl Into<String>, fields: Vec<SchemaField>) -> Result<Self> {
        let entity = entity.into();
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::schema(
                    &entity,
                    format!("duplicate field name '{}'", field.name),
                ));
            }
        }

        Ok(Self {
            entity,
            fields,
            replication_key: None,
            max_page_size: None,
        })
    }

    /// Set the replication key
    #[must_use]
    pub fn with_replication_key(mut self, key: Option<String>) -> Self {
        self.replication_key = key;
        self
    }

    /// Set the advertised page size cap
    #[must_use]
    pub fn with_max_page_size(mut self, max: Option<u32>) -> Self {
        self.max_page_size = max;
        self
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether a field exists
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Field names in order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Render as a JSON Schema document
    pub fn to_json_schema(&self) -> JsonSchema {
        let mut schema = JsonSchema::new().with_title(&self.entity);
        for field in &self.fields {
            let mut property = if field.nullable {
                SchemaProperty::nullable(field.canonical_type)
            } else {
                SchemaProperty::new(field.canonical_type)
            };
            if let Some(format) = &field.format {
                property = property.with_format(format);
            }
            schema.add_property(&field.name, property);
            if !field.nullable {
                schema.add_required(&field.name);
            }
        }
        schema
    }
}

// ============================================================================
// JSON Schema Rendering
// ============================================================================

/// JSON type can be a single type or array of types (for nullable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonTypeOrArray {
    Single(CanonicalType),
    Multiple(Vec<CanonicalType>),
}

impl JsonTypeOrArray {
    /// Create a nullable type
    pub fn nullable(t: CanonicalType) -> Self {
        if t == CanonicalType::Null {
            JsonTypeOrArray::Single(CanonicalType::Null)
        } else {
            JsonTypeOrArray::Multiple(vec![t, CanonicalType::Null])
        }
    }

    /// Check if this type is nullable
    pub fn is_nullable(&self) -> bool {
        match self {
            JsonTypeOrArray::Single(t) => *t == CanonicalType::Null,
            JsonTypeOrArray::Multiple(types) => types.contains(&CanonicalType::Null),
        }
    }

    /// Get the primary (non-null) type
    pub fn primary_type(&self) -> Option<CanonicalType> {
        match self {
            JsonTypeOrArray::Single(t) => Some(*t),
            JsonTypeOrArray::Multiple(types) => {
                types.iter().copied().find(|t| *t != CanonicalType::Null)
            }
        }
    }
}

/// JSON Schema property definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaProperty {
    /// Property type(s)
    #[serde(rename = "type")]
    pub json_type: JsonTypeOrArray,

    /// Format hint (e.g., "date-time", "date")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl SchemaProperty {
    /// Create a new property with the given type
    pub fn new(json_type: CanonicalType) -> Self {
        Self {
            json_type: JsonTypeOrArray::Single(json_type),
            format: None,
        }
    }

    /// Create a nullable property
    pub fn nullable(json_type: CanonicalType) -> Self {
        Self {
            json_type: JsonTypeOrArray::nullable(json_type),
            format: None,
        }
    }

    /// Set format hint
    #[must_use]
    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    /// Check if nullable
    pub fn is_nullable(&self) -> bool {
        self.json_type.is_nullable()
    }
}

/// Full JSON Schema document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonSchema {
    /// Schema version
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Schema type (always "object" for top-level)
    #[serde(rename = "type")]
    pub json_type: CanonicalType,

    /// Schema title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Object properties
    #[serde(default)]
    pub properties: BTreeMap<String, SchemaProperty>,

    /// Required properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Default for JsonSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonSchema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self {
            schema: Some("http://json-schema.org/draft-07/schema#".to_string()),
            json_type: CanonicalType::Object,
            title: None,
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Set the schema title
    #[must_use]
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Add a property
    pub fn add_property(&mut self, name: &str, property: SchemaProperty) {
        self.properties.insert(name.to_string(), property);
    }

    /// Add a required property
    pub fn add_required(&mut self, name: &str) {
        if !self.required.iter().any(|n| n == name) {
            self.required.push(name.to_string());
        }
    }

    /// Get a property
    pub fn get_property(&self, name: &str) -> Option<&SchemaProperty> {
        self.properties.get(name)
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
