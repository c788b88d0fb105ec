//! Native type → canonical type mapping

use super::types::CanonicalType;
use tracing::warn;

/// Maps the remote's native type descriptors onto [`CanonicalType`]
///
/// Matching is case-insensitive and ignores parameters, so `VARCHAR(255)`,
/// `decimal(10,2)` and `array<int>` resolve through their base name. Unknown
/// descriptors fall back to `string`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaTypeMapper;

impl SchemaTypeMapper {
    /// Create a mapper
    pub fn new() -> Self {
        Self
    }

    /// Map a native descriptor to its canonical type
    pub fn map(&self, native_type: &str) -> CanonicalType {
        let base = base_name(native_type);
        match lookup(&base) {
            Some(t) => t,
            None => {
                warn!("Unknown native type '{native_type}', mapping to string");
                CanonicalType::String
            }
        }
    }

    /// JSON Schema format hint for date-like descriptors
    pub fn format_hint(&self, native_type: &str) -> Option<&'static str> {
        match base_name(native_type).as_str() {
            "datetime" | "timestamp" | "timestamptz" | "datetimefield" => Some("date-time"),
            "date" | "datefield" => Some("date"),
            "time" | "timefield" => Some("time"),
            _ => None,
        }
    }
}

/// Lowercased descriptor with parameters and whitespace stripped
fn base_name(native_type: &str) -> String {
    let lowered = native_type.trim().to_ascii_lowercase();
    let end = lowered.find(['(', '<', '[']).unwrap_or(lowered.len());
    lowered[..end].trim().replace([' ', '-'], "_")
}

fn lookup(base: &str) -> Option<CanonicalType> {
    let t = match base {
        "string" | "str" | "char" | "character" | "varchar" | "character_varying" | "text"
        | "charfield" | "textfield" | "uuid" | "uuidfield" | "email" | "emailfield" | "url"
        | "urlfield" | "slug" | "slugfield" | "choice" | "choicefield" | "enum" | "date"
        | "datefield" | "datetime" | "datetimefield" | "time" | "timefield" | "timestamp"
        | "timestamptz" | "duration" | "ip" | "ipaddress" => CanonicalType::String,

        "int" | "integer" | "int2" | "int4" | "int8" | "bigint" | "smallint" | "tinyint"
        | "serial" | "bigserial" | "long" | "short" | "integerfield" | "bigintegerfield"
        | "smallintegerfield" | "positiveintegerfield" | "autofield" | "bigautofield"
        | "foreignkey" | "onetoonefield" | "fk" | "pk" => CanonicalType::Integer,

        "float" | "float4" | "float8" | "double" | "double_precision" | "decimal"
        | "numeric" | "real" | "money" | "number" | "floatfield" | "decimalfield" => {
            CanonicalType::Number
        }

        "bool" | "boolean" | "booleanfield" => CanonicalType::Boolean,

        "object" | "dict" | "json" | "jsonb" | "jsonfield" | "map" | "struct" | "nested"
        | "record" => CanonicalType::Object,

        "array" | "list" | "set" | "tuple" | "many" | "manytomanyfield" | "arrayfield" => {
            CanonicalType::Array
        }

        "null" | "none" | "void" => CanonicalType::Null,

        _ => return None,
    };
    Some(t)
}
