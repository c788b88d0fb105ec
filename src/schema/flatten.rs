//! Nested field flattening
//!
//! Nested objects are lifted into top-level keys joined by a separator
//! (`address__city`). Arrays are left alone. The same rule is applied to
//! describe metadata and to records so schemas and records agree.

use super::types::FieldMetadata;
use crate::types::{JsonValue, Record};

/// Default separator between parent and child names
pub const DEFAULT_SEPARATOR: &str = "__";

/// Flatten nested objects in a record
pub fn flatten_record(record: Record, separator: &str) -> Record {
    let mut out = Record::new();
    for (key, value) in record {
        flatten_into(&mut out, key, value, separator);
    }
    out
}

fn flatten_into(out: &mut Record, key: String, value: JsonValue, separator: &str) {
    match value {
        JsonValue::Object(map) if !map.is_empty() => {
            for (child, child_value) in map {
                flatten_into(out, format!("{key}{separator}{child}"), child_value, separator);
            }
        }
        other => {
            out.insert(key, other);
        }
    }
}

/// Flatten nested field descriptors into leaf fields
///
/// A child inherits nullability from its parent: if the parent object can be
/// null, so can every value lifted out of it.
pub fn flatten_fields(fields: &[FieldMetadata], separator: &str) -> Vec<FieldMetadata> {
    let mut out = Vec::new();
    for field in fields {
        push_flattened(&mut out, field, None, false, separator);
    }
    out
}

fn push_flattened(
    out: &mut Vec<FieldMetadata>,
    field: &FieldMetadata,
    prefix: Option<&str>,
    parent_nullable: bool,
    separator: &str,
) {
    let name = match prefix {
        Some(prefix) => format!("{prefix}{separator}{}", field.name),
        None => field.name.clone(),
    };
    let nullable = parent_nullable || field.nullable;

    if field.children.is_empty() {
        out.push(FieldMetadata::new(name, field.native_type.clone(), nullable));
        return;
    }

    for child in &field.children {
        push_flattened(out, child, Some(&name), nullable, separator);
    }
}
