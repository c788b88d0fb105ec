//! Schema generation module
//!
//! Turns the remote describe metadata into canonical schemas.
//!
//! # Features
//!
//! - **Type Mapping**: native descriptors to a small canonical type set
//! - **Replication Keys**: override, then an ordered candidate list
//! - **Flattening**: optional `parent__child` lifting of nested fields
//! - **JSON Schema**: catalog rendering with nullable unions and format hints

mod flatten;
mod generator;
mod mapper;
mod types;

pub use flatten::{flatten_fields, flatten_record, DEFAULT_SEPARATOR};
pub use generator::{
    parse_describe, DescribeResponse, GeneratorConfig, SchemaGenerator,
    DEFAULT_REPLICATION_KEY_CANDIDATES,
};
pub use mapper::SchemaTypeMapper;
pub use types::{
    CanonicalType, FieldMetadata, JsonSchema, JsonTypeOrArray, Schema, SchemaField,
    SchemaProperty,
};

#[cfg(test)]
mod tests;
