//! Schema generation tests

use super::*;
use crate::auth::AuthConfig;
use crate::discovery::EntityRef;
use crate::error::Error;
use crate::http::{HttpClient, HttpClientConfig, TransportConfig};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn generator(base_url: &str, config: GeneratorConfig) -> SchemaGenerator {
    let http = HttpClientConfig::builder()
        .base_url(base_url)
        .max_retries(0)
        .build();
    let client = HttpClient::new(http, &TransportConfig::default(), AuthConfig::None).unwrap();
    SchemaGenerator::new(Arc::new(client), config)
}

fn offline(config: GeneratorConfig) -> SchemaGenerator {
    generator("http://localhost", config)
}

#[test]
fn test_build_schema_from_array() {
    let body = json!([
        {"name": "id", "type": "AutoField", "nullable": false},
        {"name": "sku", "type": "varchar(64)"},
        {"name": "price", "type": "decimal(10,2)"},
        {"name": "mod_ts", "type": "datetime", "nullable": false}
    ]);

    let schema = offline(GeneratorConfig::default())
        .build_schema("item", &body)
        .unwrap();

    assert_eq!(schema.entity, "item");
    assert_eq!(
        schema.fields,
        vec![
            SchemaField::new("id", CanonicalType::Integer, false),
            SchemaField::new("sku", CanonicalType::String, true),
            SchemaField::new("price", CanonicalType::Number, true),
            SchemaField::new("mod_ts", CanonicalType::String, false).with_format(Some("date-time")),
        ]
    );
    assert_eq!(schema.replication_key.as_deref(), Some("mod_ts"));
    assert_eq!(schema.max_page_size, None);
}

#[test]
fn test_build_schema_from_object_with_page_cap() {
    let body = json!({
        "max_page_size": 500,
        "fields": [
            {"name": "id", "type": "integer"},
            {"name": "updated_at", "type": "timestamp"}
        ]
    });

    let schema = offline(GeneratorConfig::default())
        .build_schema("order", &body)
        .unwrap();

    assert_eq!(schema.max_page_size, Some(500));
    assert_eq!(schema.replication_key.as_deref(), Some("updated_at"));
}

#[test]
fn test_no_replication_key_is_not_an_error() {
    let body = json!([{"name": "code", "type": "string"}]);

    let schema = offline(GeneratorConfig::default())
        .build_schema("uom", &body)
        .unwrap();

    assert_eq!(schema.replication_key, None);
}

#[test]
fn test_candidate_order_wins() {
    let body = json!([
        {"name": "modified", "type": "datetime"},
        {"name": "updated_at", "type": "datetime"}
    ]);

    let schema = offline(GeneratorConfig::default())
        .build_schema("x", &body)
        .unwrap();

    assert_eq!(schema.replication_key.as_deref(), Some("updated_at"));
}

#[test]
fn test_replication_key_override() {
    let mut overrides = HashMap::new();
    overrides.insert("item".to_string(), "seq".to_string());
    overrides.insert("bin".to_string(), "missing".to_string());
    let generator = offline(GeneratorConfig {
        replication_key_overrides: overrides,
        ..GeneratorConfig::default()
    });

    let body = json!([
        {"name": "seq", "type": "bigint"},
        {"name": "mod_ts", "type": "datetime"}
    ]);

    let item = generator.build_schema("item", &body).unwrap();
    assert_eq!(item.replication_key.as_deref(), Some("seq"));

    // An override naming a non-existent field falls back to detection
    let bin = generator.build_schema("bin", &body).unwrap();
    assert_eq!(bin.replication_key.as_deref(), Some("mod_ts"));
}

#[test]
fn test_nested_fields_flattened() {
    let body = json!([
        {"name": "id", "type": "integer", "nullable": false},
        {"name": "address", "type": "object", "nullable": false, "fields": [
            {"name": "city", "type": "string", "nullable": false},
            {"name": "geo", "type": "object", "fields": [
                {"name": "lat", "type": "float"}
            ]}
        ]}
    ]);

    let flat = offline(GeneratorConfig {
        flatten: true,
        ..GeneratorConfig::default()
    })
    .build_schema("site", &body)
    .unwrap();

    let names: Vec<_> = flat.field_names().collect();
    assert_eq!(names, vec!["id", "address__city", "address__geo__lat"]);
    assert!(!flat.field("address__city").unwrap().nullable);
    assert!(flat.field("address__geo__lat").unwrap().nullable);

    let nested = offline(GeneratorConfig::default())
        .build_schema("site", &body)
        .unwrap();
    assert_eq!(
        nested.field("address").unwrap().canonical_type,
        CanonicalType::Object
    );
}

#[test]
fn test_malformed_describe_responses() {
    let generator = offline(GeneratorConfig::default());
    let cases = [
        json!({"columns": []}),
        json!("fields"),
        json!([{"type": "string"}]),
        json!([{"name": "a", "type": 5}]),
        json!([{"name": "a"}]),
        json!([{"name": "a", "type": "string"}, {"name": "a", "type": "integer"}]),
        json!({"fields": [], "max_page_size": -1}),
    ];

    for body in cases {
        let err = generator.build_schema("bad", &body).unwrap_err();
        assert!(
            matches!(err, Error::Schema { ref entity, .. } if entity == "bad"),
            "unexpected error for {body}: {err}"
        );
    }
}

#[test]
fn test_json_schema_rendering() {
    let body = json!([
        {"name": "id", "type": "integer", "nullable": false},
        {"name": "created", "type": "date"}
    ]);
    let schema = offline(GeneratorConfig::default())
        .build_schema("item", &body)
        .unwrap();

    let rendered = schema.to_json_schema().to_json();

    assert_eq!(rendered["type"], "object");
    assert_eq!(rendered["title"], "item");
    assert_eq!(rendered["properties"]["id"]["type"], "integer");
    assert_eq!(rendered["properties"]["created"]["type"], json!(["string", "null"]));
    assert_eq!(rendered["properties"]["created"]["format"], "date");
    assert_eq!(rendered["required"], json!(["id"]));
}

#[tokio::test]
async fn test_generate_fetches_describe_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item/describe/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fields": [{"name": "id", "type": "integer"}, {"name": "mod_ts", "type": "datetime"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entity = EntityRef::new("item", "/item/", "/item/describe/");
    let schema = generator(&server.uri(), GeneratorConfig::default())
        .generate(&entity, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(schema.fields.len(), 2);
    assert_eq!(schema.replication_key.as_deref(), Some("mod_ts"));
}

#[tokio::test]
async fn test_generate_http_failure_is_schema_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item/describe/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let entity = EntityRef::new("item", "/item/", "/item/describe/");
    let err = generator(&server.uri(), GeneratorConfig::default())
        .generate(&entity, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Schema { .. }));
}
