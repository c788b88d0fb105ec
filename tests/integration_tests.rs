//! Integration tests using mock HTTP server
//!
//! Tests the full flow: YAML config → discovery → schemas → paginated sync →
//! bookmarks persisted to disk → incremental resume.

use entity_tap::engine::{EntityStatus, Message};
use entity_tap::state::{BookmarkStore, BookmarkValue, FileBookmarkStore};
use entity_tap::{SyncMode, Tap, TapConfig};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, state_path: &Path) -> TapConfig {
    let yaml = format!(
        r#"
base_url: {}
http:
  max_retries: 2
  backoff: {{ type: constant, initial: 1ms, max: 1ms }}
sync:
  mode: incremental
  overlap_window: 10m
  page_size: 2
entities:
  location:
    mode: full_table
state_path: {}
"#,
        server.uri(),
        state_path.display()
    );
    TapConfig::from_str(&yaml).unwrap()
}

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["item", "location"])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/item/describe/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "fields": [
                {"name": "id", "type": "AutoField", "nullable": false},
                {"name": "name", "type": "CharField"},
                {"name": "mod_ts", "type": "DateTimeField"}
            ],
            "max_page_size": 500
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/location/describe/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "code", "type": "string", "nullable": false},
            {"name": "capacity", "type": "decimal"}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/location/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"code": "A1", "capacity": 12.5}],
            "next_page": null
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_discover_builds_catalog() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let tap = Tap::new(config(&server, &dir.path().join("state.json")))
        .await
        .unwrap();
    let catalog = tap.discover(&CancellationToken::new()).await.unwrap();

    assert_eq!(catalog.entries.len(), 2);

    let item = &catalog.entries[0];
    assert_eq!(item.entity, "item");
    assert_eq!(item.mode, SyncMode::Incremental);
    assert_eq!(item.replication_key.as_deref(), Some("mod_ts"));
    assert_eq!(item.max_page_size, Some(500));
    assert_eq!(item.schema["properties"]["id"]["type"], "integer");
    assert_eq!(
        item.schema["properties"]["mod_ts"]["type"],
        json!(["string", "null"])
    );
    assert_eq!(item.schema["properties"]["mod_ts"]["format"], "date-time");

    let location = &catalog.entries[1];
    assert_eq!(location.mode, SyncMode::FullTable);
    assert_eq!(location.replication_key, None);
}

#[tokio::test]
async fn test_check_reports_entity_count() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = tempfile::tempdir().unwrap();

    let tap = Tap::new(config(&server, &dir.path().join("state.json")))
        .await
        .unwrap();
    let result = tap.check(&CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(result.entities, 2);
}

#[tokio::test]
async fn test_read_then_resume_from_bookmark() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state").join("bookmarks.json");

    // First run: full scan over two pages
    Mock::given(method("GET"))
        .and(path("/item/"))
        .and(query_param("page_size", "2"))
        .and(query_param("ordering", "mod_ts"))
        .and(query_param_is_missing("mod_ts__gte"))
        .and(query_param_is_missing("cursor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": 1, "name": "bolt", "mod_ts": "2024-01-02T00:00:00Z"},
                {"id": 2, "name": "nut", "mod_ts": "2024-01-01T00:00:00Z"}
            ],
            "next_page": "/item/?cursor=B"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/item/"))
        .and(query_param("cursor", "B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 3, "name": "gear", "mod_ts": "2024-01-03T00:00:00Z"}],
            "next_page": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tap = Arc::new(
        Tap::new(config(&server, &state_path))
            .await
            .unwrap(),
    );
    let (messages, handle) = tap.read_stream(CancellationToken::new());
    let messages: Vec<Message> = messages.collect().await;
    let report = handle.await.unwrap().unwrap();

    assert!(report.is_success());
    assert_eq!(report.outcomes.len(), 2);
    let item = report.outcome("item").unwrap();
    assert_eq!(item.records, 3);
    assert_eq!(item.pages, 2);
    assert!(matches!(item.status, EntityStatus::Committed { .. }));
    assert_eq!(report.outcome("location").unwrap().status, EntityStatus::Completed);

    let item_records: usize = messages
        .iter()
        .filter_map(|m| match m {
            Message::Records { entity, records } if entity == "item" => Some(records.len()),
            _ => None,
        })
        .sum();
    assert_eq!(item_records, 3);
    assert_eq!(
        messages
            .iter()
            .filter(|m| matches!(m, Message::Bookmark { .. }))
            .count(),
        1
    );
    drop(tap);

    // The bookmark survived on disk
    let store = FileBookmarkStore::open(&state_path).await.unwrap();
    let bookmark = store.load("item").await.unwrap().unwrap();
    assert_eq!(
        bookmark.last_value,
        BookmarkValue::parse("2024-01-03T00:00:00Z")
    );
    assert!(store.load("location").await.unwrap().is_none());

    // Second run resumes ten minutes before the bookmark
    server.reset().await;
    mount_catalog(&server).await;
    Mock::given(method("GET"))
        .and(path("/item/"))
        .and(query_param("mod_ts__gte", "2024-01-02T23:50:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 3, "name": "gear", "mod_ts": "2024-01-03T00:00:00Z"},
                        {"id": 4, "name": "cog", "mod_ts": "2024-01-04T08:30:00Z"}],
            "next_page": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tap = Tap::new(config(&server, &state_path)).await.unwrap();
    let (tx, _rx) = tokio::sync::mpsc::channel(64);
    let report = tap.read(&CancellationToken::new(), &tx).await.unwrap();

    match &report.outcome("item").unwrap().status {
        EntityStatus::Committed { bookmark } => {
            assert_eq!(bookmark.last_value.to_query_value(), "2024-01-04T08:30:00Z");
        }
        other => panic!("unexpected status: {other:?}"),
    }
}

#[tokio::test]
async fn test_read_aborts_when_listing_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    let tap = Tap::new(config(&server, &dir.path().join("state.json")))
        .await
        .unwrap();
    let (tx, _rx) = tokio::sync::mpsc::channel(64);
    let err = tap.read(&CancellationToken::new(), &tx).await.unwrap_err();

    assert!(matches!(err, entity_tap::Error::Auth { .. }));
    assert!(!tap.check(&CancellationToken::new()).await.success);
}
