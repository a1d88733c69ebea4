//! Catch-up Integration Tests
//!
//! Runs delta pulls and snapshot hydration through the real REST client
//! against a mocked symbols API, with the cursor persisted to a temp file.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use symbol_sync::application::services::new_apply_gate;
use symbol_sync::infrastructure::http::RetryConfig;
use symbol_sync::{
    CursorStore, Credentials, FileKeyValueStore, HydrationConfig, Hydrator, InMemoryMirror,
    SymbolApiClient, SymbolApiConfig, SyncConfig, SyncEngine,
};

// =============================================================================
// Harness
// =============================================================================

fn client(api: &MockServer) -> Arc<SymbolApiClient> {
    Arc::new(
        SymbolApiClient::new(
            &SymbolApiConfig::new(api.uri()).with_retry(RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            }),
        )
        .unwrap(),
    )
}

fn engine(api: &MockServer, dir: &TempDir, page_size: usize) -> (SyncEngine, Arc<InMemoryMirror>) {
    let mut config = SyncConfig::with_credentials(Credentials::new("tok".into(), "user-1".into()));
    config.oracle.api_url = api.uri();
    config.sync.ops_page_size = page_size;

    let store = Arc::new(FileKeyValueStore::open(dir.path().join("store.json")));
    let mirror = Arc::new(InMemoryMirror::new());
    let engine = SyncEngine::with_ports(
        config,
        client(api),
        store,
        mirror.clone(),
        CancellationToken::new(),
    );
    (engine, mirror)
}

/// Upsert ops for versions `from..=to`, one symbol each.
fn upserts(from: u64, to: u64) -> Vec<Value> {
    (from..=to)
        .map(|ver| json!({"type": "upsert", "symbol": format!("S{ver}"), "doc": {"ver": ver}, "ver": ver}))
        .collect()
}

fn ops_page(from: u64, to: u64, has_more: bool) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "from": from,
        "to": to,
        "ops": upserts(from, to),
        "hasMore": has_more
    }))
}

fn snapshot_items(offset: usize, len: usize) -> Vec<Value> {
    (offset..offset + len)
        .map(|i| json!({"symbol": format!("SYM{i}")}))
        .collect()
}

async fn ops_requests(api: &MockServer) -> usize {
    api.received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/symbols/ops")
        .count()
}

// =============================================================================
// Delta pull
// =============================================================================

#[tokio::test]
async fn pulls_pages_until_has_more_is_false() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/symbols/ops"))
        .and(query_param("since", "0"))
        .and(query_param("limit", "100"))
        .respond_with(ops_page(1, 100, true))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/symbols/ops"))
        .and(query_param("since", "100"))
        .and(query_param("limit", "100"))
        .respond_with(ops_page(101, 150, false))
        .expect(1)
        .mount(&api)
        .await;

    let dir = TempDir::new().unwrap();
    let (engine, mirror) = engine(&api, &dir, 100);

    let cursor = engine.pull_to_at_least(150).await.unwrap();

    assert_eq!(cursor, 150);
    assert_eq!(mirror.len(), 150);
    assert_eq!(mirror.get("S150").unwrap()["ver"], json!(150));

    engine.shutdown().unwrap();
    let saved: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("store.json")).unwrap())
            .unwrap();
    assert_eq!(saved["symbols.lastAckCursor"], json!(150));
}

#[tokio::test]
async fn resumes_from_persisted_cursor_in_one_request() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/symbols/ops"))
        .and(query_param("since", "100"))
        .and(query_param("limit", "1000"))
        .respond_with(ops_page(101, 500, false))
        .expect(1)
        .mount(&api)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("store.json"),
        json!({"symbols.lastAckCursor": 100}).to_string(),
    )
    .unwrap();
    let (engine, mirror) = engine(&api, &dir, 1000);
    assert_eq!(engine.cursor(), 100);

    let cursor = engine.pull_to_at_least(500).await.unwrap();

    assert_eq!(cursor, 500);
    assert_eq!(mirror.len(), 400);
    assert!(mirror.get("S100").is_none());
    assert_eq!(ops_requests(&api).await, 1);
}

#[tokio::test]
async fn target_at_or_below_cursor_makes_no_request() {
    let api = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("store.json"),
        json!({"symbols.lastAckCursor": 40}).to_string(),
    )
    .unwrap();
    let (engine, _mirror) = engine(&api, &dir, 1000);

    assert_eq!(engine.pull_to_at_least(40).await.unwrap(), 40);
    assert_eq!(engine.pull_to_at_least(12).await.unwrap(), 40);
    assert_eq!(ops_requests(&api).await, 0);
}

#[tokio::test]
async fn concurrent_doorbells_coalesce_into_one_loop() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/symbols/ops"))
        .and(query_param("since", "0"))
        .respond_with(ops_page(1, 5, false).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/symbols/ops"))
        .and(query_param("since", "5"))
        .respond_with(ops_page(6, 9, false))
        .expect(1)
        .mount(&api)
        .await;

    let dir = TempDir::new().unwrap();
    let (engine, mirror) = engine(&api, &dir, 1000);
    let engine = Arc::new(engine);

    let owner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.pull_to_at_least(5).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.is_pulling());

    // Joins the running loop and returns right away with the merged target.
    assert_eq!(engine.pull_to_at_least(9).await.unwrap(), 9);

    assert_eq!(owner.await.unwrap().unwrap(), 9);
    assert!(!engine.is_pulling());
    assert_eq!(engine.cursor(), 9);
    assert_eq!(mirror.len(), 9);
    assert_eq!(ops_requests(&api).await, 2);
}

#[tokio::test]
async fn failed_page_keeps_earlier_progress() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/symbols/ops"))
        .and(query_param("since", "0"))
        .respond_with(ops_page(1, 10, true))
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/symbols/ops"))
        .and(query_param("since", "10"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&api)
        .await;

    let dir = TempDir::new().unwrap();
    let (engine, mirror) = engine(&api, &dir, 10);

    let err = engine.pull_to_at_least(30).await.unwrap_err();

    assert!(err.to_string().contains("10"), "unexpected error: {err}");
    assert_eq!(engine.cursor(), 10);
    assert_eq!(mirror.len(), 10);
    assert!(!engine.is_pulling());
}

// =============================================================================
// Snapshot hydration
// =============================================================================

#[tokio::test]
async fn large_snapshot_is_fetched_in_four_sized_pages() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/symbols/snapshot"))
        .and(query_param("limit", "1000"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": snapshot_items(0, 1000),
            "count": 12_000,
            "currentCursor": 777
        })))
        .expect(1)
        .mount(&api)
        .await;
    for offset in [1000_usize, 4000, 7000, 10_000] {
        let len = 3000.min(12_000 - offset);
        Mock::given(method("GET"))
            .and(path("/symbols/snapshot"))
            .and(query_param("limit", "3000"))
            .and(query_param("offset", offset.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": snapshot_items(offset, len),
                "count": 12_000,
                "currentCursor": 777
            })))
            .expect(1)
            .mount(&api)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileKeyValueStore::open(dir.path().join("store.json")));
    let cursor = Arc::new(CursorStore::new(store, Duration::from_millis(10)));
    let mirror = Arc::new(InMemoryMirror::new());
    let hydrator = Hydrator::new(
        client(&api),
        mirror.clone(),
        cursor.clone(),
        HydrationConfig::default(),
        new_apply_gate(),
    );

    let applied = hydrator.hydrate_all(1000).await.unwrap();

    assert_eq!(applied, 12_000);
    assert_eq!(mirror.len(), 12_000);
    assert!(mirror.get("SYM11999").is_some());
    assert_eq!(cursor.get(), 777);
    assert_eq!(mirror.stats().version, 777);
}

#[tokio::test]
async fn failed_snapshot_page_leaves_mirror_untouched() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/symbols/snapshot"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": snapshot_items(0, 2),
            "count": 4,
            "currentCursor": 9
        })))
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/symbols/snapshot"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&api)
        .await;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileKeyValueStore::open(dir.path().join("store.json")));
    let cursor = Arc::new(CursorStore::new(store, Duration::from_millis(10)));
    let mirror = Arc::new(InMemoryMirror::new());
    let hydrator = Hydrator::new(
        client(&api),
        mirror.clone(),
        cursor.clone(),
        HydrationConfig::default(),
        new_apply_gate(),
    );

    assert!(hydrator.hydrate_all(2).await.is_err());
    assert!(mirror.is_empty());
    assert_eq!(cursor.get(), 0);
}
