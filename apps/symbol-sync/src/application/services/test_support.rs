//! Hand-written fakes for the service tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::Notify;

use crate::application::ports::{ApiError, KeyValueStore, Mirror, StoreError, SymbolApi};
use crate::domain::feed::FeedItem;
use crate::domain::symbol::{OpsPage, SnapshotPage, SymbolRecord};

// =============================================================================
// Symbol API
// =============================================================================

/// In-memory symbols API: a snapshot of `count` symbols and an op log.
#[derive(Default)]
pub struct FakeApi {
    pub snapshot_count: usize,
    pub snapshot_cursor: u64,
    pub server_cursor: Mutex<u64>,
    pub ops: Mutex<Vec<Value>>,
    pub snapshot_calls: Mutex<Vec<(usize, usize)>>,
    pub ops_calls: Mutex<Vec<(u64, usize)>>,
    pub fail_snapshot_at: Option<usize>,
    pub fail_ops: Mutex<bool>,
    /// When set, each ops fetch waits for `release` after signalling `started`.
    pub hold_ops: Mutex<bool>,
    pub started: Notify,
    pub release: Notify,
}

impl FakeApi {
    pub fn with_upserts(vers: impl IntoIterator<Item = u64>) -> Self {
        let api = Self::default();
        {
            let mut ops = api.ops.lock();
            for ver in vers {
                ops.push(json!({
                    "type": "upsert",
                    "symbol": format!("s{ver}"),
                    "doc": {"ver": ver},
                    "ver": ver
                }));
            }
        }
        api
    }

    pub fn with_snapshot(count: usize, cursor: u64) -> Self {
        Self {
            snapshot_count: count,
            snapshot_cursor: cursor,
            ..Self::default()
        }
    }

    pub fn push_op(&self, op: Value) {
        self.ops.lock().push(op);
    }

    pub fn ops_call_count(&self) -> usize {
        self.ops_calls.lock().len()
    }
}

#[async_trait]
impl SymbolApi for FakeApi {
    async fn fetch_snapshot(&self, limit: usize, offset: usize) -> Result<SnapshotPage, ApiError> {
        self.snapshot_calls.lock().push((limit, offset));
        if self.fail_snapshot_at == Some(offset) {
            return Err(ApiError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }
        let end = (offset + limit).min(self.snapshot_count);
        let items = (offset..end)
            .map(|i| json!({"symbol": format!("sym{i}"), "idx": i}))
            .collect();
        Ok(SnapshotPage {
            items,
            count: Some(self.snapshot_count as u64),
            current_cursor: Some(self.snapshot_cursor),
        })
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Result<Vec<SymbolRecord>, ApiError> {
        Ok(symbols
            .iter()
            .filter_map(|s| SymbolRecord::new(s, Map::new()))
            .collect())
    }

    async fn fetch_cursor(&self) -> Result<u64, ApiError> {
        Ok(*self.server_cursor.lock())
    }

    async fn fetch_ops_since(&self, since: u64, limit: usize) -> Result<OpsPage, ApiError> {
        self.ops_calls.lock().push((since, limit));
        if *self.hold_ops.lock() {
            self.started.notify_one();
            self.release.notified().await;
        }
        if *self.fail_ops.lock() {
            return Err(ApiError::Transport {
                message: "connection reset".to_string(),
            });
        }

        let newer: Vec<Value> = self
            .ops
            .lock()
            .iter()
            .filter(|op| op["ver"].as_u64().is_some_and(|v| v > since))
            .cloned()
            .collect();
        let has_more = newer.len() > limit;
        let ops: Vec<Value> = newer.into_iter().take(limit).collect();
        let to = ops.last().and_then(|op| op["ver"].as_u64());

        Ok(OpsPage {
            from: Some(since),
            to,
            ops,
            has_more,
        })
    }
}

// =============================================================================
// Mirror
// =============================================================================

/// Mirror that records every call.
#[derive(Default)]
pub struct RecordingMirror {
    pub symbols: Mutex<Map<String, Value>>,
    pub full_applies: Mutex<Vec<(usize, u64)>>,
    pub removed: Mutex<Vec<String>>,
    pub news: Mutex<Vec<(String, Value)>>,
    pub filings: Mutex<Vec<(String, Value)>>,
    pub clears: Mutex<usize>,
    pub hydration_completed: Mutex<usize>,
}

impl RecordingMirror {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.symbols.lock().len()
    }
}

impl Mirror for RecordingMirror {
    fn apply_full(&self, items: Vec<SymbolRecord>, version: u64) {
        self.full_applies.lock().push((items.len(), version));
        let mut symbols = self.symbols.lock();
        symbols.clear();
        for item in items {
            symbols.insert(item.symbol, Value::Object(item.fields));
        }
    }

    fn upsert(&self, items: Vec<SymbolRecord>) {
        let mut symbols = self.symbols.lock();
        for item in items {
            symbols.insert(item.symbol, Value::Object(item.fields));
        }
    }

    fn remove(&self, symbols: &[String]) {
        let mut map = self.symbols.lock();
        for s in symbols {
            map.remove(s);
            self.removed.lock().push(s.clone());
        }
    }

    fn attach_news(&self, item: &FeedItem, symbol: &str) {
        self.news.lock().push((symbol.to_string(), item.as_value().clone()));
    }

    fn attach_filing(&self, item: &FeedItem, symbol: &str) {
        self.filings
            .lock()
            .push((symbol.to_string(), item.as_value().clone()));
    }

    fn clear_news(&self) {
        self.news.lock().clear();
        *self.clears.lock() += 1;
    }

    fn clear_filings(&self) {
        self.filings.lock().clear();
        *self.clears.lock() += 1;
    }

    fn mark_hydration_complete(&self) {
        *self.hydration_completed.lock() += 1;
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Key-value store held in memory.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Map<String, Value>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }

    fn set_many(&self, entries: &Map<String, Value>) -> Result<(), StoreError> {
        let mut data = self.data.lock();
        for (k, v) in entries {
            data.insert(k.clone(), v.clone());
        }
        Ok(())
    }
}
