//! Sync Engine Container
//!
//! Creates and wires every sync component and exposes the engine's outward
//! operations.
//!
//! ```text
//! ConnectionManager ──frames──► Dispatcher ──doorbell──► DeltaPuller ──┐
//!        │                          │                                  ├──► Mirror
//!        └──registered──► ResyncCoordinator ──► Hydrator ──────────────┘
//!                                                    │
//!                                               CursorStore ──► KeyValueStore
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::settings::SyncConfig;
use crate::application::ports::{ApiError, KeyValueStore, Mirror, StoreError, SymbolApi};
use crate::application::services::{
    CursorStore, DeltaPuller, EventHub, Hydrator, PullError, ResyncCoordinator, new_apply_gate,
};
use crate::domain::connection::ConnectionState;
use crate::domain::events::SyncEvent;
use crate::infrastructure::http::{SymbolApiClient, SymbolApiConfig};
use crate::infrastructure::oracle::{
    AuthContext, ConnectionConfig, ConnectionError, ConnectionManager, Dispatcher,
    ReconnectConfig,
};
use crate::infrastructure::storage::FileKeyValueStore;

/// Engine construction error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// REST client could not be built.
    #[error("symbol API client: {0}")]
    Api(#[from] ApiError),
}

/// Fully wired sync engine.
pub struct SyncEngine {
    config: SyncConfig,
    api: Arc<dyn SymbolApi>,
    mirror: Arc<dyn Mirror>,
    cursor: Arc<CursorStore>,
    events: EventHub,
    puller: Arc<DeltaPuller>,
    resync: Arc<ResyncCoordinator>,
    dispatcher: Arc<Dispatcher>,
    connection: Arc<ConnectionManager>,
    shutdown: CancellationToken,
}

impl SyncEngine {
    /// Wire the engine with the REST client and the JSON file store.
    ///
    /// # Errors
    ///
    /// Returns an error if the REST client cannot be built.
    pub fn new(
        config: SyncConfig,
        mirror: Arc<dyn Mirror>,
        shutdown: CancellationToken,
    ) -> Result<Self, EngineError> {
        let api_config = SymbolApiConfig::new(config.oracle.api_url.clone())
            .with_token(Some(config.credentials.token().to_string()))
            .with_timeout(config.http.timeout)
            .with_retry(config.http.retry);
        let api = Arc::new(SymbolApiClient::new(&api_config)?);
        let store = Arc::new(FileKeyValueStore::open(config.sync.cursor_path.clone()));

        tracing::info!(
            api_url = %api_config.base_url,
            cursor_path = %config.sync.cursor_path.display(),
            "Sync engine wired"
        );
        Ok(Self::with_ports(config, api, store, mirror, shutdown))
    }

    /// Wire the engine over explicit port implementations.
    #[must_use]
    pub fn with_ports(
        config: SyncConfig,
        api: Arc<dyn SymbolApi>,
        store: Arc<dyn KeyValueStore>,
        mirror: Arc<dyn Mirror>,
        shutdown: CancellationToken,
    ) -> Self {
        let events = EventHub::new(config.sync.event_capacity);
        let cursor = Arc::new(CursorStore::new(store, config.sync.cursor_flush_interval));
        let gate = new_apply_gate();

        let hydrator = Arc::new(Hydrator::new(
            Arc::clone(&api),
            Arc::clone(&mirror),
            Arc::clone(&cursor),
            config.sync.hydration,
            gate.clone(),
        ));
        let puller = Arc::new(DeltaPuller::new(
            Arc::clone(&api),
            Arc::clone(&mirror),
            Arc::clone(&cursor),
            events.clone(),
            config.sync.ops_page_size,
            gate,
        ));
        let resync = Arc::new(ResyncCoordinator::new(
            hydrator,
            Arc::clone(&puller),
            Arc::clone(&api),
            events.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&puller),
            Arc::clone(&resync),
            Arc::clone(&mirror),
            events.clone(),
            config.sync.feed_capacity,
        ));
        let connection = Arc::new(ConnectionManager::new(
            ConnectionConfig {
                url: config.oracle.ws_url.clone(),
                reconnect: ReconnectConfig::fixed(config.sync.reconnect_delay),
            },
            Arc::clone(&dispatcher),
            Arc::clone(&resync),
            events.clone(),
            shutdown.clone(),
        ));

        Self {
            config,
            api,
            mirror,
            cursor,
            events,
            puller,
            resync,
            dispatcher,
            connection,
            shutdown,
        }
    }

    /// Open the oracle connection with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::MissingAuth` for blank credentials and
    /// `ConnectionError::PermanentlyRejected` after a rejection.
    pub fn start(&self) -> Result<(), ConnectionError> {
        let auth = AuthContext::new(
            self.config.credentials.token(),
            self.config.credentials.user_id(),
            Some(self.config.oracle.role.clone()),
        )?;
        tracing::info!(
            url = %self.config.oracle.ws_url,
            cursor = self.cursor.get(),
            "Starting oracle connection"
        );
        self.connection.open(auth)
    }

    /// Queue a full hydration plus catch-up in the background.
    ///
    /// Returns `false` if one was already running; it reruns once afterwards.
    pub fn request_hydration(&self) -> bool {
        self.resync.request_hydration()
    }

    /// Catch up to at least `target`, coalescing with any running pull.
    ///
    /// # Errors
    ///
    /// Returns the pull error if this call owned the loop and it failed.
    pub async fn pull_to_at_least(&self, target: u64) -> Result<u64, PullError> {
        self.puller.pull_to_at_least(target).await
    }

    /// Fetch the given tickers from the batch endpoint and upsert them.
    ///
    /// Returns the number of records applied.
    ///
    /// # Errors
    ///
    /// Returns the API error; the mirror is unchanged in that case.
    pub async fn refresh_symbols(&self, symbols: &[String]) -> Result<usize, ApiError> {
        let records = self.api.fetch_batch(symbols).await?;
        let applied = records.len();
        if applied > 0 {
            self.mirror.upsert(records);
        }
        tracing::debug!(requested = symbols.len(), applied, "Symbols refreshed");
        Ok(applied)
    }

    /// Subscribe to progress events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Event hub, for the metrics recorder.
    #[must_use]
    pub const fn events(&self) -> &EventHub {
        &self.events
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Cursor the mirror is consistent with.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor.get()
    }

    /// Connection manager.
    #[must_use]
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Frame dispatcher (recent feeds and session state).
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Whether a delta pull loop is running.
    #[must_use]
    pub fn is_pulling(&self) -> bool {
        self.puller.is_running()
    }

    /// Whether a hydration is running.
    #[must_use]
    pub fn is_hydrating(&self) -> bool {
        self.resync.is_running()
    }

    /// Loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Stop the connection and durably write the cursor.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the final cursor write fails.
    pub fn shutdown(&self) -> Result<(), StoreError> {
        tracing::info!(cursor = self.cursor.get(), "Sync engine shutting down");
        self.shutdown.cancel();
        self.connection.close();
        self.cursor.flush_sync()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::services::test_support::{FakeApi, MemoryStore, RecordingMirror};
    use crate::infrastructure::config::Credentials;

    fn engine(api: Arc<FakeApi>, mirror: Arc<RecordingMirror>, store: Arc<MemoryStore>) -> SyncEngine {
        let config =
            SyncConfig::with_credentials(Credentials::new("tok".into(), "user-1".into()));
        SyncEngine::with_ports(config, api, store, mirror, CancellationToken::new())
    }

    #[tokio::test]
    async fn pull_to_at_least_applies_ops_and_persists_on_shutdown() {
        let api = Arc::new(FakeApi::with_upserts(1..=5));
        let mirror = RecordingMirror::new();
        let store = Arc::new(MemoryStore::default());
        let engine = engine(api, mirror.clone(), store.clone());

        assert_eq!(engine.pull_to_at_least(5).await.unwrap(), 5);
        assert_eq!(engine.cursor(), 5);
        assert_eq!(mirror.len(), 5);

        engine.shutdown().unwrap();
        assert_eq!(store.get("symbols.lastAckCursor"), Some(json!(5)));
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn refresh_symbols_upserts_batch() {
        let api = Arc::new(FakeApi::default());
        let mirror = RecordingMirror::new();
        let engine = engine(api, mirror.clone(), Arc::new(MemoryStore::default()));

        let applied = engine
            .refresh_symbols(&["aapl".into(), "msft".into()])
            .await
            .unwrap();

        assert_eq!(applied, 2);
        assert!(mirror.symbols.lock().contains_key("AAPL"));
    }

    #[tokio::test]
    async fn start_rejects_blank_credentials() {
        let config = SyncConfig::with_credentials(Credentials::new(" ".into(), "u".into()));
        let engine = SyncEngine::with_ports(
            config,
            Arc::new(FakeApi::default()),
            Arc::new(MemoryStore::default()),
            RecordingMirror::new(),
            CancellationToken::new(),
        );

        assert!(matches!(engine.start(), Err(ConnectionError::MissingAuth(_))));
        assert_eq!(engine.connection().attempts(), 0);
    }
}
