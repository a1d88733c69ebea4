#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Symbol Sync - Oracle Mirror Synchronization Engine
//!
//! Keeps a local mirror of the oracle's symbol universe, plus its news and
//! filing streams, consistent with the server over an unreliable long-lived
//! WebSocket and the symbols REST API.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core sync types
//!   - `symbol`: Symbol records, ops, snapshot pages
//!   - `connection`: Connection lifecycle state machine
//!   - `feed`: News/filing items and rolling buffers
//!   - `events`: Progress events
//!
//! - **Application**: Services and port definitions
//!   - `ports`: Symbol API, mirror, and key-value store interfaces
//!   - `services`: Cursor store, hydrator, delta puller, resync, event hub
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `oracle`: WebSocket connection, registration, frame dispatch
//!   - `http`: Symbols REST client with retries
//!   - `storage`: JSON file key-value store
//!   - `mirror`: In-memory reference mirror
//!   - `config`: Configuration and engine wiring
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                  doorbell            ops since cursor
//! Oracle WS ──► Dispatcher ──► DeltaPuller ◄──────────── REST /symbols/ops
//!    │                              │
//!    │ register_ack                 ▼
//!    └──────► Resync ──► Hydrator ──► Mirror ◄── feeds / session
//!                            │
//!                        CursorStore ──► oracle-store.json
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core sync types with no I/O.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::events::SyncEvent;
pub use domain::feed::{FeedItem, FeedKind};
pub use domain::symbol::{Op, OpKind, OpsPage, SnapshotPage, SymbolDoc, SymbolRecord};

// Ports
pub use application::ports::{ApiError, KeyValueStore, Mirror, StoreError, SymbolApi};

// Services
pub use application::services::{
    CursorStore, DeltaPuller, EventHub, HydrationConfig, HydrationError, Hydrator, PullError,
    ResyncCoordinator,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, Credentials, EngineError, SyncConfig, SyncEngine,
};

// Adapters
pub use infrastructure::http::{SymbolApiClient, SymbolApiConfig};
pub use infrastructure::mirror::InMemoryMirror;
pub use infrastructure::oracle::{ConnectionError, ConnectionManager};
pub use infrastructure::storage::FileKeyValueStore;

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
