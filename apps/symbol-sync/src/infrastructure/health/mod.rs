//! Health and Status Endpoint
//!
//! Reports whether the mirror is being kept in sync, and serves the
//! Prometheus scrape.
//!
//! # Endpoints
//!
//! - `GET /health` - Sync report (503 once registration was rejected)
//! - `GET /healthz` - Liveness, always OK while the process serves HTTP
//! - `GET /readyz` - 200 only while registered with the oracle
//! - `GET /metrics` - Prometheus text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::connection::ConnectionState;
use crate::infrastructure::config::SyncEngine;
use crate::infrastructure::metrics::get_metrics_handle;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// =============================================================================
// Report
// =============================================================================

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall verdict.
    pub status: HealthStatus,
    /// Crate version.
    pub version: String,
    /// Seconds since the server state was created.
    pub uptime_secs: u64,
    /// Wall clock at report time.
    pub current_time: DateTime<Utc>,
    /// Oracle socket.
    pub connection: ConnectionInfo,
    /// Catch-up progress.
    pub sync: SyncInfo,
    /// Rolling feed buffers.
    pub feeds: FeedsInfo,
}

/// Overall verdict derived from the connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Registered; doorbells are flowing.
    Healthy,
    /// Not registered yet, or between reconnects.
    Degraded,
    /// Registration was refused. Needs new credentials and a restart.
    Unhealthy,
}

impl From<ConnectionState> for HealthStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Registered => Self::Healthy,
            ConnectionState::PermanentlyRejected => Self::Unhealthy,
            ConnectionState::Disconnected
            | ConnectionState::Connecting
            | ConnectionState::Open
            | ConnectionState::Registering => Self::Degraded,
        }
    }
}

/// Oracle socket section.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Registration accepted.
    pub registered: bool,
    /// Connect attempts since start.
    pub attempts: u32,
}

/// Catch-up section.
#[derive(Debug, Clone, Serialize)]
pub struct SyncInfo {
    /// Highest applied op version.
    pub cursor: u64,
    /// A delta pull loop is running.
    pub pulling: bool,
    /// A snapshot hydration is running.
    pub hydrating: bool,
    /// Live `SyncEvent` receivers.
    pub event_subscribers: usize,
}

/// Feed buffer section.
#[derive(Debug, Clone, Serialize)]
pub struct FeedsInfo {
    /// Buffered headlines.
    pub news: usize,
    /// Buffered filings.
    pub filings: usize,
}

#[derive(Debug, Serialize)]
struct Readiness {
    ready: bool,
    state: ConnectionState,
}

// =============================================================================
// Server
// =============================================================================

/// State shared by the handlers.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    engine: Arc<SyncEngine>,
}

impl HealthServerState {
    /// Report on `engine` under `version`.
    #[must_use]
    pub fn new(version: String, engine: Arc<SyncEngine>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            engine,
        }
    }

    fn report(&self) -> HealthResponse {
        let engine = &self.engine;
        let state = engine.state();
        let dispatcher = engine.dispatcher();

        HealthResponse {
            status: state.into(),
            version: self.version.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            current_time: Utc::now(),
            connection: ConnectionInfo {
                state,
                registered: state.is_registered(),
                attempts: engine.connection().attempts(),
            },
            sync: SyncInfo {
                cursor: engine.cursor(),
                pulling: engine.is_pulling(),
                hydrating: engine.is_hydrating(),
                event_subscribers: engine.events().receiver_count(),
            },
            feeds: FeedsInfo {
                news: dispatcher.recent_news().len(),
                filings: dispatcher.recent_filings().len(),
            },
        }
    }
}

/// HTTP server for the endpoints above.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Serve on `0.0.0.0:port` until `cancel` fires.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the configured port and serve.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::Bind` if the port is taken, or
    /// `HealthServerError::Serve` if the accept loop fails.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| HealthServerError::Bind {
                port: self.port,
                source,
            })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::Serve` if the accept loop fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "Health server listening");
        }

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(HealthServerError::Serve)?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Health routes over `state`.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(|| async { "OK" }))
        .route("/readyz", get(readiness))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health(State(state): State<Arc<HealthServerState>>) -> Response {
    let report = state.report();
    let code = if report.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report)).into_response()
}

async fn readiness(State(state): State<Arc<HealthServerState>>) -> Response {
    let connection = state.engine.state();
    let ready = connection.is_registered();
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(Readiness {
            ready,
            state: connection,
        }),
    )
        .into_response()
}

async fn metrics() -> Response {
    match get_metrics_handle() {
        Some(handle) => (
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Health server failures.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// The port could not be bound.
    #[error("failed to bind health port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Bind error.
        #[source]
        source: std::io::Error,
    },

    /// The accept loop stopped with an error.
    #[error("health server failed: {0}")]
    Serve(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use test_case::test_case;

    use super::*;
    use crate::application::services::test_support::{FakeApi, MemoryStore, RecordingMirror};
    use crate::infrastructure::config::{Credentials, SyncConfig};

    #[test_case(ConnectionState::Registered, HealthStatus::Healthy)]
    #[test_case(ConnectionState::Registering, HealthStatus::Degraded)]
    #[test_case(ConnectionState::Open, HealthStatus::Degraded)]
    #[test_case(ConnectionState::Disconnected, HealthStatus::Degraded)]
    #[test_case(ConnectionState::PermanentlyRejected, HealthStatus::Unhealthy)]
    fn status_follows_connection(state: ConnectionState, expected: HealthStatus) {
        assert_eq!(HealthStatus::from(state), expected);
    }

    async fn spawn_server(cancel: CancellationToken) -> String {
        let config = SyncConfig::with_credentials(Credentials::new("tok".into(), "user-1".into()));
        let engine = Arc::new(SyncEngine::with_ports(
            config,
            Arc::new(FakeApi::with_upserts(1..=3)),
            Arc::new(MemoryStore::default()),
            RecordingMirror::new(),
            cancel.clone(),
        ));
        engine.pull_to_at_least(3).await.unwrap();

        let state = Arc::new(HealthServerState::new("9.9.9".into(), engine));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(HealthServer::new(0, state, cancel).serve(listener));
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn unregistered_engine_is_live_but_not_ready() {
        let cancel = CancellationToken::new();
        let base = spawn_server(cancel.clone()).await;
        let http = reqwest::Client::new();

        let live = http.get(format!("{base}/healthz")).send().await.unwrap();
        assert_eq!(live.status(), reqwest::StatusCode::OK);

        let ready = http.get(format!("{base}/readyz")).send().await.unwrap();
        assert_eq!(ready.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = ready.json().await.unwrap();
        assert_eq!(body["ready"], false);

        cancel.cancel();
    }

    #[tokio::test]
    async fn health_reports_cursor_and_degraded_status() {
        let cancel = CancellationToken::new();
        let base = spawn_server(cancel.clone()).await;

        let response = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["version"], "9.9.9");
        assert_eq!(body["sync"]["cursor"], 3);
        assert_eq!(body["sync"]["pulling"], false);
        assert_eq!(body["connection"]["registered"], false);
        assert_eq!(body["feeds"]["news"], 0);

        cancel.cancel();
    }
}
