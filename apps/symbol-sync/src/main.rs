//! Symbol Sync Binary
//!
//! Runs the sync engine against the oracle with the in-memory mirror.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin symbol-sync
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `ORACLE_TOKEN`: Bearer token
//! - `ORACLE_USER_ID`: User id (manifest id is `{user}-terra`)
//!
//! ## Optional
//! - `ORACLE_WS_URL`: Oracle WebSocket URL
//! - `ORACLE_API_URL`: Symbols REST base URL
//! - `ORACLE_ROLE`: Manifest role (default: monitor)
//! - `SYNC_RECONNECT_DELAY_MS`: Delay before each reconnect (default: 5000)
//! - `SYNC_OPS_PAGE_SIZE`: Ops per delta page (default: 1000)
//! - `SYNC_CURSOR_PATH`: Cursor file (default: ./data/oracle-store.json)
//! - `SYNC_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: `symbol_sync=info`)

use std::sync::Arc;

use symbol_sync::infrastructure::metrics::spawn_event_recorder;
use symbol_sync::infrastructure::telemetry;
use symbol_sync::{
    HealthServer, HealthServerState, InMemoryMirror, SyncConfig, SyncEngine, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Symbol Sync");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable");
    }

    let config = SyncConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let health_port = config.server.health_port;

    let mirror = Arc::new(InMemoryMirror::with_feed_capacity(config.sync.feed_capacity));
    let engine = Arc::new(SyncEngine::new(
        config,
        mirror.clone(),
        shutdown_token.clone(),
    )?);

    let _recorder = spawn_event_recorder(engine.events(), shutdown_token.clone());

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&engine),
    ));
    let health_server = HealthServer::new(health_port, health_state, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    engine.start()?;
    tracing::info!("Symbol sync running");

    await_shutdown(shutdown_token).await;

    if let Err(e) = engine.shutdown() {
        tracing::error!(error = %e, "Final cursor write failed");
    }
    tracing::info!(
        cursor = engine.cursor(),
        symbols = mirror.len(),
        "Symbol sync stopped"
    );
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &SyncConfig) {
    tracing::info!(
        user_id = config.credentials.user_id(),
        role = %config.oracle.role,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        ws_url = %config.oracle.ws_url,
        api_url = %config.oracle.api_url,
        cursor_path = %config.sync.cursor_path.display(),
        "Oracle endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
