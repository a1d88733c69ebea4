//! Prometheus Metrics Module
//!
//! Exposes sync metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound socket frames by type, and dropped frames by reason
//! - **Connection**: reconnects and registration state
//! - **Catch-up**: ops applied, pages applied, cursor position
//! - **Hydration**: outcomes and duration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Most values
//! are derived from `SyncEvent`s by [`spawn_event_recorder`].

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::application::services::EventHub;
use crate::domain::connection::ConnectionState;
use crate::domain::events::SyncEvent;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the already-installed handle.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (for example when
/// another global recorder is already set).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "symbol_sync_frames_received_total",
        "Total frames received from the oracle socket"
    );
    describe_counter!(
        "symbol_sync_frames_dropped_total",
        "Total inbound frames dropped as malformed or unusable"
    );
    describe_counter!(
        "symbol_sync_reconnects_total",
        "Total oracle socket reconnection attempts"
    );
    describe_gauge!(
        "symbol_sync_registered",
        "1 while the oracle socket is registered, 0 otherwise"
    );
    describe_counter!(
        "symbol_sync_ops_applied_total",
        "Total symbol ops applied to the mirror"
    );
    describe_counter!(
        "symbol_sync_pages_applied_total",
        "Total op pages applied during catch-up"
    );
    describe_gauge!(
        "symbol_sync_cursor",
        "Highest op version applied to the mirror"
    );
    describe_counter!(
        "symbol_sync_hydrations_total",
        "Total snapshot hydrations by outcome"
    );
    describe_histogram!(
        "symbol_sync_hydration_seconds",
        "Wall time of successful snapshot hydrations"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an inbound frame.
pub fn record_frame_received(frame_type: &'static str) {
    counter!("symbol_sync_frames_received_total", "frame_type" => frame_type).increment(1);
}

/// Record a dropped inbound frame.
pub fn record_frame_dropped(reason: &'static str) {
    counter!("symbol_sync_frames_dropped_total", "reason" => reason).increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("symbol_sync_reconnects_total").increment(1);
}

/// Record applied ops.
pub fn record_ops_applied(upserts: usize, removes: usize) {
    counter!("symbol_sync_ops_applied_total", "kind" => "upsert").increment(upserts as u64);
    counter!("symbol_sync_ops_applied_total", "kind" => "remove").increment(removes as u64);
    counter!("symbol_sync_pages_applied_total").increment(1);
}

/// Update the cursor gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_cursor(cursor: u64) {
    gauge!("symbol_sync_cursor").set(cursor as f64);
}

/// Update the registration gauge.
pub fn set_connection_state(state: ConnectionState) {
    let registered = if state.is_registered() { 1.0 } else { 0.0 };
    gauge!("symbol_sync_registered").set(registered);
}

/// Record a hydration outcome.
pub fn record_hydration(outcome: &'static str, duration: Option<Duration>) {
    counter!("symbol_sync_hydrations_total", "outcome" => outcome).increment(1);
    if let Some(duration) = duration {
        histogram!("symbol_sync_hydration_seconds").record(duration.as_secs_f64());
    }
}

/// Translate one sync event into metric updates.
pub fn record_event(event: &SyncEvent) {
    match event {
        SyncEvent::ConnectionChanged { to, .. } => set_connection_state(*to),
        SyncEvent::PageApplied {
            upserts,
            removes,
            cursor,
        } => {
            record_ops_applied(*upserts, *removes);
            set_cursor(*cursor);
        }
        SyncEvent::HydrationCompleted {
            cursor, elapsed_ms, ..
        } => {
            record_hydration("success", Some(Duration::from_millis(*elapsed_ms)));
            set_cursor(*cursor);
        }
        SyncEvent::HydrationFailed { .. } => record_hydration("failure", None),
        SyncEvent::CatchUpCompleted { cursor } => set_cursor(*cursor),
        SyncEvent::Rejected
        | SyncEvent::HydrationStarted
        | SyncEvent::CatchUpStarted { .. }
        | SyncEvent::CatchUpFailed { .. }
        | SyncEvent::FeedHydrated { .. }
        | SyncEvent::SessionUpdated => {}
    }
}

/// Feed every event published on `hub` into the metrics recorder until
/// `cancel` fires.
pub fn spawn_event_recorder(
    hub: &EventHub,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut rx = hub.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => record_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Metrics recorder lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
