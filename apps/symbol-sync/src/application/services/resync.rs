//! Resync Coordinator
//!
//! Full resynchronization: hydrate from the snapshot, then catch up to the
//! server's current cursor. Requests made while a resync is running fold
//! into a single follow-up run.

use std::sync::Arc;

use parking_lot::Mutex;

use super::delta_puller::DeltaPuller;
use super::events::EventHub;
use super::hydrator::{HydrationError, Hydrator};
use crate::application::ports::SymbolApi;
use crate::domain::events::SyncEvent;

#[derive(Debug, Default)]
struct ResyncState {
    running: bool,
    rerun: bool,
}

/// Serializes and coalesces full resyncs.
pub struct ResyncCoordinator {
    hydrator: Arc<Hydrator>,
    puller: Arc<DeltaPuller>,
    api: Arc<dyn SymbolApi>,
    events: EventHub,
    state: Mutex<ResyncState>,
}

impl ResyncCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        hydrator: Arc<Hydrator>,
        puller: Arc<DeltaPuller>,
        api: Arc<dyn SymbolApi>,
        events: EventHub,
    ) -> Self {
        Self {
            hydrator,
            puller,
            api,
            events,
            state: Mutex::new(ResyncState::default()),
        }
    }

    /// Whether a background resync is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Hydrate now and catch up to the server cursor.
    ///
    /// Returns the number of snapshot items applied. A failed catch-up after
    /// a successful hydration is logged; the next doorbell retries it.
    ///
    /// # Errors
    ///
    /// Returns the hydration error; the mirror is unchanged in that case.
    pub async fn resync(&self) -> Result<usize, HydrationError> {
        self.events.publish(SyncEvent::HydrationStarted);
        let started = std::time::Instant::now();

        let probe = self.hydrator.config().probe_size;
        let items = match self.hydrator.hydrate_all(probe).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(error = %e, "Hydration failed");
                self.events.publish(SyncEvent::HydrationFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let cursor = self.hydrator.current_cursor();
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(items, cursor, elapsed_ms, "Hydration completed");
        self.events.publish(SyncEvent::HydrationCompleted {
            items,
            cursor,
            elapsed_ms,
        });

        match self.api.fetch_cursor().await {
            Ok(server) if server > cursor => {
                if let Err(e) = self.puller.pull_to_at_least(server).await {
                    tracing::warn!(error = %e, server, "Post-hydration catch-up failed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Could not read server cursor"),
        }

        Ok(items)
    }

    /// Run a resync in the background.
    ///
    /// Returns `false` if one is already running; it will run once more
    /// after the current one finishes.
    pub fn request_hydration(self: &Arc<Self>) -> bool {
        {
            let mut state = self.state.lock();
            if state.running {
                state.rerun = true;
                tracing::debug!("Hydration already running; queued a rerun");
                return false;
            }
            state.running = true;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let _ = this.resync().await;
                let mut state = this.state.lock();
                if state.rerun {
                    state.rerun = false;
                    continue;
                }
                state.running = false;
                break;
            }
        });
        true
    }
}
