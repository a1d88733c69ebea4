//! Delta Puller
//!
//! Cursor-bounded incremental catch-up over the server's op log.
//!
//! # Coalescing
//!
//! Doorbells arrive in bursts. `pull_to_at_least` folds every request into a
//! single queued target and lets at most one loop run: a caller that finds a
//! loop already running only raises the target and returns. The running loop
//! keeps draining until the cursor reaches the highest queued target.
//!
//! ```text
//! doorbell(5) --> [running: 5] --pass--> cursor 5 --+--> queued 9? --pass--> cursor 9 --> idle
//! doorbell(9) --> queued = 9, return --------------/
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use super::ApplyGate;
use super::cursor_store::CursorStore;
use super::events::EventHub;
use crate::application::ports::{ApiError, Mirror, SymbolApi};
use crate::domain::events::SyncEvent;
use crate::domain::symbol::PagePartition;

/// Default number of ops requested per page.
pub const DEFAULT_OPS_PAGE_SIZE: usize = 1000;

/// Catch-up error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PullError {
    /// A page of ops could not be fetched.
    #[error("ops fetch since {since} failed: {source}")]
    Fetch {
        /// Cursor the page was requested from.
        since: u64,
        /// Underlying API error.
        #[source]
        source: ApiError,
    },
}

#[derive(Debug, Default)]
struct PullState {
    running: bool,
    queued: u64,
}

/// Clears the running flag and queue if the owning loop exits without
/// releasing them (error or cancellation).
struct RunningGuard<'a> {
    state: &'a Mutex<PullState>,
    armed: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock();
            state.running = false;
            state.queued = 0;
        }
    }
}

/// Incremental catch-up engine.
pub struct DeltaPuller {
    api: Arc<dyn SymbolApi>,
    mirror: Arc<dyn Mirror>,
    cursor: Arc<CursorStore>,
    events: EventHub,
    page_size: usize,
    gate: ApplyGate,
    state: Mutex<PullState>,
}

impl DeltaPuller {
    /// Create a puller.
    #[must_use]
    pub fn new(
        api: Arc<dyn SymbolApi>,
        mirror: Arc<dyn Mirror>,
        cursor: Arc<CursorStore>,
        events: EventHub,
        page_size: usize,
        gate: ApplyGate,
    ) -> Self {
        Self {
            api,
            mirror,
            cursor,
            events,
            page_size: page_size.max(1),
            gate,
            state: Mutex::new(PullState::default()),
        }
    }

    /// Whether a coalesced loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Highest target queued for the running loop (0 when idle).
    #[must_use]
    pub fn queued_target(&self) -> u64 {
        self.state.lock().queued
    }

    /// Pull and apply pages until the cursor reaches `target`, the server
    /// runs out of ops, or a page makes no progress.
    ///
    /// Returns the cursor afterwards.
    ///
    /// # Errors
    ///
    /// Returns `PullError::Fetch` on the first failed page. Pages applied
    /// before the failure stay applied.
    pub async fn pull_until(&self, target: u64) -> Result<u64, PullError> {
        let _gate = self.gate.lock().await;
        self.pass(target).await
    }

    /// Coalescing entry point: make sure the cursor eventually reaches at
    /// least `target`.
    ///
    /// If a loop is already running this raises its target and returns the
    /// merged target immediately. Otherwise this call owns the loop and
    /// returns the final cursor.
    ///
    /// # Errors
    ///
    /// Returns the first `PullError` of the owned loop; the queue is cleared.
    pub async fn pull_to_at_least(&self, target: u64) -> Result<u64, PullError> {
        {
            let mut state = self.state.lock();
            state.queued = state.queued.max(target);
            if state.running {
                tracing::debug!(target, queued = state.queued, "Catch-up already running");
                return Ok(state.queued);
            }
            state.running = true;
        }

        let mut guard = RunningGuard {
            state: &self.state,
            armed: true,
        };

        let from = self.cursor.get();
        tracing::info!(from, target, "Catch-up started");
        self.events
            .publish(SyncEvent::CatchUpStarted { from, target });

        let result = self.drain(&mut guard).await;

        match &result {
            Ok(cursor) => {
                tracing::info!(cursor, "Catch-up completed");
                self.events
                    .publish(SyncEvent::CatchUpCompleted { cursor: *cursor });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Catch-up failed");
                self.events.publish(SyncEvent::CatchUpFailed {
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn drain(&self, guard: &mut RunningGuard<'_>) -> Result<u64, PullError> {
        loop {
            let goal = self.state.lock().queued;
            let before = self.cursor.get();

            if before < goal {
                let _gate = self.gate.lock().await;
                self.pass(goal).await?;
            }

            let after = self.cursor.get();
            let mut state = self.state.lock();
            let stalled = after == before && state.queued <= goal;
            if after >= state.queued || stalled {
                if stalled && after < goal {
                    tracing::debug!(cursor = after, goal, "Op log exhausted before target");
                }
                state.running = false;
                state.queued = 0;
                guard.armed = false;
                return Ok(after);
            }
        }
    }

    async fn pass(&self, target: u64) -> Result<u64, PullError> {
        let mut cursor = self.cursor.get();

        while cursor < target {
            let page = self
                .api
                .fetch_ops_since(cursor, self.page_size)
                .await
                .map_err(|source| PullError::Fetch {
                    since: cursor,
                    source,
                })?;

            if page.is_empty() {
                break;
            }

            let partition = PagePartition::from_ops(&page.ops, cursor);
            let upserts = partition.upserts.len();
            let removes = partition.removes.len();
            if partition.skipped > 0 {
                tracing::warn!(skipped = partition.skipped, "Skipped unusable ops");
            }

            if upserts > 0 {
                self.mirror.upsert(partition.upserts);
            }
            if removes > 0 {
                self.mirror.remove(&partition.removes);
            }
            self.cursor.set(partition.max_ver);

            let advanced = self.cursor.get();
            tracing::debug!(upserts, removes, cursor = advanced, "Ops page applied");
            self.events.publish(SyncEvent::PageApplied {
                upserts,
                removes,
                cursor: advanced,
            });

            if advanced <= cursor || !page.has_more {
                cursor = advanced;
                break;
            }
            cursor = advanced;
        }

        Ok(cursor)
    }
}
