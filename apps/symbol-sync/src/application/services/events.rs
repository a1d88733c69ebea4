//! Event Hub
//!
//! Fan-out of `SyncEvent`s over a tokio broadcast channel. Publishing never
//! blocks; slow receivers see `RecvError::Lagged` and skip ahead.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::events::SyncEvent;

/// Default channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Broadcast hub for sync progress events.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventHub {
    /// Create a hub with the given channel capacity (raised to at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Create a hub with the default capacity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }

    /// Publish an event to every current receiver.
    ///
    /// Returns the number of receivers reached, or `None` when nobody is
    /// listening.
    pub fn publish(&self, event: SyncEvent) -> Option<usize> {
        self.tx.send(event).ok()
    }

    /// Get a new receiver. It sees only events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Shared event hub reference.
pub type SharedEventHub = Arc<EventHub>;
