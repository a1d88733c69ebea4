//! Application Services
//!
//! Services that orchestrate the ports into the sync engine.
//!
//! - `CursorStore`: persisted monotonic op-log watermark
//! - `Hydrator`: full snapshot load
//! - `DeltaPuller`: incremental catch-up with request coalescing
//! - `ResyncCoordinator`: hydrate-then-catch-up, coalesced in the background
//! - `EventHub`: progress event fan-out

use std::sync::Arc;

/// Persisted cursor watermark with coalesced writes.
pub mod cursor_store;

/// Incremental op-log catch-up.
pub mod delta_puller;

/// Progress event broadcast.
pub mod events;

/// Full snapshot hydration.
pub mod hydrator;

/// Hydrate-then-catch-up coordination.
pub mod resync;

#[cfg(test)]
pub(crate) mod test_support;

pub use cursor_store::{CursorStore, WriteCoalescer};
pub use delta_puller::{DeltaPuller, PullError};
pub use events::EventHub;
pub use hydrator::{HydrationConfig, HydrationError, Hydrator, pick_page_size};
pub use resync::ResyncCoordinator;

/// Lock held while mirror contents are being replaced or patched.
///
/// Hydration holds it for the whole snapshot so a pull pass can never apply
/// ops that the (older) snapshot would then overwrite.
pub type ApplyGate = Arc<tokio::sync::Mutex<()>>;

/// Create a fresh apply gate.
#[must_use]
pub fn new_apply_gate() -> ApplyGate {
    Arc::new(tokio::sync::Mutex::new(()))
}
