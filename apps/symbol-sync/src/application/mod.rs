//! Application Layer - Sync services and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the sync engine talks to the server, storage, and the
//! local mirror.

/// Port interfaces for external systems (symbol API, mirror, storage).
pub mod ports;

/// Sync services (cursor, hydration, catch-up, events).
pub mod services;
