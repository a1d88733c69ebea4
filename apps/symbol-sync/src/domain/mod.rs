//! Domain Layer - Core sync types.
//!
//! Pure data types for the mirrored symbol universe, its op log, the
//! connection lifecycle, and the auxiliary feeds. Nothing here performs I/O.

/// Connection lifecycle state machine.
pub mod connection;

/// Progress events published by the engine.
pub mod events;

/// News/filing items, rolling buffers, and field merging.
pub mod feed;

/// Symbol records, ops, and snapshot pages.
pub mod symbol;
