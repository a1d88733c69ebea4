//! Oracle WebSocket Adapter
//!
//! Connection to the oracle's realtime socket.
//!
//! # Protocol
//!
//! 1. Connect to the oracle WebSocket endpoint
//! 2. Send `register` with the client manifest and bearer token
//! 3. Receive `register_ack`; `unauthorized` ends the connection for good
//! 4. Request a hydration and answer `ping` frames with `pong`
//! 5. Route doorbells, invalidations, feed deltas and session updates
//!
//! # Frame Types
//!
//! - `symbol_doorbell`: the op log advanced; catch up to the given cursor
//! - `symbol_invalidate`: removals, or a whole-universe invalidation
//! - `hydration_response`: replacement news/filing feeds
//! - `news_delta` / `filing_delta`: single feed items
//! - `session_update`: partial session state

/// JSON frame decoding.
pub mod codec;

/// Connection lifecycle and reconnect loop.
pub mod connection;

/// Frame routing into the sync services and feeds.
pub mod dispatcher;

/// Wire frame types.
pub mod messages;

/// Fixed-delay reconnect policy.
pub mod reconnect;

/// Manifest, auth and `register_ack` handling.
pub mod registration;

pub use codec::{CodecError, FrameCodec};
pub use connection::{ConnectionConfig, ConnectionError, ConnectionManager, DEFAULT_ORACLE_WS_URL};
pub use dispatcher::{DEFAULT_FEED_CAPACITY, Dispatcher, FrameRoute};
pub use messages::{InboundFrame, OutboundFrame};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use registration::{AuthContext, AuthError, Registration};
