//! Application Ports (Driven)
//!
//! Interfaces the sync engine depends on but does not implement:
//!
//! - `Mirror`: the local data store the engine keeps consistent
//! - `SymbolApi`: the symbols REST API
//! - `KeyValueStore`: durable storage for the cursor watermark

mod key_value_store_port;
mod mirror_port;
mod symbol_api_port;

pub use key_value_store_port::{KeyValueStore, StoreError};
pub use mirror_port::Mirror;
pub use symbol_api_port::{ApiError, SymbolApi};
