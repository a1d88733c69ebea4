//! Configuration Module
//!
//! Configuration loading and dependency injection for the sync engine.

mod container;
mod settings;

pub use container::{EngineError, SyncEngine};
pub use settings::{
    ConfigError, Credentials, HttpSettings, OracleSettings, ServerSettings, SyncConfig,
    SyncSettings,
};
