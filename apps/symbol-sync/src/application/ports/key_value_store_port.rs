//! Key-Value Store Port (Driven Port)
//!
//! Durable storage for small scalar state.

use serde_json::{Map, Value};

/// Storage error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("storage I/O error at {path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stored or pending data could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Background write task died before completing.
    #[error("storage task failed: {0}")]
    Task(String),
}

/// Synchronous key-value storage.
///
/// Calls may block on disk I/O; async callers should go through
/// `tokio::task::spawn_blocking`.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<Value>;

    /// Durably write every entry in one operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the write could not be made durable. Nothing is
    /// guaranteed to have been written in that case.
    fn set_many(&self, entries: &Map<String, Value>) -> Result<(), StoreError>;
}
