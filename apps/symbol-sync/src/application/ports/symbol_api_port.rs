//! Symbol API Port (Driven Port)
//!
//! The server's symbols REST API: paged snapshot, batch lookup, current
//! cursor, and the op log.

use async_trait::async_trait;

use crate::domain::symbol::{OpsPage, SnapshotPage, SymbolRecord};

/// Symbol API error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Request never produced a response (DNS, connect, timeout).
    #[error("symbol API transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// Server answered with a non-success status.
    #[error("symbol API returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// Response body was not the expected JSON.
    #[error("symbol API decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// Every retry attempt failed with a retryable error.
    #[error("symbol API retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Last error seen.
        last: String,
    },

    /// Request could not be built.
    #[error("invalid symbol API request: {message}")]
    InvalidRequest {
        /// Error details.
        message: String,
    },
}

/// Port for the symbols REST API.
#[async_trait]
pub trait SymbolApi: Send + Sync {
    /// `GET /symbols/snapshot?limit&offset`.
    async fn fetch_snapshot(&self, limit: usize, offset: usize) -> Result<SnapshotPage, ApiError>;

    /// `GET /symbols/batch?syms=CSV`. Blank tickers are dropped before the
    /// request; an empty list returns an empty result without a request.
    async fn fetch_batch(&self, symbols: &[String]) -> Result<Vec<SymbolRecord>, ApiError>;

    /// `GET /symbols/cursor`.
    async fn fetch_cursor(&self) -> Result<u64, ApiError>;

    /// `GET /symbols/ops?since&limit`.
    async fn fetch_ops_since(&self, since: u64, limit: usize) -> Result<OpsPage, ApiError>;
}
