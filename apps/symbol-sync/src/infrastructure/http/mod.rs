//! Symbols REST Adapter
//!
//! Implements the `SymbolApi` port over `reqwest`:
//!
//! - `GET /symbols/snapshot?limit&offset`
//! - `GET /symbols/batch?syms=CSV`
//! - `GET /symbols/cursor`
//! - `GET /symbols/ops?since&limit`
//!
//! Transport errors, 408, 429 and 5xx responses are retried with exponential
//! backoff; `Retry-After` overrides the backoff delay.

/// Response shapes.
pub mod api_types;

/// HTTP client with retry logic.
pub mod client;

/// Client configuration.
pub mod config;

pub use client::SymbolApiClient;
pub use config::{DEFAULT_ORACLE_API_URL, RetryConfig, SymbolApiConfig};
