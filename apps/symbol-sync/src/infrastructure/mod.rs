//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Oracle WebSocket adapter (connection, registration, frame routing).
pub mod oracle;

/// Symbols REST API client.
pub mod http;

/// JSON file key-value store.
pub mod storage;

/// In-memory reference mirror.
pub mod mirror;

/// Configuration and dependency injection.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
