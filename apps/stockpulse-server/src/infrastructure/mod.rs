//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Chat completion adapter for stock analysis.
pub mod analysis;

/// Configuration loading.
pub mod config;

/// HTTP routes and the WebSocket endpoint.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
