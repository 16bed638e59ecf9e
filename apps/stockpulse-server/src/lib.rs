#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! StockPulse Server - Simulated Real-Time Price Broadcaster
//!
//! Streams a simulated stock price feed to many WebSocket clients on a
//! fixed cadence, answers per-connection latency probes, reports
//! throughput metrics and forwards company comparisons to a language
//! model provider.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no transport dependencies
//!   - `pricing`: Instruments and the random-walk price feed
//!   - `throughput`: Connection count and message rate recorder
//!   - `registry`: The set of open connections
//!   - `protocol`: JSON messages exchanged with clients
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Client sink and analysis provider interfaces
//!   - `services`: Shared state, broadcast scheduler, sessions, shutdown
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `http`: axum routes and the WebSocket adapter
//!   - `analysis`: OpenAI-compatible chat completion client
//!   - `config`: Configuration from the environment
//!   - `metrics` / `telemetry`: Prometheus and tracing
//!
//! # Data Flow
//!
//! ```text
//!                 ┌──────────────┐  tick   ┌───────────┐
//!                 │  Broadcast   │────────►│ PriceFeed │
//!                 │  Scheduler   │◄────────│           │
//!                 └──────┬───────┘         └───────────┘
//!                        │ update (serialised once)
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!      WsSink 1      WsSink 2      WsSink N ──► writer task ──► client
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::pricing::{Instrument, PRICE_FLOOR, PriceFeed, PriceTick, default_instruments};
pub use domain::protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use domain::registry::{ClientId, ConnectionId};
pub use domain::throughput::{MetricsRecorder, MetricsSnapshot};

// Application services
pub use application::ports::{AnalysisError, ClientSink, SinkError, StockAnalyzer};
pub use application::services::{
    BroadcastScheduler, ConnectionPhase, ConnectionSession, InboundOutcome, ServerState,
    SessionError, SharedServerState, ShutdownCoordinator, ShutdownReport, TickOutcome,
};

// Infrastructure config
pub use infrastructure::config::{
    AnalysisProvider, AnalysisSettings, ApiKey, BroadcastSettings, ConfigError, MetricsSettings,
    ServerConfig, ServerSettings,
};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, router};

// Analysis adapter
pub use infrastructure::analysis::ChatCompletionAnalyzer;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
