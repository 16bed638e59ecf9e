//! HTTP and WebSocket Server
//!
//! One axum listener serving the client stream and the JSON routes.
//!
//! # Endpoints
//!
//! - `GET /` - Service descriptor
//! - `GET /ws` - WebSocket price stream
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /metrics` - Throughput metrics snapshot (JSON)
//! - `GET /metrics/prometheus` - Prometheus metrics in text format
//! - `GET /stocks` - Current prices
//! - `POST /api/analyze-stocks` - Company comparison via the analysis provider
//!
//! CORS is permissive: any origin, method and header.

mod handlers;
mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::application::ports::StockAnalyzer;
use crate::application::services::SharedServerState;

pub use handlers::{Endpoints, HealthResponse, ServiceDescriptor, StocksResponse};
pub use websocket::{MAX_MESSAGE_SIZE, WsSink};

// =============================================================================
// App State
// =============================================================================

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    /// Price feed, metrics and connections.
    pub state: SharedServerState,
    /// Analysis provider, if one is configured.
    pub analyzer: Option<Arc<dyn StockAnalyzer>>,
    /// Shutdown signal; new upgrades are refused once it fires.
    pub cancel: CancellationToken,
    /// Version reported by `/`.
    pub version: &'static str,
}

impl AppState {
    /// Create route state.
    #[must_use]
    pub fn new(state: SharedServerState, cancel: CancellationToken) -> Self {
        Self {
            state,
            analyzer: None,
            cancel,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Attach an analysis provider.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Option<Arc<dyn StockAnalyzer>>) -> Self {
        self.analyzer = analyzer;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("analyzer", &self.analyzer.as_ref().map(|a| a.provider()))
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Build the application router.
pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/ws", get(websocket::ws_handler))
        .route("/health", get(handlers::health_handler))
        .route("/healthz", get(handlers::liveness_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/metrics/prometheus", get(handlers::prometheus_handler))
        .route("/stocks", get(handlers::stocks_handler))
        .route("/api/analyze-stocks", post(handlers::analyze_handler))
        .layer(CorsLayer::permissive())
        .with_state(app)
}

// =============================================================================
// Server
// =============================================================================

/// Bound HTTP server.
pub struct HttpServer {
    listener: TcpListener,
    app: AppState,
}

impl HttpServer {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError::BindFailed` if the address is unavailable.
    pub async fn bind(addr: SocketAddr, app: AppState) -> Result<Self, HttpServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(addr, e.to_string()))?;
        Ok(Self { listener, app })
    }

    /// Address actually bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, HttpServerError> {
        self.listener
            .local_addr()
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))
    }

    /// Serve until the cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError::ServerFailed` if the server encounters a
    /// fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let cancel = self.app.cancel.clone();
        let addr = self.local_addr()?;

        tracing::info!(addr = %addr, "HTTP server listening");

        axum::serve(self.listener, router(self.app))
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
