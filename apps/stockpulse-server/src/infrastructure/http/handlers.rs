//! HTTP Handlers
//!
//! JSON routes served next to the WebSocket endpoint.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};

use super::AppState;
use crate::domain::pricing::PriceTick;
use crate::domain::protocol::server_time;
use crate::domain::throughput::MetricsSnapshot;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Service descriptor served at `/`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescriptor {
    /// Service name.
    pub name: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Always "running".
    pub status: &'static str,
    /// Route map.
    pub endpoints: Endpoints,
}

/// Routes advertised by the descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct Endpoints {
    /// WebSocket stream.
    pub websocket: &'static str,
    /// Health check.
    pub health: &'static str,
    /// Metrics snapshot.
    pub metrics: &'static str,
    /// Current prices.
    pub stocks: &'static str,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests.
    pub status: &'static str,
    /// Server time in epoch milliseconds.
    pub timestamp: i64,
    /// Fractional seconds since start.
    pub uptime: f64,
}

/// Price snapshot response.
#[derive(Debug, Clone, Serialize)]
pub struct StocksResponse {
    /// Current prices.
    pub stocks: Vec<PriceTick>,
    /// Server time in epoch milliseconds.
    pub timestamp: i64,
}

// =============================================================================
// Handlers
// =============================================================================

pub(super) async fn root_handler(State(app): State<AppState>) -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor {
        name: "StockPulse API",
        version: app.version,
        status: "running",
        endpoints: Endpoints {
            websocket: "/ws",
            health: "/health",
            metrics: "/metrics",
            stocks: "/stocks",
        },
    })
}

pub(super) async fn health_handler(State(app): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: server_time(),
        uptime: app.state.uptime().as_secs_f64(),
    })
}

pub(super) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn metrics_handler(State(app): State<AppState>) -> Json<MetricsSnapshot> {
    Json(app.state.metrics_snapshot())
}

pub(super) async fn prometheus_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

pub(super) async fn stocks_handler(State(app): State<AppState>) -> Json<StocksResponse> {
    Json(StocksResponse {
        stocks: app.state.price_snapshot(),
        timestamp: server_time(),
    })
}

pub(super) async fn analyze_handler(
    State(app): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Some(analyzer) = app.analyzer.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "AI analysis service not configured. Please set GROQ_API_KEY, XAI_API_KEY, or OPENAI_API_KEY environment variable."
            })),
        )
            .into_response();
    };

    let Some(companies) = body.ok().and_then(|Json(body)| parse_companies(&body)) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Please provide an array of company names" })),
        )
            .into_response();
    };

    match analyzer.analyze(&companies).await {
        Ok(analysis) => Json(analysis).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Failed to analyze stocks",
                "message": e.to_string(),
            })),
        )
            .into_response(),
    }
}

/// Non-empty list of company names from `{"companies": [...]}`.
fn parse_companies(body: &Value) -> Option<Vec<String>> {
    let companies = body
        .get("companies")?
        .as_array()?
        .iter()
        .map(|c| c.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()?;

    (!companies.is_empty()).then_some(companies)
}
