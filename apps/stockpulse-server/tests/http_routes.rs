//! HTTP Route Integration Tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use stockpulse_server::{
    AnalysisError, AppState, ServerState, SharedServerState, StockAnalyzer, router,
};

/// Analyzer that echoes the companies it was asked about.
struct EchoAnalyzer;

#[async_trait]
impl StockAnalyzer for EchoAnalyzer {
    async fn analyze(&self, companies: &[String]) -> Result<Value, AnalysisError> {
        Ok(json!({ "companies": companies }))
    }

    fn provider(&self) -> &'static str {
        "echo"
    }
}

/// Analyzer whose provider always fails.
struct FailingAnalyzer;

#[async_trait]
impl StockAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _companies: &[String]) -> Result<Value, AnalysisError> {
        Err(AnalysisError::Upstream {
            status: 429,
            message: "rate limited".to_string(),
        })
    }

    fn provider(&self) -> &'static str {
        "failing"
    }
}

fn app_state() -> (AppState, SharedServerState) {
    let state = ServerState::default().shared();
    let app = AppState::new(Arc::clone(&state), CancellationToken::new());
    (app, state)
}

async fn get(app: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router(app)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn post_json(app: AppState, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = router(app)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

// =============================================================================
// Read-only routes
// =============================================================================

#[tokio::test]
async fn root_describes_service() {
    let (app, _) = app_state();
    let (status, body) = get(app, "/").await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "StockPulse API");
    assert_eq!(body["status"], "running");
    assert_eq!(body["endpoints"]["websocket"], "/ws");
    assert_eq!(body["endpoints"]["stocks"], "/stocks");
}

#[tokio::test]
async fn health_reports_healthy() {
    let (app, _) = app_state();
    let (status, body) = get(app, "/health").await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].as_i64().unwrap() > 0);
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn liveness_is_plain_ok() {
    let (app, _) = app_state();
    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn metrics_snapshot_is_zero_when_idle() {
    let (app, _) = app_state();
    let (status, body) = get(app, "/metrics").await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connections"], 0);
    assert_eq!(body["totalMessagesSent"], 0);
    assert_eq!(body["throughput"], 0);
    assert!(body["messagesPerSecond"].as_f64().is_some());
}

#[tokio::test]
async fn stocks_lists_every_instrument() {
    let (app, state) = app_state();
    let (status, body) = get(app, "/stocks").await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    let stocks = body["stocks"].as_array().unwrap();
    assert_eq!(stocks.len(), state.price_snapshot().len());
    assert_eq!(stocks[0]["symbol"], "AAPL");
    assert!(stocks[0]["price"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn prometheus_unavailable_without_recorder() {
    let (app, _) = app_state();
    let (status, _) = get(app, "/metrics/prometheus").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (app, _) = app_state();
    let response = router(app)
        .oneshot(
            Request::builder()
                .uri("/stocks")
                .header(header::ORIGIN, "http://example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

// =============================================================================
// Analysis route
// =============================================================================

#[tokio::test]
async fn analyze_without_provider_is_unavailable() {
    let (app, _) = app_state();
    let (status, body) =
        post_json(app, "/api/analyze-stocks", r#"{"companies":["Apple"]}"#).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("GROQ_API_KEY"));
}

#[tokio::test]
async fn analyze_rejects_missing_companies() {
    let (app, _) = app_state();
    let app = app.with_analyzer(Some(Arc::new(EchoAnalyzer)));

    for bad in [r#"{}"#, r#"{"companies":[]}"#, r#"{"companies":"Apple"}"#, "not json"] {
        let (status, body) = post_json(app.clone(), "/api/analyze-stocks", bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {bad}");
        assert_eq!(body["error"], "Please provide an array of company names");
    }
}

#[tokio::test]
async fn analyze_returns_provider_result() {
    let (app, _) = app_state();
    let app = app.with_analyzer(Some(Arc::new(EchoAnalyzer)));

    let (status, body) = post_json(
        app,
        "/api/analyze-stocks",
        r#"{"companies":["Apple","Tesla"]}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "companies": ["Apple", "Tesla"] }));
}

#[tokio::test]
async fn analyze_provider_failure_is_server_error() {
    let (app, _) = app_state();
    let app = app.with_analyzer(Some(Arc::new(FailingAnalyzer)));

    let (status, body) = post_json(app, "/api/analyze-stocks", r#"{"companies":["Apple"]}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to analyze stocks");
    assert!(body["message"].as_str().unwrap().contains("429"));
}
