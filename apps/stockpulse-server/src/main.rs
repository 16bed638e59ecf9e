//! StockPulse Server Binary
//!
//! Starts the price broadcast server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin stockpulse-server
//! ```
//!
//! # Environment Variables
//!
//! - `HOST`: Listen host (default: 0.0.0.0)
//! - `PORT`: Listen port (default: 3001)
//! - `BROADCAST_INTERVAL_MS`: Tick period (default: 1000)
//! - `METRICS_WINDOW_SECS`: Rate window (default: 5)
//! - `METRICS_LOG_CAPACITY`: Delivery timestamps retained (default: 1000)
//! - `SHUTDOWN_TIMEOUT_SECS`: Drain grace period (default: 10)
//! - `GROQ_API_KEY` / `XAI_API_KEY` / `OPENAI_API_KEY`: Analysis provider, first set wins
//! - `ANALYSIS_TIMEOUT_SECS`: Provider request timeout (default: 60)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: stockpulse-server)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use stockpulse_server::infrastructure::telemetry;
use stockpulse_server::{
    AppState, BroadcastScheduler, ChatCompletionAnalyzer, HttpServer, MetricsRecorder, PriceFeed,
    ServerConfig, ServerState, ShutdownCoordinator, StockAnalyzer, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting StockPulse server");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = ServerConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
    })?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let state = ServerState::new(
        PriceFeed::default(),
        MetricsRecorder::new(config.metrics.log_capacity, config.metrics.window),
    )
    .shared();

    let analyzer: Option<Arc<dyn StockAnalyzer>> =
        match ChatCompletionAnalyzer::from_settings(&config.analysis) {
            Ok(Some(analyzer)) => {
                tracing::info!(
                    provider = analyzer.provider(),
                    model = analyzer.model(),
                    "Stock analysis enabled"
                );
                Some(Arc::new(analyzer) as Arc<dyn StockAnalyzer>)
            }
            Ok(None) => {
                tracing::warn!("No analysis provider key set, stock analysis disabled");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build analysis client, stock analysis disabled");
                None
            }
        };

    let app = AppState::new(Arc::clone(&state), shutdown_token.clone()).with_analyzer(analyzer);

    let server = HttpServer::bind(config.server.socket_addr(), app)
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "Failed to start HTTP server");
        })?;

    // Spawn broadcast scheduler
    let scheduler = BroadcastScheduler::new(
        Arc::clone(&state),
        config.broadcast.interval,
        shutdown_token.clone(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    // Spawn HTTP server
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("StockPulse server ready");

    await_shutdown().await;

    let coordinator = ShutdownCoordinator::new(Arc::clone(&state), shutdown_token);
    coordinator.shutdown();

    tracing::info!(
        timeout_secs = config.server.shutdown_timeout.as_secs(),
        "Graceful shutdown started"
    );

    let drain = async {
        let _ = scheduler_handle.await;
        let _ = server_handle.await;
    };
    if tokio::time::timeout(config.server.shutdown_timeout, drain)
        .await
        .is_err()
    {
        tracing::warn!("Shutdown timed out, exiting with connections still open");
    }

    tracing::info!("StockPulse server stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &ServerConfig) {
    tracing::info!(
        addr = %config.server.socket_addr(),
        interval_ms = config.broadcast.interval.as_millis() as u64,
        metrics_window_secs = config.metrics.window.as_secs(),
        metrics_log_capacity = config.metrics.log_capacity,
        analysis_provider = config.analysis.provider.as_ref().map(|(p, _)| p.as_str()),
        "Configuration loaded"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
