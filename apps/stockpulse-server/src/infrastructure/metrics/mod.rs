//! Prometheus Metrics Module
//!
//! Operational metrics in Prometheus exposition format.
//!
//! # Metrics Categories
//!
//! - **Messages**: frames delivered to and failed for clients, by kind
//! - **Connections**: live client sockets
//! - **Broadcast**: ticks run or skipped, and fan-out duration
//! - **Inbound**: client frames by how they were handled
//! - **Analysis**: provider calls by outcome, and their latency
//!
//! These are separate from the JSON snapshot served at `/metrics`, which
//! is part of the client-facing contract. The exposition text is served at
//! `/metrics/prometheus`.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Message counters
    describe_counter!(
        "stockpulse_messages_sent_total",
        "Total frames delivered to WebSocket clients"
    );
    describe_counter!(
        "stockpulse_send_failures_total",
        "Total frames that could not be delivered"
    );

    // Connection gauge
    describe_gauge!(
        "stockpulse_client_connections",
        "Number of open WebSocket client connections"
    );

    // Broadcast
    describe_counter!(
        "stockpulse_broadcast_ticks_total",
        "Broadcast ticks by outcome"
    );
    describe_histogram!(
        "stockpulse_broadcast_duration_seconds",
        "Time to advance prices and fan out one tick"
    );

    // Inbound
    describe_counter!(
        "stockpulse_client_messages_total",
        "Client frames received, by how they were handled"
    );

    // Analysis
    describe_counter!(
        "stockpulse_analysis_requests_total",
        "Stock analysis requests by provider and outcome"
    );
    describe_histogram!(
        "stockpulse_analysis_duration_seconds",
        "Latency of stock analysis provider calls"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for broadcast tick results.
#[derive(Debug, Clone, Copy)]
pub enum TickLabel {
    /// Prices were advanced and fanned out.
    Broadcast,
    /// No clients were connected.
    Skipped,
}

impl TickLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::Skipped => "skipped",
        }
    }
}

/// Metric labels for inbound client frames.
#[derive(Debug, Clone, Copy)]
pub enum InboundLabel {
    /// A ping answered with a pong.
    Ping,
    /// Well-formed but not handled.
    Ignored,
    /// Not valid JSON, or invalid fields.
    Malformed,
}

impl InboundLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Ignored => "ignored",
            Self::Malformed => "malformed",
        }
    }
}

/// Record frames delivered to clients.
pub fn record_messages_sent(kind: &'static str, count: u64) {
    counter!(
        "stockpulse_messages_sent_total",
        "kind" => kind
    )
    .increment(count);
}

/// Record frames that failed to deliver.
pub fn record_send_failures(kind: &'static str, count: u64) {
    counter!(
        "stockpulse_send_failures_total",
        "kind" => kind
    )
    .increment(count);
}

/// Update the open client connection count.
pub fn set_client_connections(count: f64) {
    gauge!("stockpulse_client_connections").set(count);
}

/// Record one broadcast tick.
pub fn record_tick(label: TickLabel) {
    counter!(
        "stockpulse_broadcast_ticks_total",
        "outcome" => label.as_str()
    )
    .increment(1);
}

/// Record the duration of one broadcast fan-out.
pub fn record_broadcast_duration(duration: Duration) {
    histogram!("stockpulse_broadcast_duration_seconds").record(duration.as_secs_f64());
}

/// Record one inbound client frame.
pub fn record_client_message(label: InboundLabel) {
    counter!(
        "stockpulse_client_messages_total",
        "outcome" => label.as_str()
    )
    .increment(1);
}

/// Record one analysis request.
pub fn record_analysis(provider: &'static str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "error" };
    counter!(
        "stockpulse_analysis_requests_total",
        "provider" => provider,
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "stockpulse_analysis_duration_seconds",
        "provider" => provider
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_label_as_str() {
        assert_eq!(TickLabel::Broadcast.as_str(), "broadcast");
        assert_eq!(TickLabel::Skipped.as_str(), "skipped");
    }

    #[test]
    fn inbound_label_as_str() {
        assert_eq!(InboundLabel::Ping.as_str(), "ping");
        assert_eq!(InboundLabel::Ignored.as_str(), "ignored");
        assert_eq!(InboundLabel::Malformed.as_str(), "malformed");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_messages_sent("update", 3);
        record_tick(TickLabel::Skipped);
        record_analysis("groq", true, Duration::from_millis(5));
    }
}
