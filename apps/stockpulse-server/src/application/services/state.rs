//! Server State
//!
//! The single shared object behind every connection and the scheduler:
//! the price feed, the metrics recorder and the connection registry.
//!
//! # Locking
//!
//! The feed and the recorder each sit behind their own mutex. Connect and
//! disconnect hold the recorder lock while they touch the registry, so the
//! connection count and registry membership always change together. The
//! lock order is recorder then registry; nothing takes them the other way
//! round.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::application::ports::ClientSink;
use crate::domain::pricing::{PriceFeed, PriceTick};
use crate::domain::registry::{ClientId, ConnectionEntry, ConnectionId, ConnectionRegistry};
use crate::domain::throughput::{MetricsRecorder, MetricsSnapshot};
use crate::infrastructure::metrics;

/// A registered connection as seen by the services.
pub type ConnectionHandle = Arc<ConnectionEntry<dyn ClientSink>>;

/// Server state shared across tasks.
pub type SharedServerState = Arc<ServerState>;

/// Price feed, metrics and registry for one server instance.
pub struct ServerState {
    feed: Mutex<PriceFeed>,
    recorder: Mutex<MetricsRecorder>,
    registry: ConnectionRegistry<dyn ClientSink>,
    started_at: Instant,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("instruments", &self.feed.lock().len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(PriceFeed::default(), MetricsRecorder::default())
    }
}

impl ServerState {
    /// Create state from a feed and a recorder.
    #[must_use]
    pub fn new(feed: PriceFeed, recorder: MetricsRecorder) -> Self {
        Self {
            feed: Mutex::new(feed),
            recorder: Mutex::new(recorder),
            registry: ConnectionRegistry::new(),
            started_at: Instant::now(),
        }
    }

    /// Wrap in an `Arc` for sharing.
    #[must_use]
    pub fn shared(self) -> SharedServerState {
        Arc::new(self)
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Register a sink and count the connection.
    pub fn connect(&self, client_id: ClientId, sink: Arc<dyn ClientSink>) -> ConnectionHandle {
        let entry: ConnectionHandle = Arc::new(ConnectionEntry::new(
            self.registry.next_id(),
            client_id,
            sink,
        ));

        let mut recorder = self.recorder.lock();
        if self.registry.register(Arc::clone(&entry)) {
            recorder.add_connection();
            metrics::set_client_connections(recorder.connections() as f64);
        }
        entry
    }

    /// Deregister a connection. Returns `false` if it was already gone.
    ///
    /// Safe to call from both the broadcast pass and the connection's own
    /// task; only the first call decrements the count.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let mut recorder = self.recorder.lock();
        if self.registry.deregister(id).is_none() {
            return false;
        }
        recorder.remove_connection();
        metrics::set_client_connections(recorder.connections() as f64);
        true
    }

    /// Point-in-time copy of the registry.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionHandle> {
        self.registry.snapshot()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.registry.contains(id)
    }

    // =========================================================================
    // Prices
    // =========================================================================

    /// Current prices without advancing.
    #[must_use]
    pub fn price_snapshot(&self) -> Vec<PriceTick> {
        self.feed.lock().snapshot()
    }

    /// Advance every instrument one step.
    pub(crate) fn advance_prices(&self) -> Vec<PriceTick> {
        self.feed.lock().advance()
    }

    // =========================================================================
    // Metrics
    // =========================================================================

    /// Current metrics snapshot.
    #[must_use]
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.recorder.lock().snapshot()
    }

    /// Count one delivered frame.
    pub fn record_delivery(&self) {
        self.recorder.lock().record_message();
    }

    /// Zero the delivery counters. The connection count is kept.
    pub fn reset_metrics(&self) {
        self.recorder.lock().reset();
    }

    /// Time since this state was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::testing::RecordingSink;

    fn sink() -> Arc<dyn ClientSink> {
        Arc::new(RecordingSink::new())
    }

    #[test]
    fn connect_counts_once() {
        let state = ServerState::default();
        let a = state.connect(ClientId::from("a"), sink());
        let _b = state.connect(ClientId::from("b"), sink());

        assert_eq!(state.connection_count(), 2);
        assert_eq!(state.metrics_snapshot().connections, 2);
        assert!(state.is_connected(a.id()));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let state = ServerState::default();
        let a = state.connect(ClientId::from("a"), sink());

        assert!(state.disconnect(a.id()));
        assert!(!state.disconnect(a.id()));
        assert_eq!(state.metrics_snapshot().connections, 0);
        assert_eq!(state.connection_count(), 0);
    }

    #[test]
    fn reset_keeps_connection_count() {
        let state = ServerState::default();
        state.connect(ClientId::from("a"), sink());
        state.record_delivery();
        state.record_delivery();

        state.reset_metrics();

        let snapshot = state.metrics_snapshot();
        assert_eq!(snapshot.connections, 1);
        assert_eq!(snapshot.total_messages_sent, 0);
    }

    #[test]
    fn price_snapshot_does_not_advance() {
        let state = ServerState::default();
        let first = state.price_snapshot();
        let second = state.price_snapshot();
        let prices = |ticks: &[PriceTick]| ticks.iter().map(|t| t.price).collect::<Vec<_>>();
        assert_eq!(prices(&first), prices(&second));
        assert_eq!(first.len(), 8);
    }
}
