//! Broadcast Scheduler
//!
//! Advances the price feed on a fixed cadence and fans the result out to
//! every registered connection.
//!
//! A pass is synchronous: sinks only enqueue, so nothing inside `tick`
//! awaits and two passes can never overlap. When no client is connected the
//! tick is skipped entirely and prices stay where they are.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::state::SharedServerState;
use crate::application::ports::SinkError;
use crate::domain::protocol::{ServerMessage, server_time};
use crate::infrastructure::metrics::{self, TickLabel};

/// Result of one broadcast tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No connections; nothing advanced or sent.
    Skipped,
    /// Prices advanced and an update was offered to every connection.
    Broadcast {
        /// Successful sends.
        delivered: usize,
        /// Connections dropped because their sink failed or was closed.
        failed: usize,
    },
}

/// Periodic price advance and fan-out.
pub struct BroadcastScheduler {
    state: SharedServerState,
    period: Duration,
    cancel: CancellationToken,
}

impl BroadcastScheduler {
    /// Create a scheduler.
    #[must_use]
    pub const fn new(state: SharedServerState, period: Duration, cancel: CancellationToken) -> Self {
        Self {
            state,
            period,
            cancel,
        }
    }

    /// Tick period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Run until the cancellation token fires.
    ///
    /// The first tick happens one full period after start.
    pub async fn run(self) {
        let start = tokio::time::Instant::now() + self.period;
        let mut interval = tokio::time::interval_at(start, self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            period_ms = self.period.as_millis() as u64,
            "Broadcast scheduler started"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Broadcast scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        tracing::info!("Broadcast scheduler stopped");
    }

    /// Run one pass.
    pub fn tick(&self) -> TickOutcome {
        let connections = self.state.connections();
        if connections.is_empty() {
            metrics::record_tick(TickLabel::Skipped);
            return TickOutcome::Skipped;
        }

        let started = Instant::now();
        let stocks = self.state.advance_prices();
        let update = ServerMessage::Update {
            stocks,
            metrics: self.state.metrics_snapshot(),
            server_time: server_time(),
        };
        let kind = update.kind();

        let payload = match update.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode update");
                return TickOutcome::Broadcast {
                    delivered: 0,
                    failed: 0,
                };
            }
        };

        let mut delivered = 0;
        let mut failed = 0;

        for entry in &connections {
            let sink = entry.sink();
            let result = if sink.is_open() {
                sink.send(&payload)
            } else {
                Err(SinkError::Closed)
            };

            match result {
                Ok(()) => {
                    self.state.record_delivery();
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        client_id = %entry.client_id(),
                        connection_id = entry.id(),
                        error = %e,
                        "Dropping client after failed send"
                    );
                    self.state.disconnect(entry.id());
                    failed += 1;
                }
            }
        }

        metrics::record_tick(TickLabel::Broadcast);
        metrics::record_messages_sent(kind, delivered as u64);
        if failed > 0 {
            metrics::record_send_failures(kind, failed as u64);
        }
        metrics::record_broadcast_duration(started.elapsed());

        tracing::trace!(delivered, failed, "Broadcast tick complete");

        TickOutcome::Broadcast { delivered, failed }
    }
}

impl std::fmt::Debug for BroadcastScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastScheduler")
            .field("period", &self.period)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::application::ports::{ClientSink, MockClientSink};
    use crate::application::services::ServerState;
    use crate::application::services::testing::RecordingSink;
    use crate::domain::pricing::{PriceFeed, default_instruments};
    use crate::domain::registry::ClientId;
    use crate::domain::throughput::MetricsRecorder;

    fn state() -> SharedServerState {
        let feed = PriceFeed::with_rng(default_instruments(), StdRng::seed_from_u64(42));
        ServerState::new(feed, MetricsRecorder::default()).shared()
    }

    fn scheduler(state: &SharedServerState) -> BroadcastScheduler {
        BroadcastScheduler::new(
            Arc::clone(state),
            Duration::from_millis(1000),
            CancellationToken::new(),
        )
    }

    fn prices(state: &SharedServerState) -> Vec<f64> {
        state.price_snapshot().iter().map(|t| t.price).collect()
    }

    #[test]
    fn empty_registry_skips() {
        let state = state();
        let before = prices(&state);

        let outcome = scheduler(&state).tick();

        assert_eq!(outcome, TickOutcome::Skipped);
        assert_eq!(prices(&state), before);
        assert_eq!(state.metrics_snapshot().total_messages_sent, 0);
    }

    #[test]
    fn one_failing_sink_among_many() {
        let state = state();
        let healthy: Vec<Arc<RecordingSink>> =
            (0..3).map(|_| Arc::new(RecordingSink::new())).collect();
        for (i, sink) in healthy.iter().enumerate() {
            let client_id = ClientId::from(format!("ok{i}").as_str());
            state.connect(client_id, Arc::clone(sink) as Arc<dyn ClientSink>);
        }

        let mut broken = MockClientSink::new();
        broken.expect_is_open().return_const(true);
        broken
            .expect_send()
            .times(1)
            .returning(|_| Err(SinkError::Transport("reset by peer".into())));
        let broken = state.connect(ClientId::from("bad"), Arc::new(broken));

        let outcome = scheduler(&state).tick();

        assert_eq!(
            outcome,
            TickOutcome::Broadcast {
                delivered: 3,
                failed: 1
            }
        );
        assert_eq!(state.connection_count(), 3);
        assert!(!state.is_connected(broken.id()));

        let metrics = state.metrics_snapshot();
        assert_eq!(metrics.total_messages_sent, 3);
        assert_eq!(metrics.connections, 3);

        for sink in &healthy {
            let frames = sink.json_frames();
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0]["type"], "update");
            assert_eq!(frames[0]["stocks"].as_array().unwrap().len(), 8);
        }
    }

    #[test]
    fn closed_sink_is_dropped_without_send() {
        let state = state();
        let mut closed = MockClientSink::new();
        closed.expect_is_open().return_const(false);
        closed.expect_send().never();
        state.connect(ClientId::from("gone"), Arc::new(closed));

        let outcome = scheduler(&state).tick();

        assert_eq!(
            outcome,
            TickOutcome::Broadcast {
                delivered: 0,
                failed: 1
            }
        );
        assert_eq!(state.connection_count(), 0);
        assert_eq!(state.metrics_snapshot().connections, 0);
    }

    #[test]
    fn sink_closed_after_connect_is_dropped_on_next_tick() {
        let state = state();
        let live = Arc::new(RecordingSink::new());
        let gone = Arc::new(RecordingSink::new());
        state.connect(ClientId::from("live"), Arc::clone(&live) as Arc<dyn ClientSink>);
        let gone_entry =
            state.connect(ClientId::from("gone"), Arc::clone(&gone) as Arc<dyn ClientSink>);

        gone.disconnect();
        let outcome = scheduler(&state).tick();

        assert_eq!(
            outcome,
            TickOutcome::Broadcast {
                delivered: 1,
                failed: 1
            }
        );
        assert!(gone.frames().is_empty());
        assert_eq!(live.frames().len(), 1);
        assert!(!state.is_connected(gone_entry.id()));
        assert_eq!(state.metrics_snapshot().connections, 1);
        assert_eq!(state.metrics_snapshot().total_messages_sent, 1);
    }

    #[test]
    fn update_carries_pre_send_metrics() {
        let state = state();
        let sink = Arc::new(RecordingSink::new());
        state.connect(ClientId::from("a"), Arc::clone(&sink) as Arc<dyn ClientSink>);
        let scheduler = scheduler(&state);

        scheduler.tick();
        scheduler.tick();

        let frames = sink.json_frames();
        assert_eq!(frames[0]["metrics"]["totalMessagesSent"], 0);
        assert_eq!(frames[1]["metrics"]["totalMessagesSent"], 1);
        assert_eq!(frames[1]["metrics"]["connections"], 1);
    }

    #[test]
    fn tick_advances_prices() {
        let state = state();
        state.connect(ClientId::from("a"), Arc::new(RecordingSink::new()));
        let before = prices(&state);

        scheduler(&state).tick();

        assert_ne!(prices(&state), before);
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_on_cadence_until_cancelled() {
        let state = state();
        let sink = Arc::new(RecordingSink::new());
        state.connect(ClientId::from("a"), Arc::clone(&sink) as Arc<dyn ClientSink>);

        let cancel = CancellationToken::new();
        let scheduler =
            BroadcastScheduler::new(Arc::clone(&state), Duration::from_millis(1000), cancel.clone());
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(sink.frames().len(), 3);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(sink.frames().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_scheduler_leaves_prices_alone() {
        let state = state();
        let before = prices(&state);
        let cancel = CancellationToken::new();
        let scheduler =
            BroadcastScheduler::new(Arc::clone(&state), Duration::from_millis(100), cancel.clone());
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(1050)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(prices(&state), before);
        assert_eq!(state.metrics_snapshot().total_messages_sent, 0);
    }
}
