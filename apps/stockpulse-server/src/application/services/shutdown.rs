//! Shutdown Coordinator
//!
//! Stops the scheduler and the listener by cancelling the shared token,
//! then closes every registered client. Close failures are logged and
//! counted; they never stop the remaining closes.

use tokio_util::sync::CancellationToken;

use super::state::SharedServerState;

/// Outcome of closing every client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sinks closed cleanly.
    pub closed: usize,
    /// Sinks whose close failed.
    pub failed: usize,
}

/// Coordinates graceful shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    state: SharedServerState,
    cancel: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator over `state` driving `cancel`.
    #[must_use]
    pub const fn new(state: SharedServerState, cancel: CancellationToken) -> Self {
        Self { state, cancel }
    }

    /// The token every long-running task observes.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel all tasks and close every client sink.
    pub fn shutdown(&self) -> ShutdownReport {
        self.cancel.cancel();

        let mut report = ShutdownReport::default();
        for entry in self.state.connections() {
            match entry.sink().close() {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    tracing::warn!(
                        client_id = %entry.client_id(),
                        connection_id = entry.id(),
                        error = %e,
                        "Failed to close client during shutdown"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            closed = report.closed,
            failed = report.failed,
            "Closed client connections"
        );
        report
    }
}
