//! Application Services
//!
//! Services that drive the domain types on behalf of the transport.
//!
//! - `ServerState`: owns the price feed, metrics and registry
//! - `BroadcastScheduler`: periodic advance and fan-out
//! - `ConnectionSession`: per-connection lifecycle and inbound handling
//! - `ShutdownCoordinator`: stops the scheduler and closes every client

mod broadcaster;
mod connection;
mod shutdown;
mod state;

pub use broadcaster::{BroadcastScheduler, TickOutcome};
pub use connection::{ConnectionPhase, ConnectionSession, InboundOutcome, SessionError};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use state::{ConnectionHandle, ServerState, SharedServerState};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use crate::application::ports::{ClientSink, SinkError};

    /// Sink that keeps every frame it was given.
    #[derive(Debug)]
    pub struct RecordingSink {
        frames: Mutex<Vec<String>>,
        open: AtomicBool,
        closes: AtomicUsize,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self {
                frames: Mutex::new(Vec::new()),
                open: AtomicBool::new(true),
                closes: AtomicUsize::new(0),
            }
        }

        pub fn frames(&self) -> Vec<String> {
            self.frames.lock().clone()
        }

        pub fn json_frames(&self) -> Vec<serde_json::Value> {
            self.frames()
                .iter()
                .map(|f| serde_json::from_str(f).unwrap())
                .collect()
        }

        pub fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        pub fn disconnect(&self) {
            self.open.store(false, Ordering::SeqCst);
        }
    }

    impl ClientSink for RecordingSink {
        fn send(&self, payload: &str) -> Result<(), SinkError> {
            if !self.is_open() {
                return Err(SinkError::Closed);
            }
            self.frames.lock().push(payload.to_string());
            Ok(())
        }

        fn close(&self) -> Result<(), SinkError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }
}
