//! Throughput Metrics Recorder
//!
//! Tracks the live connection count, the cumulative number of delivered
//! messages and a bounded log of delivery instants used to derive a
//! trailing messages-per-second rate.
//!
//! The log is a ring: once it holds `capacity` entries every new record
//! evicts the oldest one. A full log is the steady state, not an error.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Default number of delivery instants retained.
pub const DEFAULT_LOG_CAPACITY: usize = 1_000;

/// Default trailing window for the rate.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(5);

/// Point-in-time metrics as sent to clients and served over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Active connection count.
    pub connections: i64,
    /// Messages delivered since start or last reset.
    pub total_messages_sent: u64,
    /// Trailing-window rate rounded to two decimals.
    pub messages_per_second: f64,
    /// Trailing-window rate floored to an integer.
    pub throughput: u64,
    /// Whole seconds since start or last reset.
    pub uptime: u64,
}

/// Connection and delivery counters with a bounded timestamp log.
#[derive(Debug)]
pub struct MetricsRecorder {
    connections: i64,
    messages_sent: u64,
    started_at: Instant,
    log: VecDeque<Instant>,
    capacity: usize,
    window: Duration,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY, DEFAULT_RATE_WINDOW)
    }
}

impl MetricsRecorder {
    /// Create a recorder. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            connections: 0,
            messages_sent: 0,
            started_at: Instant::now(),
            log: VecDeque::with_capacity(capacity),
            capacity,
            window,
        }
    }

    /// Count a newly opened connection.
    pub fn add_connection(&mut self) {
        self.connections += 1;
    }

    /// Count a closed connection.
    ///
    /// The counter is not clamped. A removal without a matching addition is
    /// a caller bug and is surfaced as a negative count plus a warning.
    pub fn remove_connection(&mut self) {
        self.connections -= 1;
        if self.connections < 0 {
            tracing::warn!(
                connections = self.connections,
                "Connection counter went negative"
            );
        }
    }

    /// Current connection count.
    #[must_use]
    pub const fn connections(&self) -> i64 {
        self.connections
    }

    /// Messages delivered since start or last reset.
    #[must_use]
    pub const fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    /// Record one delivered message now.
    pub fn record_message(&mut self) {
        self.record_message_at(Instant::now());
    }

    /// Record one delivered message at `at`.
    pub fn record_message_at(&mut self, at: Instant) {
        self.messages_sent += 1;
        if self.log.len() == self.capacity {
            self.log.pop_front();
        }
        self.log.push_back(at);
    }

    /// Rate over the trailing `window` ending now.
    #[must_use]
    pub fn messages_per_second(&self, window: Duration) -> f64 {
        self.messages_per_second_at(window, Instant::now())
    }

    /// Rate over the trailing `window` ending at `now`.
    #[must_use]
    pub fn messages_per_second_at(&self, window: Duration, now: Instant) -> f64 {
        if window.is_zero() || self.log.is_empty() {
            return 0.0;
        }

        // An instant earlier than the process clock origin cannot be
        // represented; every entry is then inside the window.
        let recent = match now.checked_sub(window) {
            Some(cutoff) => self.log.iter().filter(|&&ts| ts >= cutoff).count(),
            None => self.log.len(),
        };

        recent as f64 / window.as_secs_f64()
    }

    /// Assemble a snapshot using the configured window.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let rate = self.messages_per_second(self.window);
        MetricsSnapshot {
            connections: self.connections,
            total_messages_sent: self.messages_sent,
            messages_per_second: (rate * 100.0).round() / 100.0,
            throughput: rate.floor() as u64,
            uptime: self.started_at.elapsed().as_secs(),
        }
    }

    /// Zero the delivery counters and restart the uptime clock.
    ///
    /// The connection count is kept: it mirrors live sockets, not activity.
    pub fn reset(&mut self) {
        self.messages_sent = 0;
        self.started_at = Instant::now();
        self.log.clear();
    }

    /// Number of instants currently in the log.
    #[must_use]
    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// Fixed log capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured default rate window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Oldest instant still in the log.
    #[must_use]
    pub fn oldest(&self) -> Option<Instant> {
        self.log.front().copied()
    }
}
