//! Simulated Price Feed
//!
//! Owns the instrument price table and advances it with a bounded random
//! walk once per broadcast tick.
//!
//! # Model
//!
//! For every instrument on each advance:
//!
//! ```text
//! change        = price × volatility × uniform(-1, 1)
//! new_price     = max(price + change, PRICE_FLOOR)
//! change_pct    = (new_price - price) / price × 100
//! ```
//!
//! Ticks are rounded to two decimals for display; the table itself keeps
//! full precision so rounding error never compounds across ticks.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Lowest price an instrument can reach.
pub const PRICE_FLOOR: f64 = 0.01;

// =============================================================================
// Instrument
// =============================================================================

/// A tradable instrument in the simulated table.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    symbol: String,
    price: f64,
    volatility: f64,
    last_change: f64,
    last_change_percent: f64,
}

impl Instrument {
    /// Create an instrument.
    ///
    /// The price is clamped to [`PRICE_FLOOR`] and a negative volatility is
    /// treated as zero.
    #[must_use]
    pub fn new(symbol: impl Into<String>, price: f64, volatility: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price: price.max(PRICE_FLOOR),
            volatility: volatility.max(0.0),
            last_change: 0.0,
            last_change_percent: 0.0,
        }
    }

    /// Ticker symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Current price at full precision.
    #[must_use]
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Volatility coefficient.
    #[must_use]
    pub const fn volatility(&self) -> f64 {
        self.volatility
    }

    /// Apply one random-walk step. `unit` must be in `[-1, 1]`.
    fn step(&mut self, unit: f64) {
        let old = self.price;
        let change = old * self.volatility * unit;
        let new = (old + change).max(PRICE_FLOOR);

        self.last_change = change;
        self.last_change_percent = (new - old) / old * 100.0;
        self.price = new;
    }

    fn to_tick(&self, timestamp: i64) -> PriceTick {
        PriceTick {
            symbol: self.symbol.clone(),
            price: round2(self.price),
            volatility: self.volatility,
            change: round2(self.last_change),
            change_percent: round2(self.last_change_percent),
            timestamp,
        }
    }
}

/// The instrument table the server starts with.
#[must_use]
pub fn default_instruments() -> Vec<Instrument> {
    vec![
        Instrument::new("AAPL", 175.50, 0.02),
        Instrument::new("GOOGL", 140.25, 0.025),
        Instrument::new("MSFT", 380.75, 0.018),
        Instrument::new("AMZN", 155.30, 0.022),
        Instrument::new("TSLA", 242.80, 0.035),
        Instrument::new("META", 485.20, 0.028),
        Instrument::new("NVDA", 495.50, 0.03),
        Instrument::new("NFLX", 475.60, 0.026),
    ]
}

// =============================================================================
// Price Tick
// =============================================================================

/// One instrument's state as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTick {
    /// Ticker symbol.
    pub symbol: String,
    /// Price rounded to two decimals.
    pub price: f64,
    /// Volatility coefficient of the instrument.
    pub volatility: f64,
    /// Absolute change applied by the last advance.
    pub change: f64,
    /// Percent change relative to the pre-update price.
    pub change_percent: f64,
    /// Generation time in Unix epoch milliseconds.
    pub timestamp: i64,
}

// =============================================================================
// Price Feed
// =============================================================================

/// Mutable price table advanced by the broadcast scheduler.
///
/// `advance` takes `&mut self`; callers share the feed behind a mutex and
/// only the scheduler ever advances it.
#[derive(Debug)]
pub struct PriceFeed {
    instruments: Vec<Instrument>,
    rng: StdRng,
}

impl Default for PriceFeed {
    fn default() -> Self {
        Self::new(default_instruments())
    }
}

impl PriceFeed {
    /// Create a feed seeded from the operating system.
    #[must_use]
    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self::with_rng(instruments, StdRng::from_os_rng())
    }

    /// Create a feed with an explicit random source.
    #[must_use]
    pub const fn with_rng(instruments: Vec<Instrument>, rng: StdRng) -> Self {
        Self { instruments, rng }
    }

    /// Advance every instrument one step and return the new ticks.
    pub fn advance(&mut self) -> Vec<PriceTick> {
        let timestamp = now_millis();

        for instrument in &mut self.instruments {
            let unit = (self.rng.random::<f64>() - 0.5) * 2.0;
            instrument.step(unit);
        }

        self.instruments
            .iter()
            .map(|i| i.to_tick(timestamp))
            .collect()
    }

    /// Current state without mutating it, stamped with the call time.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PriceTick> {
        let timestamp = now_millis();
        self.instruments
            .iter()
            .map(|i| i.to_tick(timestamp))
            .collect()
    }

    /// Instruments at full precision.
    #[must_use]
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Number of instruments in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// Tests
// =============================================================================
