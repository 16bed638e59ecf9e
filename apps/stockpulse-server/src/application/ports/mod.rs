//! Port Interfaces
//!
//! Contracts between the core services and the adapters that carry
//! traffic in and out of the process.
//!
//! ## Driven Ports (Outbound)
//!
//! - `ClientSink`: the outbound half of one client connection
//! - `StockAnalyzer`: a language-model backed analysis provider

mod analysis_port;
mod client_sink_port;

pub use analysis_port::{AnalysisError, StockAnalyzer};
pub use client_sink_port::{ClientSink, SinkError};

#[cfg(test)]
pub use analysis_port::MockStockAnalyzer;
#[cfg(test)]
pub use client_sink_port::MockClientSink;
