//! Domain Layer - Core price, metrics and connection types.
//!
//! Nothing in this layer knows about sockets or HTTP. The registry is
//! generic over its sink type and every other type is plain data with
//! serialization support.

/// Simulated instrument prices and the random-walk feed.
pub mod pricing;

/// Delivery counters and the bounded timestamp log.
pub mod throughput;

/// The set of open client connections.
pub mod registry;

/// JSON messages exchanged with clients.
pub mod protocol;
