//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for client sockets and the analysis provider.
pub mod ports;

/// Application services for broadcasting, sessions and shutdown.
pub mod services;
