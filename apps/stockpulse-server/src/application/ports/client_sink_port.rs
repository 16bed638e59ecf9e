//! Client Sink Port (Driven Port)
//!
//! The outbound channel of one connected client as seen by the registry,
//! the broadcast scheduler and the shutdown coordinator.

/// Outbound half of a client connection.
///
/// Implementations must not block: the broadcast pass calls `send` for
/// every client in turn while no other pass can run.
#[cfg_attr(test, mockall::automock)]
pub trait ClientSink: Send + Sync {
    /// Queue one text frame for delivery.
    fn send(&self, payload: &str) -> Result<(), SinkError>;

    /// Queue a close frame. Frames already queued are delivered first.
    fn close(&self) -> Result<(), SinkError>;

    /// Whether the connection can still accept frames.
    fn is_open(&self) -> bool;
}

/// Client sink errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The connection is no longer open.
    #[error("client connection is closed")]
    Closed,

    /// The transport rejected the frame.
    #[error("transport error: {0}")]
    Transport(String),
}
