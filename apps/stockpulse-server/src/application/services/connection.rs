//! Connection Session
//!
//! Lifecycle of one client connection, independent of the transport.
//!
//! ```text
//! Connecting ──open()──▶ Open ──close()──▶ Closed
//!      │                                    ▲
//!      └──────────── failed open ───────────┘
//! ```
//!
//! The `initial` frame is handed to the sink before the connection is
//! registered, so it is always the first frame a client sees even if a
//! broadcast tick races with the accept.

use std::sync::Arc;

use serde_json::Value;

use super::state::SharedServerState;
use crate::application::ports::{ClientSink, SinkError};
use crate::domain::protocol::{ClientMessage, ProtocolError, ServerMessage, server_time};
use crate::domain::registry::{ClientId, ConnectionId};
use crate::infrastructure::metrics::{self, InboundLabel};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Accepted, `initial` not yet sent.
    Connecting,
    /// Registered and receiving broadcasts.
    Open,
    /// Deregistered. Terminal.
    Closed,
}

/// How an inbound frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// A ping was answered.
    Pong,
    /// Well-formed, but not a kind the server acts on.
    Ignored,
    /// Dropped as malformed. The connection stays open.
    Malformed,
    /// The reply could not be delivered.
    ReplyFailed,
}

/// Per-connection state machine.
pub struct ConnectionSession {
    state: SharedServerState,
    sink: Arc<dyn ClientSink>,
    client_id: ClientId,
    connection_id: Option<ConnectionId>,
    phase: ConnectionPhase,
}

impl ConnectionSession {
    /// Create a session in the `Connecting` phase with a fresh client id.
    #[must_use]
    pub fn new(state: SharedServerState, sink: Arc<dyn ClientSink>) -> Self {
        Self {
            state,
            sink,
            client_id: ClientId::generate(),
            connection_id: None,
            phase: ConnectionPhase::Connecting,
        }
    }

    /// Client identifier.
    #[must_use]
    pub const fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Registry key, once open.
    #[must_use]
    pub const fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Send the `initial` snapshot and register for broadcasts.
    ///
    /// On failure the session moves straight to `Closed` without ever
    /// having been registered.
    pub fn open(&mut self) -> Result<ConnectionId, SessionError> {
        if self.phase != ConnectionPhase::Connecting {
            return Err(SessionError::InvalidPhase(self.phase));
        }

        let initial = ServerMessage::Initial {
            stocks: self.state.price_snapshot(),
            client_id: self.client_id.to_string(),
            server_time: server_time(),
        };

        let sent = initial
            .to_json()
            .map_err(SessionError::from)
            .and_then(|payload| self.sink.send(&payload).map_err(SessionError::from));
        if let Err(e) = sent {
            self.phase = ConnectionPhase::Closed;
            metrics::record_send_failures(initial.kind(), 1);
            return Err(e);
        }
        metrics::record_messages_sent(initial.kind(), 1);

        let entry = self
            .state
            .connect(self.client_id.clone(), Arc::clone(&self.sink));
        self.connection_id = Some(entry.id());
        self.phase = ConnectionPhase::Open;

        tracing::info!(
            client_id = %self.client_id,
            connection_id = entry.id(),
            connections = self.state.connection_count(),
            "Client connected"
        );

        Ok(entry.id())
    }

    /// Handle one inbound text frame.
    pub fn handle_text(&self, text: &str) -> InboundOutcome {
        if self.phase != ConnectionPhase::Open {
            return InboundOutcome::Ignored;
        }

        match ClientMessage::parse(text) {
            Ok(ClientMessage::Ping { client_time }) => self.reply_pong(client_time),
            Ok(ClientMessage::Other { kind }) => {
                tracing::debug!(
                    client_id = %self.client_id,
                    kind = kind.as_deref().unwrap_or("<none>"),
                    "Ignoring client message"
                );
                metrics::record_client_message(InboundLabel::Ignored);
                InboundOutcome::Ignored
            }
            Err(e) => {
                tracing::warn!(
                    client_id = %self.client_id,
                    error = %e,
                    "Dropping malformed client message"
                );
                metrics::record_client_message(InboundLabel::Malformed);
                InboundOutcome::Malformed
            }
        }
    }

    /// Handle one inbound binary frame as UTF-8 text.
    pub fn handle_binary(&self, bytes: &[u8]) -> InboundOutcome {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.handle_text(text),
            Err(e) => {
                tracing::warn!(
                    client_id = %self.client_id,
                    error = %e,
                    "Dropping non UTF-8 binary frame"
                );
                metrics::record_client_message(InboundLabel::Malformed);
                InboundOutcome::Malformed
            }
        }
    }

    fn reply_pong(&self, client_time: Option<Value>) -> InboundOutcome {
        metrics::record_client_message(InboundLabel::Ping);

        let pong = ServerMessage::Pong {
            client_time,
            server_time: server_time(),
        };
        let sent = pong
            .to_json()
            .map_err(SessionError::from)
            .and_then(|payload| self.sink.send(&payload).map_err(SessionError::from));

        match sent {
            Ok(()) => {
                metrics::record_messages_sent(pong.kind(), 1);
                InboundOutcome::Pong
            }
            Err(e) => {
                tracing::warn!(client_id = %self.client_id, error = %e, "Failed to send pong");
                metrics::record_send_failures(pong.kind(), 1);
                InboundOutcome::ReplyFailed
            }
        }
    }

    /// Deregister and move to `Closed`.
    ///
    /// Returns `false` if the session was already closed. Runs on drop.
    pub fn close(&mut self) -> bool {
        if self.phase == ConnectionPhase::Closed {
            return false;
        }
        self.phase = ConnectionPhase::Closed;

        if let Some(id) = self.connection_id.take() {
            // The broadcaster may already have dropped us after a failed send.
            let removed = self.state.disconnect(id);
            tracing::info!(
                client_id = %self.client_id,
                connection_id = id,
                removed,
                connections = self.state.connection_count(),
                "Client disconnected"
            );
        }
        true
    }

    /// Close the sink, then the session.
    pub fn shutdown(&mut self) -> Result<(), SinkError> {
        let result = self.sink.close();
        self.close();
        result
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("client_id", &self.client_id)
            .field("connection_id", &self.connection_id)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Operation not valid in the current phase.
    #[error("operation not allowed in phase {0:?}")]
    InvalidPhase(ConnectionPhase),

    /// Outbound message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Sink rejected the frame.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::application::ports::MockClientSink;
    use crate::application::services::ServerState;
    use crate::application::services::testing::RecordingSink;

    fn open_session() -> (SharedServerState, Arc<RecordingSink>, ConnectionSession) {
        let state = ServerState::default().shared();
        let sink = Arc::new(RecordingSink::new());
        let mut session =
            ConnectionSession::new(Arc::clone(&state), Arc::clone(&sink) as Arc<dyn ClientSink>);
        session.open().unwrap();
        (state, sink, session)
    }

    #[test]
    fn open_sends_initial_then_registers() {
        let (state, sink, session) = open_session();

        let frames = sink.json_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "initial");
        assert_eq!(frames[0]["clientId"], session.client_id().as_str());
        assert_eq!(frames[0]["stocks"].as_array().unwrap().len(), 8);

        assert_eq!(session.phase(), ConnectionPhase::Open);
        assert_eq!(state.connection_count(), 1);
        assert_eq!(state.metrics_snapshot().connections, 1);
    }

    #[test]
    fn open_twice_is_rejected() {
        let (_state, _sink, mut session) = open_session();
        let err = assert_err!(session.open());
        assert!(matches!(
            err,
            SessionError::InvalidPhase(ConnectionPhase::Open)
        ));
    }

    #[test]
    fn failed_initial_never_registers() {
        let state = ServerState::default().shared();
        let mut sink = MockClientSink::new();
        sink.expect_send().returning(|_| Err(SinkError::Closed));

        let mut session = ConnectionSession::new(Arc::clone(&state), Arc::new(sink));

        assert!(matches!(session.open(), Err(SessionError::Sink(SinkError::Closed))));
        assert_eq!(session.phase(), ConnectionPhase::Closed);
        assert_eq!(state.connection_count(), 0);
        assert_eq!(state.metrics_snapshot().connections, 0);
    }

    #[test]
    fn ping_gets_exactly_one_pong() {
        let (_state, sink, session) = open_session();
        let before = server_time();

        let outcome = session.handle_text(r#"{"type":"ping","clientTime":1000}"#);

        assert_eq!(outcome, InboundOutcome::Pong);
        let frames = sink.json_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1]["type"], "pong");
        assert_eq!(frames[1]["clientTime"], json!(1000));
        assert!(frames[1]["serverTime"].as_i64().unwrap() >= before);
    }

    #[test]
    fn malformed_input_keeps_session_open() {
        let (state, sink, session) = open_session();

        assert_eq!(session.handle_text("{not json"), InboundOutcome::Malformed);
        assert_eq!(session.handle_binary(&[0xff, 0xfe]), InboundOutcome::Malformed);

        assert_eq!(session.phase(), ConnectionPhase::Open);
        assert_eq!(state.connection_count(), 1);
        assert_eq!(sink.frames().len(), 1);
    }

    #[test]
    fn non_numeric_client_time_is_still_answered() {
        let (_state, sink, session) = open_session();

        assert_eq!(
            session.handle_text(r#"{"type":"ping","clientTime":"1000"}"#),
            InboundOutcome::Pong
        );
        assert_eq!(
            session.handle_text(r#"{"type":"ping","clientTime":null}"#),
            InboundOutcome::Pong
        );

        let frames = sink.json_frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1]["clientTime"], json!("1000"));
        assert!(frames[2].as_object().unwrap().contains_key("clientTime"));
        assert!(frames[2]["clientTime"].is_null());
    }

    #[test]
    fn binary_ping_is_answered() {
        let (_state, sink, session) = open_session();
        let outcome = session.handle_binary(br#"{"type":"ping","clientTime":7}"#);
        assert_eq!(outcome, InboundOutcome::Pong);
        assert_eq!(sink.json_frames()[1]["clientTime"], 7);
    }

    #[test]
    fn unknown_kinds_are_ignored() {
        let (_state, sink, session) = open_session();
        let outcome = session.handle_text(r#"{"type":"subscribe"}"#);
        assert_eq!(outcome, InboundOutcome::Ignored);
        assert_eq!(sink.frames().len(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let (state, _sink, mut session) = open_session();

        assert!(session.close());
        assert!(!session.close());
        assert_eq!(state.connection_count(), 0);
        assert_eq!(state.metrics_snapshot().connections, 0);
    }

    #[test]
    fn close_after_broadcaster_removal_counts_once() {
        let (state, _sink, mut session) = open_session();
        let id = session.connection_id().unwrap();

        assert!(state.disconnect(id));
        session.close();

        assert_eq!(state.metrics_snapshot().connections, 0);
    }

    #[test]
    fn drop_deregisters() {
        let (state, _sink, session) = open_session();
        drop(session);
        assert_eq!(state.connection_count(), 0);
        assert_eq!(state.metrics_snapshot().connections, 0);
    }

    #[test]
    fn shutdown_closes_sink() {
        let (state, sink, mut session) = open_session();
        assert_ok!(session.shutdown());
        assert_eq!(sink.closes(), 1);
        assert_eq!(session.phase(), ConnectionPhase::Closed);
        assert_eq!(state.connection_count(), 0);
    }
}
