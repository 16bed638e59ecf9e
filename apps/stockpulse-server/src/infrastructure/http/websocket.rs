//! WebSocket Adapter
//!
//! Bridges an axum WebSocket to a [`ConnectionSession`].
//!
//! The socket is split. A writer task drains an unbounded channel into the
//! outbound half; [`WsSink`] is the sending end of that channel, so the
//! broadcast pass never awaits socket I/O. The reader loop runs on the
//! upgrade task until the peer closes, the socket errors, the writer dies
//! or shutdown begins.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::AppState;
use crate::application::ports::{ClientSink, SinkError};
use crate::application::services::ConnectionSession;

/// Largest inbound message accepted.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long a closing connection may take to flush queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Sink
// =============================================================================

/// Outbound half of one WebSocket, as a [`ClientSink`].
#[derive(Debug)]
pub struct WsSink {
    tx: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
}

impl WsSink {
    /// Wrap the writer task's channel.
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            tx,
            closed: AtomicBool::new(false),
        }
    }
}

impl ClientSink for WsSink {
    fn send(&self, payload: &str) -> Result<(), SinkError> {
        if !self.is_open() {
            return Err(SinkError::Closed);
        }
        self.tx
            .send(Message::Text(payload.to_owned().into()))
            .map_err(|_| SinkError::Closed)
    }

    fn close(&self) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.tx
            .send(Message::Close(None))
            .map_err(|_| SinkError::Closed)
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

// =============================================================================
// Handler
// =============================================================================

/// `GET /ws`.
pub(super) async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    if app.cancel.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
    }

    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| serve_socket(socket, app))
}

async fn serve_socket(socket: WebSocket, app: AppState) {
    let (mut outbound, mut inbound) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let mut writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if let Err(e) = outbound.send(message).await {
                tracing::debug!(error = %e, "WebSocket write failed");
                return;
            }
            if is_close {
                return;
            }
        }
        let _ = outbound.close().await;
    });

    let sink: Arc<dyn ClientSink> = Arc::new(WsSink::new(tx));
    let mut session = ConnectionSession::new(Arc::clone(&app.state), Arc::clone(&sink));

    if let Err(e) = session.open() {
        tracing::warn!(client_id = %session.client_id(), error = %e, "Failed to open session");
        drop(session);
        drop(sink);
        let _ = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await;
        return;
    }

    let mut writer_done = false;

    loop {
        tokio::select! {
            () = app.cancel.cancelled() => {
                if let Err(e) = session.shutdown() {
                    tracing::debug!(client_id = %session.client_id(), error = %e, "Close frame not queued");
                }
                break;
            }
            _ = &mut writer, if !writer_done => {
                writer_done = true;
                tracing::debug!(client_id = %session.client_id(), "Writer stopped");
                break;
            }
            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    session.handle_text(text.as_str());
                }
                Some(Ok(Message::Binary(bytes))) => {
                    session.handle_binary(&bytes);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(client_id = %session.client_id(), error = %e, "WebSocket read failed");
                    break;
                }
            },
        }
    }

    session.close();
    drop(session);
    drop(sink);

    if !writer_done && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        tracing::debug!("Writer did not drain in time");
    }
}
