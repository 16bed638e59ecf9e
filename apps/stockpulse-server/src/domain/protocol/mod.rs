//! Client Wire Protocol
//!
//! JSON text frames exchanged over the WebSocket.
//!
//! # Server → client
//!
//! - `initial`: `{type, stocks, clientId, serverTime}` once after accept
//! - `update`: `{type, stocks, metrics, serverTime}` every broadcast tick
//! - `pong`: `{type, clientTime, serverTime}` in reply to a `ping`
//!
//! # Client → server
//!
//! - `ping`: `{type, clientTime}`
//!
//! Any other well-formed JSON is accepted and ignored. Only input that is
//! not JSON is malformed. A ping's `clientTime` is echoed whatever its JSON
//! type, `null` included; it is left out of the pong only when absent.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::pricing::PriceTick;
use super::throughput::MetricsSnapshot;

/// Current server time in Unix epoch milliseconds.
#[must_use]
pub fn server_time() -> i64 {
    Utc::now().timestamp_millis()
}

// =============================================================================
// Outbound
// =============================================================================

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Full snapshot sent once right after accept.
    #[serde(rename_all = "camelCase")]
    Initial {
        /// Current prices.
        stocks: Vec<PriceTick>,
        /// Identifier assigned to this client.
        client_id: String,
        /// Server time in epoch milliseconds.
        server_time: i64,
    },
    /// Per-tick broadcast.
    #[serde(rename_all = "camelCase")]
    Update {
        /// Prices after this tick's advance.
        stocks: Vec<PriceTick>,
        /// Metrics at the time of the tick.
        metrics: MetricsSnapshot,
        /// Server time in epoch milliseconds.
        server_time: i64,
    },
    /// Reply to a latency probe.
    #[serde(rename_all = "camelCase")]
    Pong {
        /// The probe's `clientTime`, echoed verbatim.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_time: Option<Value>,
        /// Server time in epoch milliseconds.
        server_time: i64,
    },
}

impl ServerMessage {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// The `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Initial { .. } => "initial",
            Self::Update { .. } => "update",
            Self::Pong { .. } => "pong",
        }
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// Messages the server understands from clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Latency probe.
    Ping {
        /// Client-supplied `clientTime`, as sent. `None` when absent.
        client_time: Option<Value>,
    },
    /// Well-formed message of a kind the server does not handle.
    Other {
        /// The `type` field, if the message had a string one.
        kind: Option<String>,
    },
}

impl ClientMessage {
    /// Interpret one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Decode)?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);

        match kind.as_deref() {
            Some("ping") => Ok(Self::Ping {
                client_time: value.get("clientTime").cloned(),
            }),
            _ => Ok(Self::Other { kind }),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Wire protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Inbound frame was not valid JSON.
    #[error("malformed client message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Outbound message could not be serialized.
    #[error("failed to encode server message: {0}")]
    Encode(#[source] serde_json::Error),
}
