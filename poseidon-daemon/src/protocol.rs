//! JSON text frames exchanged over the WebSocket.
//!
//! Outbound frames are `{"event": <name>, "data": <payload>}`. The only
//! inbound frame with meaning is the acknowledgment `{"event": "file:<id>"}`.

use poseidon_core::{CorrelationId, InboundMessage, OutboundMessage};
use poseidon_sync::Connection;

use crate::error::DaemonError;

/// What an inbound frame turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Completed the pending request with this id.
    Acknowledged(CorrelationId),
    /// Well-formed acknowledgment for no pending request.
    Unmatched(CorrelationId),
    /// Any other event name.
    Ignored(String),
    /// Not a JSON frame.
    Invalid,
}

pub fn encode_frame(message: &OutboundMessage) -> Result<String, DaemonError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_frame(frame: &str) -> Result<InboundMessage, DaemonError> {
    Ok(serde_json::from_str(frame)?)
}

/// Decode `frame` and apply it to `connection`.
pub fn handle_inbound(connection: &Connection, frame: &str) -> Inbound {
    let message = match decode_frame(frame) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(connection = connection.id(), error = %err, "invalid inbound frame");
            return Inbound::Invalid;
        }
    };

    match message.acknowledged_id() {
        Some(id) if connection.acknowledge(&id) => Inbound::Acknowledged(id),
        Some(id) => {
            tracing::debug!(connection = connection.id(), id = %id, "acknowledgment for unknown request");
            Inbound::Unmatched(id)
        }
        None => {
            tracing::debug!(connection = connection.id(), event = %message.event, "ignoring inbound event");
            Inbound::Ignored(message.event)
        }
    }
}
