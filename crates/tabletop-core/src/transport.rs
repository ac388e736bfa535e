//! Transport abstraction.
//!
//! A transport delivers named events to channels: a player's private channel
//! or a session's shared channel. Delivery is best-effort and must not block
//! the caller.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// A named outbound event with its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Wire event name, e.g. `mapUpdate`.
    pub event: &'static str,
    /// Event payload.
    pub payload: serde_json::Value,
}

/// Failure to hand an envelope to the network layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection is currently registered for the channel.
    #[error("channel not connected: {0}")]
    NotConnected(String),

    /// The connection refused or dropped the message.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Outbound delivery primitives.
pub trait Transport: Send + Sync {
    /// Sends to one player's private channel.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the envelope could not be handed off.
    fn send_to_player(&self, player_id: Uuid, envelope: &Envelope) -> Result<(), TransportError>;

    /// Sends to every member of a session's shared channel.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the envelope could not be handed off.
    fn send_to_session(&self, session_id: Uuid, envelope: &Envelope)
    -> Result<(), TransportError>;
}
