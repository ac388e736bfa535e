//! Test transport: records every envelope handed to it.

use std::collections::HashSet;
use std::sync::Mutex;

use tabletop_core::transport::{Envelope, Transport, TransportError};
use uuid::Uuid;

/// Where an envelope was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A player's private channel.
    Player(Uuid),
    /// A session's shared channel.
    Session(Uuid),
}

/// A transport that records deliveries in order. Players registered with
/// [`RecordingTransport::fail_for_player`] reject every send.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(Delivery, Envelope)>>,
    failing_players: Mutex<HashSet<Uuid>>,
}

impl RecordingTransport {
    /// Creates a transport with no recorded deliveries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent send to `player_id` fail.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_for_player(&self, player_id: Uuid) {
        self.failing_players.lock().unwrap().insert(player_id);
    }

    /// Returns a snapshot of every successful delivery.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent(&self) -> Vec<(Delivery, Envelope)> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns envelopes delivered to one player's channel.
    pub fn sent_to_player(&self, player_id: Uuid) -> Vec<Envelope> {
        self.filtered(Delivery::Player(player_id))
    }

    /// Returns envelopes delivered to one session's channel.
    pub fn sent_to_session(&self, session_id: Uuid) -> Vec<Envelope> {
        self.filtered(Delivery::Session(session_id))
    }

    /// Returns deliveries of the named event.
    pub fn sent_named(&self, event: &str) -> Vec<(Delivery, Envelope)> {
        self.sent()
            .into_iter()
            .filter(|(_, envelope)| envelope.event == event)
            .collect()
    }

    /// Forgets every recorded delivery.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn filtered(&self, delivery: Delivery) -> Vec<Envelope> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| *to == delivery)
            .map(|(_, envelope)| envelope)
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send_to_player(&self, player_id: Uuid, envelope: &Envelope) -> Result<(), TransportError> {
        if self.failing_players.lock().unwrap().contains(&player_id) {
            return Err(TransportError::SendFailed(format!(
                "player {player_id} connection reset"
            )));
        }
        self.sent
            .lock()
            .unwrap()
            .push((Delivery::Player(player_id), envelope.clone()));
        Ok(())
    }

    fn send_to_session(
        &self,
        session_id: Uuid,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((Delivery::Session(session_id), envelope.clone()));
        Ok(())
    }
}
