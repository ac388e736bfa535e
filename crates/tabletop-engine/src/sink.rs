//! Delivery of player actions to the GM over the session transport.

use std::sync::Arc;

use serde::Serialize;
use tabletop_authority::authority::GmActionSink;
use tabletop_core::clock::Clock;
use tabletop_core::transport::{Envelope, Transport, TransportError};
use tabletop_session::domain::state::PendingAction;
use uuid::Uuid;

/// Wire event carrying an action that awaits the GM's resolution.
pub const GM_ACTION_REQUEST_EVENT: &str = "gmActionRequest";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GmActionRequest<'a> {
    session_id: Uuid,
    action: &'a PendingAction,
    timestamp: i64,
}

/// Sends actions to the GM's private channel as `gmActionRequest` events.
pub struct TransportGmSink {
    session_id: Uuid,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl TransportGmSink {
    /// Creates the sink of `session_id`.
    #[must_use]
    pub fn new(session_id: Uuid, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            session_id,
            transport,
            clock,
        }
    }
}

impl GmActionSink for TransportGmSink {
    fn deliver(&self, gm_id: Uuid, action: &PendingAction) -> Result<(), TransportError> {
        let payload = serde_json::to_value(GmActionRequest {
            session_id: self.session_id,
            action,
            timestamp: self.clock.now_millis(),
        })
        .map_err(|e| TransportError::SendFailed(format!("payload serialization failed: {e}")))?;
        self.transport.send_to_player(
            gm_id,
            &Envelope {
                event: GM_ACTION_REQUEST_EVENT,
                payload,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tabletop_test_support::{FixedClock, RecordingTransport};

    use super::*;

    #[test]
    fn test_action_is_sent_to_gm_channel() {
        // Arrange
        let transport = Arc::new(RecordingTransport::new());
        let clock = FixedClock::standard();
        let session_id = Uuid::new_v4();
        let gm_id = Uuid::new_v4();
        let sink = TransportGmSink::new(
            session_id,
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(clock),
        );
        let action = PendingAction {
            action_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            action_type: "persuade".to_owned(),
            payload: json!({ "target": "innkeeper" }),
            submitted_at: clock.0,
        };

        // Act
        sink.deliver(gm_id, &action).unwrap();

        // Assert
        let sent = transport.sent_to_player(gm_id);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, GM_ACTION_REQUEST_EVENT);
        assert_eq!(sent[0].payload["sessionId"], json!(session_id));
        assert_eq!(sent[0].payload["action"]["actionId"], json!(action.action_id));
        assert_eq!(sent[0].payload["timestamp"], json!(clock.0.timestamp_millis()));
    }

    #[test]
    fn test_unreachable_gm_surfaces_transport_error() {
        let transport = Arc::new(RecordingTransport::new());
        let gm_id = Uuid::new_v4();
        transport.fail_for_player(gm_id);
        let sink = TransportGmSink::new(
            Uuid::new_v4(),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(FixedClock::standard()),
        );
        let action = PendingAction {
            action_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            action_type: "search".to_owned(),
            payload: json!(null),
            submitted_at: FixedClock::standard().0,
        };

        let result = sink.deliver(gm_id, &action);

        assert!(result.is_err());
    }
}
