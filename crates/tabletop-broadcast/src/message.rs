//! Outbound message taxonomy and broadcast targets.
//!
//! | Event                | Payload                                              |
//! |----------------------|------------------------------------------------------|
//! | `sessionStateUpdate` | `{type: "full_state", sessionId, state, version, timestamp}` |
//! | `mapUpdate`          | `{sessionId, update, timestamp}`                     |
//! | `encounterUpdate`    | `{sessionId, update, timestamp}`                     |
//! | `inventoryUpdate`    | `{sessionId, characterId, change, timestamp}`        |
//! | `actionResult`       | `{sessionId, result, playerId, timestamp}`           |
//! | `runtimeStateUpdate` | `{sessionId, changes, timestamp}`                    |
//!
//! Timestamps are milliseconds since the Unix epoch.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tabletop_core::transport::Envelope;
use tabletop_session::domain::deltas::{ActionMessage, EncounterUpdate, InventoryChange, MapUpdate};
use tabletop_session::domain::state::CompleteSessionState;
use uuid::Uuid;

/// Who a broadcast is meant for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BroadcastTarget {
    /// Everyone in the session, through the session's shared channel.
    All,
    /// Exactly these players, each through their private channel. An empty
    /// set reaches nobody.
    Players(BTreeSet<Uuid>),
}

impl BroadcastTarget {
    /// Targets a single player.
    #[must_use]
    pub fn player(player_id: Uuid) -> Self {
        Self::Players(BTreeSet::from([player_id]))
    }

    /// Targets the given players.
    pub fn players(player_ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self::Players(player_ids.into_iter().collect())
    }
}

/// The kind of an outbound message; part of the batching group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BroadcastKind {
    /// A full (filtered) snapshot for one player.
    FullState,
    /// A map delta.
    MapUpdate,
    /// An encounter delta.
    EncounterUpdate,
    /// An inventory change.
    InventoryChange,
    /// The resolution of a player action.
    ActionResult,
    /// Changed runtime flags.
    RuntimeState,
}

impl BroadcastKind {
    /// Returns the wire event name.
    #[must_use]
    pub fn event_name(self) -> &'static str {
        match self {
            Self::FullState => "sessionStateUpdate",
            Self::MapUpdate => "mapUpdate",
            Self::EncounterUpdate => "encounterUpdate",
            Self::InventoryChange => "inventoryUpdate",
            Self::ActionResult => "actionResult",
            Self::RuntimeState => "runtimeStateUpdate",
        }
    }

    /// Returns `true` if several messages of this kind in one batch may be
    /// combined into one.
    #[must_use]
    pub fn is_mergeable(self) -> bool {
        !matches!(self, Self::InventoryChange | Self::ActionResult)
    }
}

/// One outbound message, before it is addressed and serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// A snapshot already filtered for its recipient.
    FullState(Box<CompleteSessionState>),
    /// A map delta.
    MapUpdate(MapUpdate),
    /// An encounter delta.
    EncounterUpdate(EncounterUpdate),
    /// An inventory change of one character.
    InventoryChange {
        /// The character whose inventory changed.
        character_id: Uuid,
        /// The change.
        change: InventoryChange,
    },
    /// The resolution of a player action.
    ActionResult(ActionMessage),
    /// Changed runtime flags; `null` clears a flag.
    RuntimeState(Map<String, Value>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FullStatePayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    session_id: Uuid,
    state: &'a CompleteSessionState,
    version: &'a str,
    timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeltaPayload<'a, T: Serialize> {
    session_id: Uuid,
    update: &'a T,
    timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InventoryPayload<'a> {
    session_id: Uuid,
    character_id: Uuid,
    change: &'a InventoryChange,
    timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionResultPayload<'a> {
    session_id: Uuid,
    result: &'a ActionMessage,
    player_id: Uuid,
    timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimePayload<'a> {
    session_id: Uuid,
    changes: &'a Map<String, Value>,
    timestamp: i64,
}

fn to_payload<T: Serialize>(payload: &T) -> Value {
    // Serialization of derived Serialize types with string keys to Value is
    // infallible.
    serde_json::to_value(payload).expect("outbound payload serialization is infallible")
}

impl OutboundMessage {
    /// Returns the message's kind.
    #[must_use]
    pub fn kind(&self) -> BroadcastKind {
        match self {
            Self::FullState(_) => BroadcastKind::FullState,
            Self::MapUpdate(_) => BroadcastKind::MapUpdate,
            Self::EncounterUpdate(_) => BroadcastKind::EncounterUpdate,
            Self::InventoryChange { .. } => BroadcastKind::InventoryChange,
            Self::ActionResult(_) => BroadcastKind::ActionResult,
            Self::RuntimeState(_) => BroadcastKind::RuntimeState,
        }
    }

    /// Serializes the message into its wire envelope.
    #[must_use]
    pub fn envelope(&self, session_id: Uuid, timestamp: i64) -> Envelope {
        let payload = match self {
            Self::FullState(state) => to_payload(&FullStatePayload {
                kind: "full_state",
                session_id,
                state,
                version: &state.state_version,
                timestamp,
            }),
            Self::MapUpdate(update) => to_payload(&DeltaPayload {
                session_id,
                update,
                timestamp,
            }),
            Self::EncounterUpdate(update) => to_payload(&DeltaPayload {
                session_id,
                update,
                timestamp,
            }),
            Self::InventoryChange {
                character_id,
                change,
            } => to_payload(&InventoryPayload {
                session_id,
                character_id: *character_id,
                change,
                timestamp,
            }),
            Self::ActionResult(result) => to_payload(&ActionResultPayload {
                session_id,
                result,
                player_id: result.player_id,
                timestamp,
            }),
            Self::RuntimeState(changes) => to_payload(&RuntimePayload {
                session_id,
                changes,
                timestamp,
            }),
        };
        Envelope {
            event: self.kind().event_name(),
            payload,
        }
    }
}

/// A broadcast waiting in the batch queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedBroadcast {
    /// What to send.
    pub message: OutboundMessage,
    /// Who to send it to.
    pub target: BroadcastTarget,
    /// When the broadcast was made. Merged broadcasts carry the latest.
    pub timestamp: DateTime<Utc>,
}
