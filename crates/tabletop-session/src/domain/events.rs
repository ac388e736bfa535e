//! Domain events for the session context.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabletop_core::event::{DomainEvent, EventMetadata};
use uuid::Uuid;

use super::deltas::{ActionMessage, EncounterUpdate, InventoryChange, MapUpdate, ResolvedReference};
use super::state::{EncounterState, MapState, PendingAction};

/// Emitted when a session is opened for a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStarted {
    /// The session identifier.
    pub session_id: Uuid,
    /// The campaign the session belongs to.
    pub campaign_id: Uuid,
    /// The Game Master running the session.
    pub gm_id: Uuid,
}

/// Emitted when a player joins (or rejoins) the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerJoined {
    /// The session identifier.
    pub session_id: Uuid,
    /// The joining player.
    pub player_id: Uuid,
    /// Characters the player controls.
    pub controlled_characters: Vec<Uuid>,
    /// Campaign ownership of every controlled character.
    pub references: Vec<ResolvedReference>,
}

/// Emitted when the GM changes what a player may see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPermissionsChanged {
    /// The session identifier.
    pub session_id: Uuid,
    /// The affected player.
    pub player_id: Uuid,
    /// Whether the player may see restricted areas.
    pub view_restricted_areas: bool,
}

/// Emitted when a new map is put in play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapLoaded {
    /// The session identifier.
    pub session_id: Uuid,
    /// The full map.
    pub map: MapState,
    /// Campaign ownership of every entity on the map.
    pub references: Vec<ResolvedReference>,
}

/// Emitted when the current map changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapUpdated {
    /// The session identifier.
    pub session_id: Uuid,
    /// The applied delta.
    pub update: MapUpdate,
    /// Campaign ownership of every entity the delta touches.
    pub references: Vec<ResolvedReference>,
}

/// Emitted when an encounter begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterStarted {
    /// The session identifier.
    pub session_id: Uuid,
    /// The initial encounter state.
    pub encounter: EncounterState,
    /// Campaign ownership of every participant and effect target.
    pub references: Vec<ResolvedReference>,
}

/// Emitted when the running encounter changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterUpdated {
    /// The session identifier.
    pub session_id: Uuid,
    /// The applied delta.
    pub update: EncounterUpdate,
    /// Campaign ownership of every entity the delta touches.
    pub references: Vec<ResolvedReference>,
}

/// Emitted when the running encounter ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterEnded {
    /// The session identifier.
    pub session_id: Uuid,
    /// The finished encounter.
    pub encounter_id: Uuid,
}

/// Emitted when a character's inventory changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryChanged {
    /// The session identifier.
    pub session_id: Uuid,
    /// The player owning the character.
    pub player_id: Uuid,
    /// The applied change.
    pub change: InventoryChange,
    /// Campaign ownership of the character and item.
    pub references: Vec<ResolvedReference>,
}

/// Emitted when a player submits an action for GM resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSubmitted {
    /// The session identifier.
    pub session_id: Uuid,
    /// The submitted action.
    pub action: PendingAction,
}

/// Emitted when the GM resolves a pending action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResolved {
    /// The session identifier.
    pub session_id: Uuid,
    /// The resolution.
    pub result: ActionMessage,
}

/// Emitted when runtime flags change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeFlagsChanged {
    /// The session identifier.
    pub session_id: Uuid,
    /// Changed flags; a `null` value clears the flag.
    pub changes: Map<String, Value>,
}

/// Event type identifier for [`SessionStarted`].
pub const SESSION_STARTED_EVENT_TYPE: &str = "session.started";

/// Event type identifier for [`PlayerJoined`].
pub const PLAYER_JOINED_EVENT_TYPE: &str = "session.player_joined";

/// Event type identifier for [`PlayerPermissionsChanged`].
pub const PLAYER_PERMISSIONS_CHANGED_EVENT_TYPE: &str = "session.player_permissions_changed";

/// Event type identifier for [`MapLoaded`].
pub const MAP_LOADED_EVENT_TYPE: &str = "session.map_loaded";

/// Event type identifier for [`MapUpdated`].
pub const MAP_UPDATED_EVENT_TYPE: &str = "session.map_updated";

/// Event type identifier for [`EncounterStarted`].
pub const ENCOUNTER_STARTED_EVENT_TYPE: &str = "session.encounter_started";

/// Event type identifier for [`EncounterUpdated`].
pub const ENCOUNTER_UPDATED_EVENT_TYPE: &str = "session.encounter_updated";

/// Event type identifier for [`EncounterEnded`].
pub const ENCOUNTER_ENDED_EVENT_TYPE: &str = "session.encounter_ended";

/// Event type identifier for [`InventoryChanged`].
pub const INVENTORY_CHANGED_EVENT_TYPE: &str = "session.inventory_changed";

/// Event type identifier for [`ActionSubmitted`].
pub const ACTION_SUBMITTED_EVENT_TYPE: &str = "session.action_submitted";

/// Event type identifier for [`ActionResolved`].
pub const ACTION_RESOLVED_EVENT_TYPE: &str = "session.action_resolved";

/// Event type identifier for [`RuntimeFlagsChanged`].
pub const RUNTIME_FLAGS_CHANGED_EVENT_TYPE: &str = "session.runtime_flags_changed";

/// Event payload variants for the session context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEventKind {
    /// The session has started.
    SessionStarted(SessionStarted),
    /// A player has joined.
    PlayerJoined(PlayerJoined),
    /// A player's permissions have changed.
    PlayerPermissionsChanged(PlayerPermissionsChanged),
    /// A map has been loaded.
    MapLoaded(MapLoaded),
    /// The current map has changed.
    MapUpdated(MapUpdated),
    /// An encounter has started.
    EncounterStarted(EncounterStarted),
    /// The encounter has changed.
    EncounterUpdated(EncounterUpdated),
    /// The encounter has ended.
    EncounterEnded(EncounterEnded),
    /// An inventory has changed.
    InventoryChanged(InventoryChanged),
    /// A player action has been submitted.
    ActionSubmitted(ActionSubmitted),
    /// A player action has been resolved.
    ActionResolved(ActionResolved),
    /// Runtime flags have changed.
    RuntimeFlagsChanged(RuntimeFlagsChanged),
}

impl SessionEventKind {
    /// Returns the event type name of this payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStarted(_) => SESSION_STARTED_EVENT_TYPE,
            Self::PlayerJoined(_) => PLAYER_JOINED_EVENT_TYPE,
            Self::PlayerPermissionsChanged(_) => PLAYER_PERMISSIONS_CHANGED_EVENT_TYPE,
            Self::MapLoaded(_) => MAP_LOADED_EVENT_TYPE,
            Self::MapUpdated(_) => MAP_UPDATED_EVENT_TYPE,
            Self::EncounterStarted(_) => ENCOUNTER_STARTED_EVENT_TYPE,
            Self::EncounterUpdated(_) => ENCOUNTER_UPDATED_EVENT_TYPE,
            Self::EncounterEnded(_) => ENCOUNTER_ENDED_EVENT_TYPE,
            Self::InventoryChanged(_) => INVENTORY_CHANGED_EVENT_TYPE,
            Self::ActionSubmitted(_) => ACTION_SUBMITTED_EVENT_TYPE,
            Self::ActionResolved(_) => ACTION_RESOLVED_EVENT_TYPE,
            Self::RuntimeFlagsChanged(_) => RUNTIME_FLAGS_CHANGED_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the session context.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: SessionEventKind,
}

impl DomainEvent for SessionEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("SessionEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
