//! The authoritative session snapshot and its sub-structures.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabletop_core::integrity::StateSummary;
use uuid::Uuid;

/// A named region of a map. Players only see the areas revealed to them
/// unless they may view restricted areas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapArea {
    /// Area identifier, unique within its map.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// Grid position of a token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// A token placed on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    /// Token identifier.
    pub id: Uuid,
    /// Character the token represents, if any.
    #[serde(default)]
    pub character_id: Option<Uuid>,
    /// Current position.
    pub position: Position,
    /// Hidden tokens are only visible to the GM.
    #[serde(default)]
    pub hidden: bool,
    /// Free-form token properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// The map currently in play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapState {
    /// Map identifier.
    pub map_id: Uuid,
    /// Display name.
    pub name: String,
    /// Areas of the map.
    #[serde(default)]
    pub areas: Vec<MapArea>,
    /// Tokens on the map, in placement order.
    #[serde(default)]
    pub tokens: Vec<TokenState>,
    /// Free-form map properties (lighting, grid settings, ...).
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A combatant in an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// The participating character.
    pub character_id: Uuid,
    /// Initiative score.
    pub initiative: i32,
    /// Current hit points.
    pub hit_points: i32,
    /// Conditions currently affecting the participant.
    #[serde(default)]
    pub conditions: Vec<String>,
}

/// An ongoing effect in an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEffect {
    /// Effect identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// The character the effect applies to, if any.
    #[serde(default)]
    pub target_id: Option<Uuid>,
    /// Rounds left before the effect expires, if bounded.
    #[serde(default)]
    pub remaining_rounds: Option<u32>,
}

/// The encounter currently running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterState {
    /// Encounter identifier.
    pub encounter_id: Uuid,
    /// Participants in join order.
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Active effects in creation order.
    #[serde(default)]
    pub active_effects: Vec<ActiveEffect>,
    /// Free-form encounter properties (round, turn, ...).
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A player action awaiting resolution by the GM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    /// Action identifier.
    pub action_id: Uuid,
    /// The submitting player.
    pub player_id: Uuid,
    /// The campaign the action was submitted in.
    pub campaign_id: Uuid,
    /// Action kind (attack, skill_check, ...). Opaque to the engine.
    pub action_type: String,
    /// Action details. Opaque to the engine.
    #[serde(default)]
    pub payload: Value,
    /// When the action was submitted.
    pub submitted_at: DateTime<Utc>,
}

/// What one player may see and control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPermissions {
    /// Whether the player sees every area, revealed or not.
    #[serde(default)]
    pub view_restricted_areas: bool,
    /// Areas of the current map revealed to this player.
    #[serde(default)]
    pub revealed_areas: BTreeSet<String>,
    /// Characters the player controls.
    #[serde(default)]
    pub controlled_characters: BTreeSet<Uuid>,
}

/// The full authoritative snapshot of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionState {
    /// Session identifier.
    pub session_id: Uuid,
    /// Campaign the session belongs to.
    pub campaign_id: Uuid,
    /// The Game Master of this session.
    pub gm_id: Uuid,
    /// The map in play, if any.
    pub current_map: Option<MapState>,
    /// The running encounter, if any.
    pub current_encounter: Option<EncounterState>,
    /// Actions awaiting GM resolution, in submission order.
    pub pending_actions: Vec<PendingAction>,
    /// Per-player permissions, keyed by player id.
    pub player_permissions: BTreeMap<Uuid, PlayerPermissions>,
    /// Runtime flags (combat mode, paused, ...).
    pub runtime: Map<String, Value>,
    /// Decimal revision counter of this snapshot.
    pub state_version: String,
}

impl CompleteSessionState {
    /// Creates the empty state of a session that has not started yet.
    #[must_use]
    pub fn empty(session_id: Uuid) -> Self {
        Self {
            session_id,
            campaign_id: Uuid::nil(),
            gm_id: Uuid::nil(),
            current_map: None,
            current_encounter: None,
            pending_actions: Vec::new(),
            player_permissions: BTreeMap::new(),
            runtime: Map::new(),
            state_version: "0".to_owned(),
        }
    }

    /// Returns `true` if `player_id` has joined the session.
    #[must_use]
    pub fn has_player(&self, player_id: Uuid) -> bool {
        self.player_permissions.contains_key(&player_id)
    }

    /// Returns the permissions of `player_id`, or the default (most
    /// restrictive) permissions if the player has not joined.
    #[must_use]
    pub fn permissions_of(&self, player_id: Uuid) -> PlayerPermissions {
        self.player_permissions
            .get(&player_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl StateSummary for CompleteSessionState {
    fn summary(&self) -> String {
        format!(
            "version={} areas={} tokens={} participants={} pending_actions={} players={} runtime_flags={}",
            self.state_version,
            self.current_map.as_ref().map_or(0, |m| m.areas.len()),
            self.current_map.as_ref().map_or(0, |m| m.tokens.len()),
            self.current_encounter
                .as_ref()
                .map_or(0, |e| e.participants.len()),
            self.pending_actions.len(),
            self.player_permissions.len(),
            self.runtime.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state_starts_at_version_zero() {
        let state = CompleteSessionState::empty(Uuid::new_v4());

        assert_eq!(state.state_version, "0");
        assert!(state.current_map.is_none());
        assert!(state.pending_actions.is_empty());
    }

    #[test]
    fn test_permissions_of_unknown_player_are_restrictive() {
        let state = CompleteSessionState::empty(Uuid::new_v4());

        let permissions = state.permissions_of(Uuid::new_v4());

        assert!(!permissions.view_restricted_areas);
        assert!(permissions.revealed_areas.is_empty());
    }

    #[test]
    fn test_state_serializes_in_camel_case() {
        let state = CompleteSessionState::empty(Uuid::new_v4());

        let value = serde_json::to_value(&state).unwrap();

        assert!(value.get("stateVersion").is_some());
        assert!(value.get("playerPermissions").is_some());
        assert!(value.get("pendingActions").is_some());
    }

    #[test]
    fn test_summary_counts_sub_collections() {
        let mut state = CompleteSessionState::empty(Uuid::new_v4());
        state
            .player_permissions
            .insert(Uuid::new_v4(), PlayerPermissions::default());

        let summary = state.summary();

        assert!(summary.contains("players=1"));
        assert!(summary.contains("pending_actions=0"));
    }
}
