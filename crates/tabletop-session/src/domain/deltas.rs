//! Typed deltas: partial descriptions of what changed in a session.
//!
//! Each delta names the entities it touches through [`Delta::references`], so
//! that the campaign boundary can be checked before it is applied.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
pub use tabletop_core::membership::{EntityKind, EntityRef, ResolvedReference};
use uuid::Uuid;

use super::state::{ActiveEffect, Participant, TokenState};

/// Something that references campaign-owned entities.
pub trait Delta {
    /// Returns every entity the delta touches, without duplicates.
    fn references(&self) -> Vec<EntityRef>;
}

fn dedup(mut refs: Vec<EntityRef>) -> Vec<EntityRef> {
    refs.sort();
    refs.dedup();
    refs
}

fn token_references(tokens: &[TokenState]) -> impl Iterator<Item = EntityRef> + '_ {
    tokens.iter().flat_map(|token| {
        std::iter::once(EntityRef::new(EntityKind::Token, token.id)).chain(
            token
                .character_id
                .map(|id| EntityRef::new(EntityKind::Character, id)),
        )
    })
}

fn encounter_references<'a>(
    participants: &'a [Participant],
    effects: &'a [ActiveEffect],
) -> impl Iterator<Item = EntityRef> + 'a {
    participants
        .iter()
        .map(|p| EntityRef::new(EntityKind::Character, p.character_id))
        .chain(
            effects
                .iter()
                .filter_map(|e| e.target_id)
                .map(|id| EntityRef::new(EntityKind::Character, id)),
        )
}

/// Reveals an area of the current map to some players.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaReveal {
    /// The revealed area.
    pub id: String,
    /// Players the area is revealed to; empty means every joined player.
    #[serde(default)]
    pub player_ids: Vec<Uuid>,
}

/// Partial change to the current map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapUpdate {
    /// The map being changed.
    pub map_id: Uuid,
    /// Changed map properties; a `null` value removes the property.
    #[serde(default)]
    pub changes: Map<String, Value>,
    /// Newly revealed areas.
    #[serde(default)]
    pub revealed_areas: Vec<AreaReveal>,
    /// Tokens added or replaced, keyed by token id.
    #[serde(default)]
    pub tokens: Vec<TokenState>,
}

impl MapUpdate {
    /// Creates an update that changes nothing.
    #[must_use]
    pub fn new(map_id: Uuid) -> Self {
        Self {
            map_id,
            changes: Map::new(),
            revealed_areas: Vec::new(),
            tokens: Vec::new(),
        }
    }
}

impl Delta for MapUpdate {
    fn references(&self) -> Vec<EntityRef> {
        dedup(token_references(&self.tokens).collect())
    }
}

/// Partial change to the running encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterUpdate {
    /// The encounter being changed.
    pub encounter_id: Uuid,
    /// Changed encounter properties; a `null` value removes the property.
    #[serde(default)]
    pub changes: Map<String, Value>,
    /// Participants added or replaced, keyed by character id.
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Effects added or replaced, keyed by effect id.
    #[serde(default)]
    pub active_effects: Vec<ActiveEffect>,
}

impl EncounterUpdate {
    /// Creates an update that changes nothing.
    #[must_use]
    pub fn new(encounter_id: Uuid) -> Self {
        Self {
            encounter_id,
            changes: Map::new(),
            participants: Vec::new(),
            active_effects: Vec::new(),
        }
    }
}

impl Delta for EncounterUpdate {
    fn references(&self) -> Vec<EntityRef> {
        dedup(encounter_references(&self.participants, &self.active_effects).collect())
    }
}

/// What happened to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryChangeKind {
    /// The item was added to the character's inventory.
    Added,
    /// The item was removed.
    Removed,
    /// The item was equipped.
    Equipped,
    /// The item was unequipped.
    Unequipped,
    /// The item's quantity changed.
    QuantityChanged,
}

/// A change to one character's inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryChange {
    /// The character whose inventory changed.
    pub character_id: Uuid,
    /// The item concerned.
    pub item_id: Uuid,
    /// The kind of change.
    pub kind: InventoryChangeKind,
    /// Resulting quantity of the item.
    pub quantity: i64,
}

impl Delta for InventoryChange {
    fn references(&self) -> Vec<EntityRef> {
        dedup(vec![
            EntityRef::new(EntityKind::Character, self.character_id),
            EntityRef::new(EntityKind::Item, self.item_id),
        ])
    }
}

/// The resolved outcome of a player action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    /// The resolved action.
    pub action_id: Uuid,
    /// The player who submitted the action.
    pub player_id: Uuid,
    /// Action kind, echoed from the submission.
    pub action_type: String,
    /// Resolution details. Opaque to the engine.
    #[serde(default)]
    pub result: Value,
}

impl Delta for ActionMessage {
    fn references(&self) -> Vec<EntityRef> {
        Vec::new()
    }
}

/// Entities referenced by a full map, used when a map is loaded.
#[must_use]
pub fn map_references(tokens: &[TokenState]) -> Vec<EntityRef> {
    dedup(token_references(tokens).collect())
}

/// Characters a joining player claims to control.
#[must_use]
pub fn character_references(character_ids: &[Uuid]) -> Vec<EntityRef> {
    dedup(
        character_ids
            .iter()
            .map(|id| EntityRef::new(EntityKind::Character, *id))
            .collect(),
    )
}

/// Entities referenced by a full encounter, used when it starts.
#[must_use]
pub fn encounter_state_references(
    participants: &[Participant],
    effects: &[ActiveEffect],
) -> Vec<EntityRef> {
    dedup(encounter_references(participants, effects).collect())
}
