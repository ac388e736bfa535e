//! Aggregate roots for the session context.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tabletop_core::aggregate::{AggregateCore, AggregateRoot};
use tabletop_core::clock::Clock;
use tabletop_core::error::DomainError;
use tabletop_core::event::EventMetadata;
use tabletop_core::integrity::next_version;
use tabletop_core::membership::{EntityRef, ensure_within_campaign};
use tabletop_core::validation::{ensure_in_range, ensure_pattern, ensure_required};
use uuid::Uuid;

use super::deltas::{
    ActionMessage, Delta, EncounterUpdate, InventoryChange, MapUpdate, ResolvedReference,
    character_references, encounter_state_references, map_references,
};
use super::events::{
    ActionResolved, ActionSubmitted, EncounterEnded, EncounterStarted, EncounterUpdated,
    InventoryChanged, MapLoaded, MapUpdated, PlayerJoined, PlayerPermissionsChanged,
    RuntimeFlagsChanged, SessionEvent, SessionEventKind, SessionStarted,
};
use super::state::{CompleteSessionState, EncounterState, MapState, PendingAction};

const AGGREGATE: &str = "GameSession";

/// Upper bound on a single item stack.
const MAX_ITEM_QUANTITY: i64 = 1_000_000;

static RUNTIME_FLAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_.-]{0,63}$").expect("runtime flag pattern is valid")
});

fn apply_changes(target: &mut Map<String, Value>, changes: &Map<String, Value>) {
    for (key, value) in changes {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn upsert_by<T: Clone, K: PartialEq>(items: &mut Vec<T>, incoming: &[T], key: impl Fn(&T) -> K) {
    for item in incoming {
        match items.iter().position(|existing| key(existing) == key(item)) {
            Some(index) => items[index] = item.clone(),
            None => items.push(item.clone()),
        }
    }
}

/// The aggregate root for one game session. Owns the authoritative
/// [`CompleteSessionState`].
#[derive(Debug)]
pub struct GameSession {
    /// Aggregate identifier (the session id).
    pub id: Uuid,
    started: bool,
    state: CompleteSessionState,
    core: AggregateCore<SessionEvent>,
}

impl GameSession {
    /// Creates a session that has not started yet.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            started: false,
            state: CompleteSessionState::empty(id),
            core: AggregateCore::new(),
        }
    }

    /// Returns the current authoritative state.
    #[must_use]
    pub fn state(&self) -> &CompleteSessionState {
        &self.state
    }

    /// Returns an owned snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> CompleteSessionState {
        self.state.clone()
    }

    /// Returns `true` once `SessionStarted` has been applied.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Returns the session's Game Master.
    #[must_use]
    pub fn gm_id(&self) -> Uuid {
        self.state.gm_id
    }

    /// Returns the session's campaign.
    #[must_use]
    pub fn campaign_id(&self) -> Uuid {
        self.state.campaign_id
    }

    fn new_event(
        &self,
        kind: SessionEventKind,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> SessionEvent {
        SessionEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.id,
                sequence_number: self.next_sequence_number(),
                correlation_id,
                causation_id: correlation_id,
                occurred_at: clock.now(),
            },
            kind,
        }
    }

    fn emit(
        &mut self,
        kind: SessionEventKind,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let event = self.new_event(kind, correlation_id, clock);
        self.apply_event(event)
    }

    /// Starts the session for a campaign, producing a `SessionStarted` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the session already started or an
    /// identifier is nil.
    pub fn start(
        &mut self,
        campaign_id: Uuid,
        gm_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::SessionStarted(SessionStarted {
            session_id: self.id,
            campaign_id,
            gm_id,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Adds a player (or updates a returning player's characters), producing
    /// a `PlayerJoined` event. Joining never grants access to restricted
    /// areas; a returning player keeps whatever the GM granted before.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the session has not started or
    /// the player id is nil, and `DomainError::BoundaryViolation` for
    /// characters outside the campaign.
    pub fn join_player(
        &mut self,
        player_id: Uuid,
        controlled_characters: Vec<Uuid>,
        references: Vec<ResolvedReference>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::PlayerJoined(PlayerJoined {
            session_id: self.id,
            player_id,
            controlled_characters,
            references,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Changes what a joined player may see, producing a
    /// `PlayerPermissionsChanged` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the player has not joined.
    pub fn set_player_permissions(
        &mut self,
        player_id: Uuid,
        view_restricted_areas: bool,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::PlayerPermissionsChanged(PlayerPermissionsChanged {
            session_id: self.id,
            player_id,
            view_restricted_areas,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Puts a new map in play, producing a `MapLoaded` event. Revealed areas
    /// of the previous map are forgotten.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for malformed maps and
    /// `DomainError::BoundaryViolation` for tokens outside the campaign.
    pub fn load_map(
        &mut self,
        map: MapState,
        references: Vec<ResolvedReference>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::MapLoaded(MapLoaded {
            session_id: self.id,
            map,
            references,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Applies a map delta, producing a `MapUpdated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if no matching map is loaded or a
    /// reveal names an unknown area or player, and
    /// `DomainError::BoundaryViolation` for tokens outside the campaign.
    pub fn apply_map_update(
        &mut self,
        update: MapUpdate,
        references: Vec<ResolvedReference>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::MapUpdated(MapUpdated {
            session_id: self.id,
            update,
            references,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Starts an encounter, producing an `EncounterStarted` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if an encounter is already running
    /// and `DomainError::BoundaryViolation` for participants outside the
    /// campaign.
    pub fn start_encounter(
        &mut self,
        encounter: EncounterState,
        references: Vec<ResolvedReference>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::EncounterStarted(EncounterStarted {
            session_id: self.id,
            encounter,
            references,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Applies an encounter delta, producing an `EncounterUpdated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the encounter is not the running
    /// one and `DomainError::BoundaryViolation` for participants outside the
    /// campaign.
    pub fn apply_encounter_update(
        &mut self,
        update: EncounterUpdate,
        references: Vec<ResolvedReference>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::EncounterUpdated(EncounterUpdated {
            session_id: self.id,
            update,
            references,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Ends the running encounter, producing an `EncounterEnded` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the encounter is not the running
    /// one.
    pub fn end_encounter(
        &mut self,
        encounter_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::EncounterEnded(EncounterEnded {
            session_id: self.id,
            encounter_id,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Records an inventory change, producing an `InventoryChanged` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for unknown players or out-of-range
    /// quantities and `DomainError::BoundaryViolation` for items or
    /// characters outside the campaign.
    pub fn record_inventory_change(
        &mut self,
        player_id: Uuid,
        change: InventoryChange,
        references: Vec<ResolvedReference>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::InventoryChanged(InventoryChanged {
            session_id: self.id,
            player_id,
            change,
            references,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Queues a player action for GM resolution, producing an
    /// `ActionSubmitted` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for unknown players, duplicate ids or
    /// a missing action type, and `DomainError::BoundaryViolation` if the
    /// action was submitted from another campaign.
    pub fn submit_action(
        &mut self,
        action: PendingAction,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::ActionSubmitted(ActionSubmitted {
            session_id: self.id,
            action,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Resolves a pending action, producing an `ActionResolved` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if no such action is pending or it
    /// belongs to another player.
    pub fn record_action_result(
        &mut self,
        result: ActionMessage,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::ActionResolved(ActionResolved {
            session_id: self.id,
            result,
        });
        self.emit(kind, correlation_id, clock)
    }

    /// Changes runtime flags, producing a `RuntimeFlagsChanged` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for empty changes or malformed flag
    /// names.
    pub fn change_runtime_flags(
        &mut self,
        changes: Map<String, Value>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let kind = SessionEventKind::RuntimeFlagsChanged(RuntimeFlagsChanged {
            session_id: self.id,
            changes,
        });
        self.emit(kind, correlation_id, clock)
    }

    fn ensure_started(&self) -> Result<(), DomainError> {
        if !self.started {
            return Err(DomainError::validation(
                AGGREGATE,
                "session",
                "has not been started",
            ));
        }
        Ok(())
    }

    fn ensure_player(&self, player_id: Uuid, field: &str) -> Result<(), DomainError> {
        if !self.state.has_player(player_id) {
            return Err(DomainError::validation(
                AGGREGATE,
                field,
                format!("player {player_id} has not joined the session"),
            ));
        }
        Ok(())
    }

    fn ensure_boundary(
        &self,
        required: &[EntityRef],
        resolved: &[ResolvedReference],
    ) -> Result<(), DomainError> {
        ensure_within_campaign(AGGREGATE, self.state.campaign_id, required, resolved)
    }

    fn apply_session_started(&mut self, payload: &SessionStarted) -> Result<(), DomainError> {
        if self.started {
            return Err(DomainError::validation(
                AGGREGATE,
                "session",
                "has already been started",
            ));
        }
        ensure_required(&payload.campaign_id, AGGREGATE, "campaign_id")?;
        ensure_required(&payload.gm_id, AGGREGATE, "gm_id")?;

        self.started = true;
        self.state.campaign_id = payload.campaign_id;
        self.state.gm_id = payload.gm_id;
        Ok(())
    }

    fn apply_player_joined(&mut self, payload: &PlayerJoined) -> Result<(), DomainError> {
        self.ensure_started()?;
        ensure_required(&payload.player_id, AGGREGATE, "player_id")?;
        self.ensure_boundary(
            &character_references(&payload.controlled_characters),
            &payload.references,
        )?;

        let permissions = self
            .state
            .player_permissions
            .entry(payload.player_id)
            .or_default();
        permissions.controlled_characters = payload.controlled_characters.iter().copied().collect();
        Ok(())
    }

    fn apply_player_permissions_changed(
        &mut self,
        payload: &PlayerPermissionsChanged,
    ) -> Result<(), DomainError> {
        self.ensure_started()?;
        self.ensure_player(payload.player_id, "player_id")?;

        if let Some(permissions) = self.state.player_permissions.get_mut(&payload.player_id) {
            permissions.view_restricted_areas = payload.view_restricted_areas;
        }
        Ok(())
    }

    fn apply_map_loaded(&mut self, payload: &MapLoaded) -> Result<(), DomainError> {
        self.ensure_started()?;
        ensure_required(&payload.map.map_id, AGGREGATE, "map_id")?;
        for area in &payload.map.areas {
            ensure_required(area.id.as_str(), AGGREGATE, "areas.id")?;
        }
        self.ensure_boundary(&map_references(&payload.map.tokens), &payload.references)?;

        self.state.current_map = Some(payload.map.clone());
        for permissions in self.state.player_permissions.values_mut() {
            permissions.revealed_areas.clear();
        }
        Ok(())
    }

    fn apply_map_updated(&mut self, payload: &MapUpdated) -> Result<(), DomainError> {
        self.ensure_started()?;
        let update = &payload.update;
        let map = self.state.current_map.as_ref().ok_or_else(|| {
            DomainError::validation(AGGREGATE, "current_map", "no map is loaded")
        })?;
        if map.map_id != update.map_id {
            return Err(DomainError::validation(
                AGGREGATE,
                "map_id",
                format!("map {} is not the current map", update.map_id),
            ));
        }
        for reveal in &update.revealed_areas {
            if !map.areas.iter().any(|area| area.id == reveal.id) {
                return Err(DomainError::validation(
                    AGGREGATE,
                    "revealed_areas",
                    format!("area {:?} does not exist on map {}", reveal.id, map.map_id),
                ));
            }
            for player_id in &reveal.player_ids {
                self.ensure_player(*player_id, "revealed_areas.player_ids")?;
            }
        }
        self.ensure_boundary(&update.references(), &payload.references)?;

        for reveal in &update.revealed_areas {
            for (player_id, permissions) in &mut self.state.player_permissions {
                if reveal.player_ids.is_empty() || reveal.player_ids.contains(player_id) {
                    permissions.revealed_areas.insert(reveal.id.clone());
                }
            }
        }
        if let Some(map) = self.state.current_map.as_mut() {
            apply_changes(&mut map.properties, &update.changes);
            upsert_by(&mut map.tokens, &update.tokens, |token| token.id);
        }
        Ok(())
    }

    fn running_encounter(&self, encounter_id: Uuid) -> Result<(), DomainError> {
        match &self.state.current_encounter {
            Some(encounter) if encounter.encounter_id == encounter_id => Ok(()),
            Some(_) => Err(DomainError::validation(
                AGGREGATE,
                "encounter_id",
                format!("encounter {encounter_id} is not the running encounter"),
            )),
            None => Err(DomainError::validation(
                AGGREGATE,
                "current_encounter",
                "no encounter is running",
            )),
        }
    }

    fn apply_encounter_started(&mut self, payload: &EncounterStarted) -> Result<(), DomainError> {
        self.ensure_started()?;
        ensure_required(&payload.encounter.encounter_id, AGGREGATE, "encounter_id")?;
        if self.state.current_encounter.is_some() {
            return Err(DomainError::validation(
                AGGREGATE,
                "current_encounter",
                "an encounter is already running",
            ));
        }
        let required = encounter_state_references(
            &payload.encounter.participants,
            &payload.encounter.active_effects,
        );
        self.ensure_boundary(&required, &payload.references)?;

        self.state.current_encounter = Some(payload.encounter.clone());
        Ok(())
    }

    fn apply_encounter_updated(&mut self, payload: &EncounterUpdated) -> Result<(), DomainError> {
        self.ensure_started()?;
        let update = &payload.update;
        self.running_encounter(update.encounter_id)?;
        self.ensure_boundary(&update.references(), &payload.references)?;

        if let Some(encounter) = self.state.current_encounter.as_mut() {
            apply_changes(&mut encounter.properties, &update.changes);
            upsert_by(&mut encounter.participants, &update.participants, |p| {
                p.character_id
            });
            upsert_by(&mut encounter.active_effects, &update.active_effects, |e| {
                e.id
            });
        }
        Ok(())
    }

    fn apply_encounter_ended(&mut self, payload: &EncounterEnded) -> Result<(), DomainError> {
        self.ensure_started()?;
        self.running_encounter(payload.encounter_id)?;

        self.state.current_encounter = None;
        Ok(())
    }

    fn apply_inventory_changed(&self, payload: &InventoryChanged) -> Result<(), DomainError> {
        self.ensure_started()?;
        self.ensure_player(payload.player_id, "player_id")?;
        ensure_in_range(
            payload.change.quantity,
            0,
            MAX_ITEM_QUANTITY,
            AGGREGATE,
            "quantity",
        )?;
        self.ensure_boundary(&payload.change.references(), &payload.references)
    }

    fn apply_action_submitted(&mut self, payload: &ActionSubmitted) -> Result<(), DomainError> {
        self.ensure_started()?;
        let action = &payload.action;
        ensure_required(&action.action_id, AGGREGATE, "action_id")?;
        ensure_required(action.action_type.as_str(), AGGREGATE, "action_type")?;
        self.ensure_player(action.player_id, "player_id")?;
        if action.campaign_id != self.state.campaign_id {
            return Err(DomainError::BoundaryViolation {
                aggregate: AGGREGATE.to_owned(),
                entity: "action".to_owned(),
                entity_id: action.action_id,
            });
        }
        if self
            .state
            .pending_actions
            .iter()
            .any(|pending| pending.action_id == action.action_id)
        {
            return Err(DomainError::validation(
                AGGREGATE,
                "action_id",
                format!("action {} is already pending", action.action_id),
            ));
        }

        self.state.pending_actions.push(action.clone());
        Ok(())
    }

    fn apply_action_resolved(&mut self, payload: &ActionResolved) -> Result<(), DomainError> {
        self.ensure_started()?;
        let result = &payload.result;
        let index = self
            .state
            .pending_actions
            .iter()
            .position(|pending| pending.action_id == result.action_id)
            .ok_or_else(|| {
                DomainError::validation(
                    AGGREGATE,
                    "action_id",
                    format!("no pending action {}", result.action_id),
                )
            })?;
        if self.state.pending_actions[index].player_id != result.player_id {
            return Err(DomainError::validation(
                AGGREGATE,
                "player_id",
                format!(
                    "action {} was not submitted by player {}",
                    result.action_id, result.player_id
                ),
            ));
        }

        self.state.pending_actions.remove(index);
        Ok(())
    }

    fn apply_runtime_flags_changed(
        &mut self,
        payload: &RuntimeFlagsChanged,
    ) -> Result<(), DomainError> {
        self.ensure_started()?;
        if payload.changes.is_empty() {
            return Err(DomainError::validation(
                AGGREGATE,
                "runtime",
                "at least one flag must change",
            ));
        }
        for key in payload.changes.keys() {
            ensure_pattern(
                key,
                &RUNTIME_FLAG_PATTERN,
                AGGREGATE,
                "runtime",
                Some("flag names must be identifiers of at most 64 characters"),
            )?;
        }

        apply_changes(&mut self.state.runtime, &payload.changes);
        Ok(())
    }
}

impl AggregateRoot for GameSession {
    type Event = SessionEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn aggregate_type(&self) -> &'static str {
        AGGREGATE
    }

    fn core(&self) -> &AggregateCore<SessionEvent> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AggregateCore<SessionEvent> {
        &mut self.core
    }

    fn apply(&mut self, event: &SessionEvent) -> Result<(), DomainError> {
        match &event.kind {
            SessionEventKind::SessionStarted(payload) => self.apply_session_started(payload)?,
            SessionEventKind::PlayerJoined(payload) => self.apply_player_joined(payload)?,
            SessionEventKind::PlayerPermissionsChanged(payload) => {
                self.apply_player_permissions_changed(payload)?;
            }
            SessionEventKind::MapLoaded(payload) => self.apply_map_loaded(payload)?,
            SessionEventKind::MapUpdated(payload) => self.apply_map_updated(payload)?,
            SessionEventKind::EncounterStarted(payload) => {
                self.apply_encounter_started(payload)?;
            }
            SessionEventKind::EncounterUpdated(payload) => {
                self.apply_encounter_updated(payload)?;
            }
            SessionEventKind::EncounterEnded(payload) => self.apply_encounter_ended(payload)?,
            SessionEventKind::InventoryChanged(payload) => {
                self.apply_inventory_changed(payload)?;
            }
            SessionEventKind::ActionSubmitted(payload) => self.apply_action_submitted(payload)?,
            SessionEventKind::ActionResolved(payload) => self.apply_action_resolved(payload)?,
            SessionEventKind::RuntimeFlagsChanged(payload) => {
                self.apply_runtime_flags_changed(payload)?;
            }
        }
        self.state.state_version = next_version(Some(&self.state.state_version));
        Ok(())
    }

    fn validate_invariants(&self) -> Result<(), DomainError> {
        if !self.started {
            if self.version() > 0 {
                return Err(DomainError::validation(
                    AGGREGATE,
                    "session",
                    "events were applied before the session started",
                ));
            }
            return Ok(());
        }
        for action in &self.state.pending_actions {
            if action.campaign_id != self.state.campaign_id {
                return Err(DomainError::BoundaryViolation {
                    aggregate: AGGREGATE.to_owned(),
                    entity: "action".to_owned(),
                    entity_id: action.action_id,
                });
            }
            self.ensure_player(action.player_id, "pending_actions")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tabletop_core::event::DomainEvent;
    use tabletop_core::membership::EntityKind;
    use tabletop_test_support::FixedClock;

    use super::*;
    use crate::domain::deltas::{AreaReveal, InventoryChangeKind};
    use crate::domain::events::{MAP_UPDATED_EVENT_TYPE, SESSION_STARTED_EVENT_TYPE};
    use crate::domain::state::{MapArea, Participant, Position, TokenState};

    struct Fixture {
        session: GameSession,
        clock: FixedClock,
        campaign_id: Uuid,
        gm_id: Uuid,
        player_id: Uuid,
        map_id: Uuid,
    }

    fn owned(kind: EntityKind, id: Uuid, campaign_id: Uuid) -> ResolvedReference {
        ResolvedReference {
            entity: EntityRef::new(kind, id),
            campaign_id: Some(campaign_id),
        }
    }

    fn area(id: &str) -> MapArea {
        MapArea {
            id: id.to_owned(),
            name: id.to_uppercase(),
        }
    }

    fn token(id: Uuid, x: f64) -> TokenState {
        TokenState {
            id,
            character_id: None,
            position: Position { x, y: 0.0 },
            hidden: false,
            properties: Map::new(),
        }
    }

    /// A started session with one joined player and a loaded map.
    fn fixture() -> Fixture {
        let clock = FixedClock::standard();
        let campaign_id = Uuid::new_v4();
        let gm_id = Uuid::new_v4();
        let player_id = Uuid::new_v4();
        let map_id = Uuid::new_v4();
        let mut session = GameSession::new(Uuid::new_v4());
        session
            .start(campaign_id, gm_id, Uuid::new_v4(), &clock)
            .unwrap();
        session
            .join_player(player_id, Vec::new(), Vec::new(), Uuid::new_v4(), &clock)
            .unwrap();
        let map = MapState {
            map_id,
            name: "Crypt".to_owned(),
            areas: vec![area("entrance"), area("vault")],
            tokens: Vec::new(),
            properties: Map::new(),
        };
        session
            .load_map(map, Vec::new(), Uuid::new_v4(), &clock)
            .unwrap();
        session.mark_events_as_committed();
        Fixture {
            session,
            clock,
            campaign_id,
            gm_id,
            player_id,
            map_id,
        }
    }

    #[test]
    fn test_start_produces_session_started_event() {
        // Arrange
        let session_id = Uuid::new_v4();
        let campaign_id = Uuid::new_v4();
        let gm_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let clock = FixedClock::standard();
        let mut session = GameSession::new(session_id);

        // Act
        session
            .start(campaign_id, gm_id, correlation_id, &clock)
            .unwrap();

        // Assert
        let events = session.uncommitted_events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type(), SESSION_STARTED_EVENT_TYPE);
        let meta = event.metadata();
        assert_eq!(meta.aggregate_id, session_id);
        assert_eq!(meta.sequence_number, 1);
        assert_eq!(meta.correlation_id, correlation_id);
        assert_eq!(meta.occurred_at, clock.0);
        assert_eq!(session.version(), 1);
        assert_eq!(session.state().state_version, "1");
        assert_eq!(session.campaign_id(), campaign_id);
        assert_eq!(session.gm_id(), gm_id);
    }

    #[test]
    fn test_start_twice_is_rejected_without_advancing_version() {
        let mut f = fixture();
        let version = f.session.version();

        let result = f
            .session
            .start(f.campaign_id, f.gm_id, Uuid::new_v4(), &f.clock);

        assert!(matches!(result, Err(DomainError::Validation { .. })));
        assert_eq!(f.session.version(), version);
        assert!(f.session.uncommitted_events().is_empty());
    }

    #[test]
    fn test_operations_before_start_are_rejected() {
        let clock = FixedClock::standard();
        let mut session = GameSession::new(Uuid::new_v4());

        let result =
            session.join_player(Uuid::new_v4(), Vec::new(), Vec::new(), Uuid::new_v4(), &clock);

        match result.unwrap_err() {
            DomainError::Validation { field, .. } => assert_eq!(field, "session"),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(session.version(), 0);
    }

    #[test]
    fn test_state_version_tracks_aggregate_version() {
        let f = fixture();

        assert_eq!(f.session.version(), 3);
        assert_eq!(f.session.state().state_version, "3");
    }

    #[test]
    fn test_join_with_character_from_another_campaign_is_rejected() {
        // Arrange
        let mut f = fixture();
        let newcomer = Uuid::new_v4();
        let character_id = Uuid::new_v4();
        let references = vec![owned(EntityKind::Character, character_id, Uuid::new_v4())];
        let version = f.session.version();

        // Act
        let result = f.session.join_player(
            newcomer,
            vec![character_id],
            references,
            Uuid::new_v4(),
            &f.clock,
        );

        // Assert
        assert!(matches!(result, Err(DomainError::BoundaryViolation { .. })));
        assert!(!f.session.state().has_player(newcomer));
        assert_eq!(f.session.version(), version);
    }

    #[test]
    fn test_join_with_unresolved_character_is_rejected() {
        let mut f = fixture();
        let character_id = Uuid::new_v4();

        let result = f.session.join_player(
            Uuid::new_v4(),
            vec![character_id],
            Vec::new(),
            Uuid::new_v4(),
            &f.clock,
        );

        assert!(matches!(result, Err(DomainError::BoundaryViolation { .. })));
    }

    #[test]
    fn test_rejoin_keeps_granted_permissions() {
        // Arrange
        let mut f = fixture();
        let character_id = Uuid::new_v4();
        f.session
            .set_player_permissions(f.player_id, true, Uuid::new_v4(), &f.clock)
            .unwrap();

        // Act
        f.session
            .join_player(
                f.player_id,
                vec![character_id],
                vec![owned(EntityKind::Character, character_id, f.campaign_id)],
                Uuid::new_v4(),
                &f.clock,
            )
            .unwrap();

        // Assert
        let permissions = &f.session.state().player_permissions[&f.player_id];
        assert!(permissions.view_restricted_areas);
        assert!(permissions.controlled_characters.contains(&character_id));
    }

    #[test]
    fn test_permissions_of_unknown_player_are_rejected() {
        let mut f = fixture();

        let result = f
            .session
            .set_player_permissions(Uuid::new_v4(), true, Uuid::new_v4(), &f.clock);

        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[test]
    fn test_map_update_merges_tokens_changes_and_reveals() {
        // Arrange
        let mut f = fixture();
        let token_id = Uuid::new_v4();
        let mut update = MapUpdate::new(f.map_id);
        update.changes.insert("fog".to_owned(), json!(true));
        update.tokens.push(token(token_id, 3.0));
        update.revealed_areas.push(AreaReveal {
            id: "vault".to_owned(),
            player_ids: vec![f.player_id],
        });
        let references = vec![owned(EntityKind::Token, token_id, f.campaign_id)];

        // Act
        f.session
            .apply_map_update(update, references, Uuid::new_v4(), &f.clock)
            .unwrap();

        // Assert
        let state = f.session.state();
        let map = state.current_map.as_ref().unwrap();
        assert_eq!(map.properties.get("fog"), Some(&json!(true)));
        assert_eq!(map.tokens.len(), 1);
        assert!(
            state.player_permissions[&f.player_id]
                .revealed_areas
                .contains("vault")
        );
        assert_eq!(
            f.session.uncommitted_events()[0].event_type(),
            MAP_UPDATED_EVENT_TYPE
        );
    }

    #[test]
    fn test_map_update_replaces_token_by_id() {
        let mut f = fixture();
        let token_id = Uuid::new_v4();
        let refs = vec![owned(EntityKind::Token, token_id, f.campaign_id)];
        let mut first = MapUpdate::new(f.map_id);
        first.tokens.push(token(token_id, 1.0));
        let mut second = MapUpdate::new(f.map_id);
        second.tokens.push(token(token_id, 7.0));

        f.session
            .apply_map_update(first, refs.clone(), Uuid::new_v4(), &f.clock)
            .unwrap();
        f.session
            .apply_map_update(second, refs, Uuid::new_v4(), &f.clock)
            .unwrap();

        let tokens = &f.session.state().current_map.as_ref().unwrap().tokens;
        assert_eq!(tokens.len(), 1);
        assert!((tokens[0].position.x - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_map_update_with_foreign_token_is_rejected_before_mutation() {
        // Arrange
        let mut f = fixture();
        let token_id = Uuid::new_v4();
        let mut update = MapUpdate::new(f.map_id);
        update.changes.insert("fog".to_owned(), json!(true));
        update.tokens.push(token(token_id, 1.0));
        let references = vec![owned(EntityKind::Token, token_id, Uuid::new_v4())];
        let before = f.session.snapshot();

        // Act
        let result = f
            .session
            .apply_map_update(update, references, Uuid::new_v4(), &f.clock);

        // Assert
        match result.unwrap_err() {
            DomainError::BoundaryViolation {
                entity, entity_id, ..
            } => {
                assert_eq!(entity, "token");
                assert_eq!(entity_id, token_id);
            }
            other => panic!("expected BoundaryViolation, got {other:?}"),
        }
        assert_eq!(f.session.snapshot(), before);
        assert_eq!(f.session.version(), 3);
    }

    #[test]
    fn test_map_update_for_other_map_is_rejected() {
        let mut f = fixture();

        let result = f.session.apply_map_update(
            MapUpdate::new(Uuid::new_v4()),
            Vec::new(),
            Uuid::new_v4(),
            &f.clock,
        );

        match result.unwrap_err() {
            DomainError::Validation { field, .. } => assert_eq!(field, "map_id"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_reveal_of_unknown_area_is_rejected() {
        let mut f = fixture();
        let mut update = MapUpdate::new(f.map_id);
        update.revealed_areas.push(AreaReveal {
            id: "attic".to_owned(),
            player_ids: Vec::new(),
        });

        let result = f
            .session
            .apply_map_update(update, Vec::new(), Uuid::new_v4(), &f.clock);

        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[test]
    fn test_loading_a_map_forgets_previous_reveals() {
        let mut f = fixture();
        let mut update = MapUpdate::new(f.map_id);
        update.revealed_areas.push(AreaReveal {
            id: "vault".to_owned(),
            player_ids: Vec::new(),
        });
        f.session
            .apply_map_update(update, Vec::new(), Uuid::new_v4(), &f.clock)
            .unwrap();
        let next_map = MapState {
            map_id: Uuid::new_v4(),
            name: "Forest".to_owned(),
            areas: vec![area("clearing")],
            tokens: Vec::new(),
            properties: Map::new(),
        };

        f.session
            .load_map(next_map, Vec::new(), Uuid::new_v4(), &f.clock)
            .unwrap();

        assert!(
            f.session.state().player_permissions[&f.player_id]
                .revealed_areas
                .is_empty()
        );
    }

    #[test]
    fn test_encounter_lifecycle() {
        // Arrange
        let mut f = fixture();
        let encounter_id = Uuid::new_v4();
        let fighter = Uuid::new_v4();
        let encounter = EncounterState {
            encounter_id,
            participants: vec![Participant {
                character_id: fighter,
                initiative: 12,
                hit_points: 20,
                conditions: Vec::new(),
            }],
            active_effects: Vec::new(),
            properties: Map::new(),
        };
        let refs = vec![owned(EntityKind::Character, fighter, f.campaign_id)];
        let mut update = EncounterUpdate::new(encounter_id);
        update.participants.push(Participant {
            character_id: fighter,
            initiative: 12,
            hit_points: 9,
            conditions: vec!["prone".to_owned()],
        });
        update.changes.insert("round".to_owned(), json!(2));

        // Act
        f.session
            .start_encounter(encounter, refs.clone(), Uuid::new_v4(), &f.clock)
            .unwrap();
        f.session
            .apply_encounter_update(update, refs, Uuid::new_v4(), &f.clock)
            .unwrap();

        // Assert
        let running = f.session.state().current_encounter.clone().unwrap();
        assert_eq!(running.participants.len(), 1);
        assert_eq!(running.participants[0].hit_points, 9);
        assert_eq!(running.properties.get("round"), Some(&json!(2)));

        f.session
            .end_encounter(encounter_id, Uuid::new_v4(), &f.clock)
            .unwrap();
        assert!(f.session.state().current_encounter.is_none());
        assert_eq!(f.session.version(), 6);
    }

    #[test]
    fn test_second_encounter_cannot_start_while_one_runs() {
        let mut f = fixture();
        let first = EncounterState {
            encounter_id: Uuid::new_v4(),
            participants: Vec::new(),
            active_effects: Vec::new(),
            properties: Map::new(),
        };
        let mut second = first.clone();
        second.encounter_id = Uuid::new_v4();
        f.session
            .start_encounter(first, Vec::new(), Uuid::new_v4(), &f.clock)
            .unwrap();

        let result = f
            .session
            .start_encounter(second, Vec::new(), Uuid::new_v4(), &f.clock);

        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[test]
    fn test_inventory_change_requires_campaign_items() {
        let mut f = fixture();
        let character_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let change = InventoryChange {
            character_id,
            item_id,
            kind: InventoryChangeKind::Added,
            quantity: 1,
        };
        let refs = vec![
            owned(EntityKind::Character, character_id, f.campaign_id),
            ResolvedReference {
                entity: EntityRef::new(EntityKind::Item, item_id),
                campaign_id: None,
            },
        ];

        let result = f.session.record_inventory_change(
            f.player_id,
            change,
            refs,
            Uuid::new_v4(),
            &f.clock,
        );

        match result.unwrap_err() {
            DomainError::BoundaryViolation { entity, .. } => assert_eq!(entity, "item"),
            other => panic!("expected BoundaryViolation, got {other:?}"),
        }
        assert_eq!(f.session.version(), 3);
    }

    #[test]
    fn test_inventory_change_rejects_negative_quantity() {
        let mut f = fixture();
        let change = InventoryChange {
            character_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            kind: InventoryChangeKind::QuantityChanged,
            quantity: -2,
        };

        let result = f.session.record_inventory_change(
            f.player_id,
            change,
            Vec::new(),
            Uuid::new_v4(),
            &f.clock,
        );

        match result.unwrap_err() {
            DomainError::Validation { field, .. } => assert_eq!(field, "quantity"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    fn pending(f: &Fixture, campaign_id: Uuid) -> PendingAction {
        PendingAction {
            action_id: Uuid::new_v4(),
            player_id: f.player_id,
            campaign_id,
            action_type: "attack".to_owned(),
            payload: json!({ "target": "goblin" }),
            submitted_at: f.clock.0,
        }
    }

    #[test]
    fn test_action_submit_and_resolve() {
        // Arrange
        let mut f = fixture();
        let action = pending(&f, f.campaign_id);
        let result = ActionMessage {
            action_id: action.action_id,
            player_id: f.player_id,
            action_type: "attack".to_owned(),
            result: json!({ "hit": true }),
        };

        // Act
        f.session
            .submit_action(action, Uuid::new_v4(), &f.clock)
            .unwrap();
        assert_eq!(f.session.state().pending_actions.len(), 1);
        f.session.validate_invariants().unwrap();
        f.session
            .record_action_result(result, Uuid::new_v4(), &f.clock)
            .unwrap();

        // Assert
        assert!(f.session.state().pending_actions.is_empty());
        assert_eq!(f.session.version(), 5);
    }

    #[test]
    fn test_action_from_other_campaign_is_a_boundary_violation() {
        let mut f = fixture();
        let action = pending(&f, Uuid::new_v4());

        let result = f.session.submit_action(action, Uuid::new_v4(), &f.clock);

        assert!(matches!(
            result,
            Err(DomainError::BoundaryViolation { .. })
        ));
        assert!(f.session.state().pending_actions.is_empty());
    }

    #[test]
    fn test_action_result_for_unknown_action_is_rejected() {
        let mut f = fixture();
        let result = ActionMessage {
            action_id: Uuid::new_v4(),
            player_id: f.player_id,
            action_type: "attack".to_owned(),
            result: json!(null),
        };

        let outcome = f
            .session
            .record_action_result(result, Uuid::new_v4(), &f.clock);

        match outcome.unwrap_err() {
            DomainError::Validation { field, .. } => assert_eq!(field, "action_id"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_runtime_flags_set_and_clear() {
        let mut f = fixture();
        let mut set = Map::new();
        set.insert("combat_mode".to_owned(), json!(true));
        set.insert("paused".to_owned(), json!(false));
        let mut clear = Map::new();
        clear.insert("paused".to_owned(), Value::Null);

        f.session
            .change_runtime_flags(set, Uuid::new_v4(), &f.clock)
            .unwrap();
        f.session
            .change_runtime_flags(clear, Uuid::new_v4(), &f.clock)
            .unwrap();

        let runtime = &f.session.state().runtime;
        assert_eq!(runtime.get("combat_mode"), Some(&json!(true)));
        assert!(runtime.get("paused").is_none());
    }

    #[test]
    fn test_runtime_flag_with_invalid_name_is_rejected() {
        let mut f = fixture();
        let mut changes = Map::new();
        changes.insert("not a flag!".to_owned(), json!(1));

        let result = f
            .session
            .change_runtime_flags(changes, Uuid::new_v4(), &f.clock);

        match result.unwrap_err() {
            DomainError::Validation { field, message, .. } => {
                assert_eq!(field, "runtime");
                assert!(message.contains("identifiers"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_observers_see_applied_events() {
        let mut f = fixture();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        f.session
            .core_mut()
            .subscribe(MAP_UPDATED_EVENT_TYPE, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        f.session
            .apply_map_update(
                MapUpdate::new(f.map_id),
                Vec::new(),
                Uuid::new_v4(),
                &f.clock,
            )
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
