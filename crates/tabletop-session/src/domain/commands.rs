//! Commands for the session context.
//!
//! Every command except [`StartSession`] targets an existing session and may
//! carry the `state_version` its issuer based it on. When present, the
//! handler rejects the command unless that version is still current.

use serde_json::{Map, Value};
use tabletop_core::command::Command;
use uuid::Uuid;

use super::deltas::{ActionMessage, EncounterUpdate, InventoryChange, MapUpdate};
use super::state::{EncounterState, MapState};

/// Command to open a session for a campaign.
#[derive(Debug, Clone)]
pub struct StartSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to open.
    pub session_id: Uuid,
    /// The campaign the session belongs to.
    pub campaign_id: Uuid,
    /// The Game Master running the session.
    pub gm_id: Uuid,
}

impl Command for StartSession {
    fn command_type(&self) -> &'static str {
        "session.start_session"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to add a player to a session.
#[derive(Debug, Clone)]
pub struct JoinPlayer {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The joining player.
    pub player_id: Uuid,
    /// Characters the player controls.
    pub controlled_characters: Vec<Uuid>,
}

impl Command for JoinPlayer {
    fn command_type(&self) -> &'static str {
        "session.join_player"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to change what a joined player may see. Only the GM grants
/// access to restricted areas.
#[derive(Debug, Clone)]
pub struct SetPlayerPermissions {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The state version the issuer based this command on.
    pub expected_version: Option<String>,
    /// The player whose permissions change.
    pub player_id: Uuid,
    /// Whether the player may see restricted areas.
    pub view_restricted_areas: bool,
}

impl Command for SetPlayerPermissions {
    fn command_type(&self) -> &'static str {
        "session.set_player_permissions"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn expected_version(&self) -> Option<&str> {
        self.expected_version.as_deref()
    }
}

/// Command to put a map in play.
#[derive(Debug, Clone)]
pub struct LoadMap {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The state version the issuer based this command on.
    pub expected_version: Option<String>,
    /// The full map.
    pub map: MapState,
}

impl Command for LoadMap {
    fn command_type(&self) -> &'static str {
        "session.load_map"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn expected_version(&self) -> Option<&str> {
        self.expected_version.as_deref()
    }
}

/// Command to change the current map.
#[derive(Debug, Clone)]
pub struct ApplyMapUpdate {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The state version the issuer based this command on.
    pub expected_version: Option<String>,
    /// The delta to apply.
    pub update: MapUpdate,
}

impl Command for ApplyMapUpdate {
    fn command_type(&self) -> &'static str {
        "session.apply_map_update"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn expected_version(&self) -> Option<&str> {
        self.expected_version.as_deref()
    }
}

/// Command to start an encounter.
#[derive(Debug, Clone)]
pub struct StartEncounter {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The state version the issuer based this command on.
    pub expected_version: Option<String>,
    /// The initial encounter state.
    pub encounter: EncounterState,
}

impl Command for StartEncounter {
    fn command_type(&self) -> &'static str {
        "session.start_encounter"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn expected_version(&self) -> Option<&str> {
        self.expected_version.as_deref()
    }
}

/// Command to change the running encounter.
#[derive(Debug, Clone)]
pub struct ApplyEncounterUpdate {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The state version the issuer based this command on.
    pub expected_version: Option<String>,
    /// The delta to apply.
    pub update: EncounterUpdate,
}

impl Command for ApplyEncounterUpdate {
    fn command_type(&self) -> &'static str {
        "session.apply_encounter_update"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn expected_version(&self) -> Option<&str> {
        self.expected_version.as_deref()
    }
}

/// Command to end the running encounter.
#[derive(Debug, Clone)]
pub struct EndEncounter {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The state version the issuer based this command on.
    pub expected_version: Option<String>,
    /// The encounter to end.
    pub encounter_id: Uuid,
}

impl Command for EndEncounter {
    fn command_type(&self) -> &'static str {
        "session.end_encounter"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn expected_version(&self) -> Option<&str> {
        self.expected_version.as_deref()
    }
}

/// Command to record an inventory change.
#[derive(Debug, Clone)]
pub struct RecordInventoryChange {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The state version the issuer based this command on.
    pub expected_version: Option<String>,
    /// The player owning the character.
    pub player_id: Uuid,
    /// The change.
    pub change: InventoryChange,
}

impl Command for RecordInventoryChange {
    fn command_type(&self) -> &'static str {
        "session.record_inventory_change"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn expected_version(&self) -> Option<&str> {
        self.expected_version.as_deref()
    }
}

/// Command to queue a player action for GM resolution.
#[derive(Debug, Clone)]
pub struct SubmitAction {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The new action's identifier.
    pub action_id: Uuid,
    /// The submitting player.
    pub player_id: Uuid,
    /// The campaign the player submitted from.
    pub campaign_id: Uuid,
    /// Action kind.
    pub action_type: String,
    /// Action details.
    pub payload: Value,
}

impl Command for SubmitAction {
    fn command_type(&self) -> &'static str {
        "session.submit_action"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to record the GM's resolution of a pending action.
#[derive(Debug, Clone)]
pub struct RecordActionResult {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The state version the issuer based this command on.
    pub expected_version: Option<String>,
    /// The resolution.
    pub result: ActionMessage,
}

impl Command for RecordActionResult {
    fn command_type(&self) -> &'static str {
        "session.record_action_result"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn expected_version(&self) -> Option<&str> {
        self.expected_version.as_deref()
    }
}

/// Command to change runtime flags.
#[derive(Debug, Clone)]
pub struct ChangeRuntimeFlags {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target session.
    pub session_id: Uuid,
    /// The state version the issuer based this command on.
    pub expected_version: Option<String>,
    /// Changed flags; `null` clears a flag.
    pub changes: Map<String, Value>,
}

impl Command for ChangeRuntimeFlags {
    fn command_type(&self) -> &'static str {
        "session.change_runtime_flags"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn expected_version(&self) -> Option<&str> {
        self.expected_version.as_deref()
    }
}

/// Any command targeting an existing session.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// See [`JoinPlayer`].
    JoinPlayer(JoinPlayer),
    /// See [`SetPlayerPermissions`].
    SetPlayerPermissions(SetPlayerPermissions),
    /// See [`LoadMap`].
    LoadMap(LoadMap),
    /// See [`ApplyMapUpdate`].
    ApplyMapUpdate(ApplyMapUpdate),
    /// See [`StartEncounter`].
    StartEncounter(StartEncounter),
    /// See [`ApplyEncounterUpdate`].
    ApplyEncounterUpdate(ApplyEncounterUpdate),
    /// See [`EndEncounter`].
    EndEncounter(EndEncounter),
    /// See [`RecordInventoryChange`].
    RecordInventoryChange(RecordInventoryChange),
    /// See [`SubmitAction`].
    SubmitAction(SubmitAction),
    /// See [`RecordActionResult`].
    RecordActionResult(RecordActionResult),
    /// See [`ChangeRuntimeFlags`].
    ChangeRuntimeFlags(ChangeRuntimeFlags),
}

impl SessionCommand {
    fn inner(&self) -> &dyn Command {
        match self {
            Self::JoinPlayer(c) => c,
            Self::SetPlayerPermissions(c) => c,
            Self::LoadMap(c) => c,
            Self::ApplyMapUpdate(c) => c,
            Self::StartEncounter(c) => c,
            Self::ApplyEncounterUpdate(c) => c,
            Self::EndEncounter(c) => c,
            Self::RecordInventoryChange(c) => c,
            Self::SubmitAction(c) => c,
            Self::RecordActionResult(c) => c,
            Self::ChangeRuntimeFlags(c) => c,
        }
    }

    /// Returns the session the command targets.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::JoinPlayer(c) => c.session_id,
            Self::SetPlayerPermissions(c) => c.session_id,
            Self::LoadMap(c) => c.session_id,
            Self::ApplyMapUpdate(c) => c.session_id,
            Self::StartEncounter(c) => c.session_id,
            Self::ApplyEncounterUpdate(c) => c.session_id,
            Self::EndEncounter(c) => c.session_id,
            Self::RecordInventoryChange(c) => c.session_id,
            Self::SubmitAction(c) => c.session_id,
            Self::RecordActionResult(c) => c.session_id,
            Self::ChangeRuntimeFlags(c) => c.session_id,
        }
    }

    /// Returns `true` for commands only the session's GM may issue.
    #[must_use]
    pub fn requires_gm(&self) -> bool {
        !matches!(self, Self::JoinPlayer(_) | Self::SubmitAction(_))
    }
}

impl Command for SessionCommand {
    fn command_type(&self) -> &'static str {
        self.inner().command_type()
    }

    fn correlation_id(&self) -> Uuid {
        self.inner().correlation_id()
    }

    fn expected_version(&self) -> Option<&str> {
        self.inner().expected_version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_command_delegates_to_inner_command() {
        let correlation_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let command = SessionCommand::ChangeRuntimeFlags(ChangeRuntimeFlags {
            correlation_id,
            session_id,
            expected_version: Some("4".to_owned()),
            changes: Map::new(),
        });

        assert_eq!(command.command_type(), "session.change_runtime_flags");
        assert_eq!(command.correlation_id(), correlation_id);
        assert_eq!(command.expected_version(), Some("4"));
        assert_eq!(command.session_id(), session_id);
        assert!(command.requires_gm());
    }

    #[test]
    fn test_player_commands_do_not_carry_versions_or_require_gm() {
        let command = SessionCommand::SubmitAction(SubmitAction {
            correlation_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            action_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            action_type: "attack".to_owned(),
            payload: Value::Null,
        });

        assert_eq!(command.expected_version(), None);
        assert!(!command.requires_gm());
    }
}
