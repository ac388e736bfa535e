//! Command handlers for the session context.
//!
//! Each handler checks the optimistic lock, resolves the campaign ownership
//! of every referenced entity, runs the aggregate operation, re-asserts the
//! aggregate invariants and persists the uncommitted events.

use tabletop_core::aggregate::AggregateRoot;
use tabletop_core::clock::Clock;
use tabletop_core::command::Command;
use tabletop_core::error::DomainError;
use tabletop_core::event::EventMetadata;
use tabletop_core::integrity::is_valid_next_version;
use tabletop_core::membership::{CampaignDirectory, EntityRef, resolve_references};
use tabletop_core::repository::{EventRepository, StoredEvent};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::GameSession;
use crate::domain::commands::{SessionCommand, StartSession};
use crate::domain::deltas::{
    Delta, character_references, encounter_state_references, map_references,
};
use crate::domain::events::{SessionEvent, SessionEventKind};
use crate::domain::state::PendingAction;

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct SessionCommandResult {
    /// The session affected or created by the command.
    pub aggregate_id: Uuid,
    /// The stored events persisted by this call, including earlier events
    /// whose persistence had failed.
    pub stored_events: Vec<StoredEvent>,
    /// The events produced by this command.
    pub events: Vec<SessionEvent>,
    /// The session's state version after the command.
    pub state_version: String,
}

/// Reconstitutes a `GameSession` from stored events.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the history is empty,
/// `DomainError::Infrastructure` if event deserialization fails, and any
/// error raised while replaying an event.
pub fn reconstitute(
    session_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<GameSession, DomainError> {
    if existing_events.is_empty() {
        return Err(DomainError::AggregateNotFound(session_id));
    }
    let mut session = GameSession::new(session_id);
    for stored in existing_events {
        let kind: SessionEventKind =
            serde_json::from_value(stored.payload.clone()).map_err(|e| {
                DomainError::Infrastructure(format!("event deserialization failed: {e}"))
            })?;
        let event = SessionEvent {
            metadata: EventMetadata {
                event_id: stored.event_id,
                event_type: stored.event_type.clone(),
                aggregate_id: stored.aggregate_id,
                sequence_number: stored.sequence_number,
                correlation_id: stored.correlation_id,
                causation_id: stored.causation_id,
                occurred_at: stored.occurred_at,
            },
            kind,
        };
        session.replay(&event)?;
    }
    session.validate_invariants()?;
    Ok(session)
}

async fn persist(
    session: &mut GameSession,
    version_before: i64,
    repo: &dyn EventRepository,
) -> Result<SessionCommandResult, DomainError> {
    session.validate_invariants()?;

    let events: Vec<SessionEvent> = session
        .uncommitted_events()
        .iter()
        .filter(|event| event.metadata.sequence_number > version_before)
        .cloned()
        .collect();
    let stored_events: Vec<StoredEvent> = session
        .uncommitted_events()
        .iter()
        .map(StoredEvent::from_event)
        .collect();
    let expected_version = stored_events
        .first()
        .map_or(session.version(), |event| event.sequence_number - 1);

    if let Err(error) = repo
        .append_events(session.id, expected_version, &stored_events)
        .await
    {
        warn!(
            session_id = %session.id,
            pending = stored_events.len(),
            %error,
            "persisting session events failed; they stay uncommitted"
        );
        return Err(error);
    }
    session.mark_events_as_committed();

    Ok(SessionCommandResult {
        aggregate_id: session.id,
        stored_events,
        events,
        state_version: session.state().state_version.clone(),
    })
}

/// Handles the `StartSession` command: creates the aggregate, starts it and
/// persists the resulting event.
///
/// # Errors
///
/// Returns `DomainError::Validation` for nil identifiers and any error from
/// event appending.
#[instrument(skip(command, clock, repo), fields(session_id = %command.session_id))]
pub async fn handle_start_session(
    command: &StartSession,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<(GameSession, SessionCommandResult), DomainError> {
    info!(correlation_id = %command.correlation_id, "handling start_session command");
    let mut session = GameSession::new(command.session_id);
    session.start(
        command.campaign_id,
        command.gm_id,
        command.correlation_id,
        clock,
    )?;
    let result = persist(&mut session, 0, repo).await?;
    Ok((session, result))
}

fn required_references(command: &SessionCommand) -> Vec<EntityRef> {
    match command {
        SessionCommand::LoadMap(c) => map_references(&c.map.tokens),
        SessionCommand::ApplyMapUpdate(c) => c.update.references(),
        SessionCommand::StartEncounter(c) => {
            encounter_state_references(&c.encounter.participants, &c.encounter.active_effects)
        }
        SessionCommand::ApplyEncounterUpdate(c) => c.update.references(),
        SessionCommand::RecordInventoryChange(c) => c.change.references(),
        SessionCommand::JoinPlayer(c) => character_references(&c.controlled_characters),
        SessionCommand::SetPlayerPermissions(_)
        | SessionCommand::EndEncounter(_)
        | SessionCommand::SubmitAction(_)
        | SessionCommand::RecordActionResult(_)
        | SessionCommand::ChangeRuntimeFlags(_) => Vec::new(),
    }
}

/// Handles any command against an existing session.
///
/// # Errors
///
/// Returns `DomainError::VersionConflict` if the command's expected version
/// is stale, `DomainError::Validation` or `DomainError::BoundaryViolation`
/// if the aggregate rejects it, and any error from reference resolution or
/// event appending. A command the aggregate rejects leaves the session
/// untouched; a failed append leaves the applied events uncommitted.
#[instrument(
    skip(command, session, directory, clock, repo),
    fields(session_id = %session.id, command_type = command.command_type())
)]
pub async fn handle_command(
    command: &SessionCommand,
    session: &mut GameSession,
    directory: &dyn CampaignDirectory,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<SessionCommandResult, DomainError> {
    let correlation_id = command.correlation_id();
    info!(correlation_id = %correlation_id, "handling session command");

    if let Some(expected) = command.expected_version() {
        let current = &session.state().state_version;
        if !is_valid_next_version(Some(current), expected) {
            debug!(expected, current = %current, "rejecting stale command");
            return Err(DomainError::VersionConflict {
                aggregate_id: session.id,
                expected: expected.to_owned(),
                actual: current.clone(),
            });
        }
    }

    let references = resolve_references(directory, &required_references(command)).await?;
    let version_before = session.version();

    match command {
        SessionCommand::JoinPlayer(c) => session.join_player(
            c.player_id,
            c.controlled_characters.clone(),
            references,
            correlation_id,
            clock,
        )?,
        SessionCommand::SetPlayerPermissions(c) => session.set_player_permissions(
            c.player_id,
            c.view_restricted_areas,
            correlation_id,
            clock,
        )?,
        SessionCommand::LoadMap(c) => {
            session.load_map(c.map.clone(), references, correlation_id, clock)?;
        }
        SessionCommand::ApplyMapUpdate(c) => {
            session.apply_map_update(c.update.clone(), references, correlation_id, clock)?;
        }
        SessionCommand::StartEncounter(c) => {
            session.start_encounter(c.encounter.clone(), references, correlation_id, clock)?;
        }
        SessionCommand::ApplyEncounterUpdate(c) => {
            session.apply_encounter_update(c.update.clone(), references, correlation_id, clock)?;
        }
        SessionCommand::EndEncounter(c) => {
            session.end_encounter(c.encounter_id, correlation_id, clock)?;
        }
        SessionCommand::RecordInventoryChange(c) => session.record_inventory_change(
            c.player_id,
            c.change.clone(),
            references,
            correlation_id,
            clock,
        )?,
        SessionCommand::SubmitAction(c) => {
            let action = PendingAction {
                action_id: c.action_id,
                player_id: c.player_id,
                campaign_id: c.campaign_id,
                action_type: c.action_type.clone(),
                payload: c.payload.clone(),
                submitted_at: clock.now(),
            };
            session.submit_action(action, correlation_id, clock)?;
        }
        SessionCommand::RecordActionResult(c) => {
            session.record_action_result(c.result.clone(), correlation_id, clock)?;
        }
        SessionCommand::ChangeRuntimeFlags(c) => {
            session.change_runtime_flags(c.changes.clone(), correlation_id, clock)?;
        }
    }

    persist(session, version_before, repo).await
}
