//! The runtime of one open session.
//!
//! A command flows through the runtime in four steps: the actor's authority
//! is checked, the session aggregate validates and applies it, the applied
//! events are turned into broadcasts, and a submitted action is routed to
//! the GM (or queued while the GM is away).

use std::sync::Arc;

use chrono::Duration;
use tabletop_authority::authority::{FlushReport, GmAuthority, OperationCategory, RouteOutcome};
use tabletop_authority::queue::{ActionPriority, ActionQueueOperation, QueuedAction};
use tabletop_authority::status::GmConnectionStatus;
use tabletop_broadcast::filter::filter_state_for_player;
use tabletop_broadcast::{BroadcastTarget, StateBroadcaster};
use tabletop_core::aggregate::AggregateRoot;
use tabletop_core::clock::Clock;
use tabletop_core::command::Command;
use tabletop_core::error::DomainError;
use tabletop_core::integrity::{StateHash, StateSummary, hash_state};
use tabletop_core::membership::CampaignDirectory;
use tabletop_core::repository::EventRepository;
use tabletop_session::application::command_handlers::{SessionCommandResult, handle_command};
use tabletop_session::application::query_handlers::{SessionStateView, get_session_state};
use tabletop_session::domain::aggregates::GameSession;
use tabletop_session::domain::commands::{SessionCommand, SubmitAction};
use tabletop_session::domain::events::{SessionEvent, SessionEventKind};
use tabletop_session::domain::state::PendingAction;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::sink::TransportGmSink;

/// One session's aggregate, GM authority and broadcaster.
pub struct SessionRuntime {
    session: GameSession,
    authority: GmAuthority,
    broadcaster: StateBroadcaster,
    gm_sink: TransportGmSink,
    directory: Arc<dyn CampaignDirectory>,
    repository: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRuntime")
            .field("session_id", &self.session.id)
            .field("version", &self.session.state().state_version)
            .field("authority", &self.authority)
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}

fn category_of(command: &SessionCommand) -> OperationCategory {
    match command {
        SessionCommand::JoinPlayer(_)
        | SessionCommand::SetPlayerPermissions(_)
        | SessionCommand::RecordInventoryChange(_) => OperationCategory::PlayerManagement,
        SessionCommand::RecordActionResult(_) | SessionCommand::SubmitAction(_) => {
            OperationCategory::MessageRouting
        }
        SessionCommand::LoadMap(_)
        | SessionCommand::ApplyMapUpdate(_)
        | SessionCommand::StartEncounter(_)
        | SessionCommand::ApplyEncounterUpdate(_)
        | SessionCommand::EndEncounter(_)
        | SessionCommand::ChangeRuntimeFlags(_) => OperationCategory::SessionControl,
    }
}

impl SessionRuntime {
    /// Wraps a started (or reconstituted) session.
    #[must_use]
    pub fn new(session: GameSession, context: &EngineContext) -> Self {
        let session_id = session.id;
        Self {
            authority: GmAuthority::new(session_id, session.gm_id()),
            broadcaster: StateBroadcaster::new(
                session_id,
                context.config.broadcaster,
                Arc::clone(&context.transport),
                Arc::clone(&context.clock),
            ),
            gm_sink: TransportGmSink::new(
                session_id,
                Arc::clone(&context.transport),
                Arc::clone(&context.clock),
            ),
            session,
            directory: Arc::clone(&context.directory),
            repository: Arc::clone(&context.repository),
            clock: Arc::clone(&context.clock),
        }
    }

    /// The session's identifier.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    /// The session aggregate.
    #[must_use]
    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// The session's GM authority.
    #[must_use]
    pub fn authority(&self) -> &GmAuthority {
        &self.authority
    }

    /// The session's broadcaster.
    #[must_use]
    pub fn broadcaster(&self) -> &StateBroadcaster {
        &self.broadcaster
    }

    /// Returns the session's current state, hash and version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the state cannot be hashed.
    pub fn state_view(&self) -> Result<SessionStateView, DomainError> {
        get_session_state(&self.session)
    }

    /// The GM and every joined player.
    #[must_use]
    pub fn participants(&self) -> Vec<Uuid> {
        let state = self.session.state();
        std::iter::once(state.gm_id)
            .chain(state.player_permissions.keys().copied())
            .collect()
    }

    fn authorize(&self, actor_id: Uuid, command: &SessionCommand) -> Result<(), DomainError> {
        if command.requires_gm() {
            return self
                .authority
                .authorize(actor_id, command.session_id(), category_of(command));
        }
        let subject = match command {
            SessionCommand::JoinPlayer(c) => c.player_id,
            SessionCommand::SubmitAction(c) => c.player_id,
            _ => actor_id,
        };
        if subject != actor_id || command.session_id() != self.session.id {
            debug!(%actor_id, %subject, "actor may not act for another player");
            return Err(DomainError::Unauthorized {
                actor_id,
                session_id: command.session_id(),
            });
        }
        Ok(())
    }

    /// Runs `command` on behalf of `actor_id` and broadcasts its effects. A
    /// submitted action is routed to the GM at normal priority.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Unauthorized` if the actor may not issue the
    /// command, and any error from the command handler. On a version
    /// conflict the actor is sent the authoritative state before the error
    /// is returned.
    pub async fn execute(
        &mut self,
        actor_id: Uuid,
        command: SessionCommand,
    ) -> Result<SessionCommandResult, DomainError> {
        self.run(actor_id, command, ActionPriority::Normal).await
    }

    /// Records a player's action and routes it to the GM at `priority`.
    ///
    /// # Errors
    ///
    /// See [`SessionRuntime::execute`].
    pub async fn submit_player_action(
        &mut self,
        command: SubmitAction,
        priority: ActionPriority,
    ) -> Result<SessionCommandResult, DomainError> {
        self.run(command.player_id, SessionCommand::SubmitAction(command), priority)
            .await
    }

    #[instrument(
        skip(self, command),
        fields(session_id = %self.session.id, command_type = command.command_type())
    )]
    async fn run(
        &mut self,
        actor_id: Uuid,
        command: SessionCommand,
        priority: ActionPriority,
    ) -> Result<SessionCommandResult, DomainError> {
        self.authorize(actor_id, &command)?;
        let version_before = self.session.version();

        let outcome = handle_command(
            &command,
            &mut self.session,
            self.directory.as_ref(),
            self.clock.as_ref(),
            self.repository.as_ref(),
        )
        .await;

        match outcome {
            Ok(result) => {
                for event in &result.events {
                    self.broadcast_event(event, priority);
                }
                Ok(result)
            }
            Err(error) => {
                if error.is_version_conflict() {
                    info!(%actor_id, %error, "resynchronizing client after version conflict");
                    self.broadcaster
                        .broadcast_full_state(actor_id, self.session.state());
                } else if self.session.version() > version_before {
                    warn!(%error, "session changed but was not persisted; resynchronizing everyone");
                    self.resync_all();
                }
                Err(error)
            }
        }
    }

    fn resync_all(&self) {
        let state = self.session.state();
        for player_id in self.participants() {
            self.broadcaster.broadcast_full_state(player_id, state);
        }
    }

    fn route_to_gm(&mut self, action: PendingAction, priority: ActionPriority) -> RouteOutcome {
        let action_id = action.action_id;
        let outcome =
            self.authority
                .route_action(action, priority, self.clock.as_ref(), &self.gm_sink);
        debug!(session_id = %self.session.id, %action_id, ?outcome, "routed action to gm");
        outcome
    }

    fn broadcast_event(&mut self, event: &SessionEvent, priority: ActionPriority) {
        match &event.kind {
            SessionEventKind::SessionStarted(_) => {}
            SessionEventKind::PlayerJoined(e) => {
                self.broadcaster
                    .broadcast_full_state(e.player_id, self.session.state());
            }
            SessionEventKind::PlayerPermissionsChanged(e) => {
                self.broadcaster
                    .broadcast_full_state(e.player_id, self.session.state());
            }
            SessionEventKind::MapUpdated(e)
                if e.update.revealed_areas.is_empty()
                    && e.update.tokens.iter().all(|token| !token.hidden) =>
            {
                self.broadcaster
                    .broadcast_map_update(e.update.clone(), BroadcastTarget::All);
            }
            // Reveals and hidden tokens change what each player may see.
            SessionEventKind::MapLoaded(_)
            | SessionEventKind::MapUpdated(_)
            | SessionEventKind::EncounterStarted(_)
            | SessionEventKind::EncounterEnded(_) => self.resync_all(),
            SessionEventKind::EncounterUpdated(e) => {
                self.broadcaster
                    .broadcast_encounter_update(e.update.clone(), BroadcastTarget::All);
            }
            SessionEventKind::InventoryChanged(e) => {
                self.broadcaster.broadcast_inventory_change(
                    e.change.character_id,
                    e.player_id,
                    e.change.clone(),
                );
            }
            SessionEventKind::ActionSubmitted(e) => {
                self.route_to_gm(e.action.clone(), priority);
            }
            SessionEventKind::ActionResolved(e) => {
                self.broadcaster
                    .broadcast_action_result(e.result.clone(), BroadcastTarget::All);
            }
            SessionEventKind::RuntimeFlagsChanged(e) => {
                self.broadcaster
                    .broadcast_runtime_state_change(e.changes.clone());
            }
        }
    }

    /// Records that the GM connected, delivers every queued action to them
    /// in order and sends them the full state.
    pub fn gm_connected(&mut self) -> FlushReport {
        let report = self
            .authority
            .observe_connected(self.clock.as_ref(), &self.gm_sink);
        self.broadcaster
            .broadcast_full_state(self.authority.gm_id(), self.session.state());
        report
    }

    /// Records that the GM disconnected.
    pub fn gm_disconnected(&mut self) {
        self.authority.observe_disconnected(self.clock.as_ref());
    }

    /// Records that the GM's connection is being re-established.
    pub fn gm_reconnecting(&mut self) {
        self.authority.observe_reconnecting(self.clock.as_ref());
    }

    /// Returns the GM's connection status.
    pub fn gm_status(&mut self) -> GmConnectionStatus {
        self.authority.check_status(self.clock.as_ref())
    }

    /// Applies a queue operation issued by `actor_id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Unauthorized` unless the actor is the GM, and
    /// `DomainError::Validation` when re-prioritizing an unknown action.
    pub fn apply_queue_operation(
        &mut self,
        actor_id: Uuid,
        operation: ActionQueueOperation,
    ) -> Result<Vec<QueuedAction>, DomainError> {
        self.authority
            .authorize(actor_id, self.session.id, OperationCategory::Infrastructure)?;
        self.authority
            .apply_operation(operation, self.clock.as_ref(), &self.gm_sink)
    }

    /// Drops queued actions older than `max_age`.
    pub fn remove_stale_actions(&mut self, max_age: Duration) -> Vec<QueuedAction> {
        self.authority.remove_stale(max_age, self.clock.as_ref())
    }

    /// Compares the hash a player reports for their view of the session with
    /// the server's. On a mismatch the player is sent the authoritative
    /// state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the state cannot be hashed.
    pub fn verify_client_state(
        &self,
        player_id: Uuid,
        client_hash: &StateHash,
    ) -> Result<bool, DomainError> {
        let view = filter_state_for_player(self.session.state(), player_id);
        let server_hash = hash_state(&view)?;
        if &server_hash == client_hash {
            return Ok(true);
        }
        warn!(
            session_id = %self.session.id,
            %player_id,
            client_hash = %client_hash,
            server_hash = %server_hash,
            server_state = %view.summary(),
            "client state diverged; resynchronizing"
        );
        self.broadcaster
            .broadcast_full_state(player_id, self.session.state());
        Ok(false)
    }

    /// Sends every queued broadcast now.
    pub fn flush(&self) {
        self.broadcaster.flush();
    }

    /// Flushes and stops batching. Called when the session closes.
    pub fn dispose(&self) {
        self.broadcaster.dispose();
    }
}
