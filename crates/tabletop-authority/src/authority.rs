//! GM authority over one session.
//!
//! [`GmAuthority`] records the GM's connection transitions and decides
//! whether a player action is forwarded immediately or held in the
//! session's [`ActionQueue`] until the GM is back.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tabletop_core::clock::Clock;
use tabletop_core::error::DomainError;
use tabletop_core::transport::TransportError;
use tabletop_session::domain::state::PendingAction;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::queue::{ActionPriority, ActionQueue, ActionQueueOperation, QueuedAction};
use crate::status::{GmConnectionState, GmConnectionStatus};

/// Delivers player actions to a connected GM.
pub trait GmActionSink: Send + Sync {
    /// Hands one action to the GM.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the action could not be handed off.
    fn deliver(&self, gm_id: Uuid, action: &PendingAction) -> Result<(), TransportError>;
}

/// Infrastructure-level operations guarded by GM identity alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    /// Opening, pausing or closing the session.
    SessionControl,
    /// Admitting, removing or re-permissioning players.
    PlayerManagement,
    /// Housekeeping such as sweeping stale actions.
    Infrastructure,
    /// Steering who receives which messages.
    MessageRouting,
}

impl OperationCategory {
    /// Returns the category's name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionControl => "session_control",
            Self::PlayerManagement => "player_management",
            Self::Infrastructure => "infrastructure",
            Self::MessageRouting => "message_routing",
        }
    }
}

/// What happened to a routed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Delivered to the connected GM.
    Forwarded,
    /// Held in the queue at the given delivery position.
    Queued {
        /// Zero-based position in delivery order.
        position: usize,
    },
}

/// Outcome of flushing the queue to a GM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Actions handed to the GM, in delivery order.
    pub delivered: Vec<Uuid>,
    /// Actions the sink refused. They are not re-queued.
    pub failed: Vec<Uuid>,
}

/// GM connection tracker and action queue for one session.
#[derive(Debug)]
pub struct GmAuthority {
    session_id: Uuid,
    gm_id: Uuid,
    status: Option<GmConnectionStatus>,
    queue: ActionQueue,
}

impl GmAuthority {
    /// Creates the authority for `gm_id` over `session_id`. No connection
    /// status exists until the first check or transition.
    #[must_use]
    pub fn new(session_id: Uuid, gm_id: Uuid) -> Self {
        Self {
            session_id,
            gm_id,
            status: None,
            queue: ActionQueue::new(),
        }
    }

    /// The session this authority guards.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The session's GM.
    #[must_use]
    pub fn gm_id(&self) -> Uuid {
        self.gm_id
    }

    /// Actions currently held, in delivery order.
    #[must_use]
    pub fn queued_actions(&self) -> &[QueuedAction] {
        self.queue.entries()
    }

    fn status_mut(&mut self, clock: &dyn Clock) -> &mut GmConnectionStatus {
        self.status
            .get_or_insert_with(|| GmConnectionStatus::initial(clock.now()))
    }

    /// Returns the GM's connection status, creating it as disconnected on
    /// first use.
    pub fn check_status(&mut self, clock: &dyn Clock) -> GmConnectionStatus {
        self.status_mut(clock).clone()
    }

    /// Returns `true` if the GM is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(GmConnectionStatus::is_connected)
    }

    fn transition(&mut self, state: GmConnectionState, clock: &dyn Clock) {
        let session_id = self.session_id;
        let status = self.status_mut(clock);
        if status.state != state {
            info!(
                %session_id,
                from = %status.state,
                to = %state,
                "gm connection state changed"
            );
            status.state = state;
            status.changed_at = clock.now();
        }
    }

    fn sync_count(&mut self, clock: &dyn Clock) {
        let len = self.queue.len();
        self.status_mut(clock).queued_action_count = len;
    }

    fn deliver_all(&self, entries: Vec<QueuedAction>, sink: &dyn GmActionSink) -> FlushReport {
        let mut report = FlushReport::default();
        for entry in entries {
            let action_id = entry.action.action_id;
            match sink.deliver(self.gm_id, &entry.action) {
                Ok(()) => report.delivered.push(action_id),
                Err(error) => {
                    warn!(
                        session_id = %self.session_id,
                        %action_id,
                        %error,
                        "failed to deliver queued action to gm"
                    );
                    report.failed.push(action_id);
                }
            }
        }
        report
    }

    /// Records that the GM connected and flushes the queue to them.
    pub fn observe_connected(&mut self, clock: &dyn Clock, sink: &dyn GmActionSink) -> FlushReport {
        self.transition(GmConnectionState::Connected, clock);
        let entries = self.queue.drain();
        self.sync_count(clock);
        if entries.is_empty() {
            return FlushReport::default();
        }
        let report = self.deliver_all(entries, sink);
        info!(
            session_id = %self.session_id,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "flushed queued actions to gm"
        );
        report
    }

    /// Records that the GM disconnected. Queued actions are kept.
    pub fn observe_disconnected(&mut self, clock: &dyn Clock) {
        self.transition(GmConnectionState::Disconnected, clock);
    }

    /// Records that the GM's connection is being re-established.
    pub fn observe_reconnecting(&mut self, clock: &dyn Clock) {
        self.transition(GmConnectionState::Reconnecting, clock);
    }

    fn enqueue(
        &mut self,
        action: PendingAction,
        priority: ActionPriority,
        clock: &dyn Clock,
    ) -> RouteOutcome {
        let action_id = action.action_id;
        let position = self.queue.push(action, priority, clock.now());
        self.sync_count(clock);
        debug!(
            session_id = %self.session_id,
            %action_id,
            position,
            queued = self.queue.len(),
            "queued action for gm"
        );
        RouteOutcome::Queued { position }
    }

    /// Forwards `action` to the GM if connected, otherwise queues it. An
    /// action the sink refuses is queued as well.
    pub fn route_action(
        &mut self,
        action: PendingAction,
        priority: ActionPriority,
        clock: &dyn Clock,
        sink: &dyn GmActionSink,
    ) -> RouteOutcome {
        if !self.check_status(clock).is_connected() {
            return self.enqueue(action, priority, clock);
        }
        match sink.deliver(self.gm_id, &action) {
            Ok(()) => RouteOutcome::Forwarded,
            Err(error) => {
                warn!(
                    session_id = %self.session_id,
                    action_id = %action.action_id,
                    %error,
                    "forwarding action to gm failed; queueing"
                );
                self.enqueue(action, priority, clock)
            }
        }
    }

    /// Drops queued actions older than `max_age`.
    pub fn remove_stale(&mut self, max_age: Duration, clock: &dyn Clock) -> Vec<QueuedAction> {
        let removed = self.queue.remove_stale(clock.now(), max_age);
        self.sync_count(clock);
        if !removed.is_empty() {
            info!(
                session_id = %self.session_id,
                removed = removed.len(),
                "removed stale queued actions"
            );
        }
        removed
    }

    /// Applies a queue operation and keeps the queued-action count in step.
    /// `FlushQueue` delivers to the GM only while connected; otherwise the
    /// queue is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when updating the priority of an
    /// action that is not queued.
    pub fn apply_operation(
        &mut self,
        operation: ActionQueueOperation,
        clock: &dyn Clock,
        sink: &dyn GmActionSink,
    ) -> Result<Vec<QueuedAction>, DomainError> {
        debug!(session_id = %self.session_id, operation = operation.name(), "applying queue operation");
        if matches!(operation, ActionQueueOperation::FlushQueue) {
            if !self.is_connected() {
                return Ok(Vec::new());
            }
            let entries = self.queue.drain();
            self.sync_count(clock);
            self.deliver_all(entries.clone(), sink);
            return Ok(entries);
        }
        let removed = self.queue.apply_operation(operation)?;
        self.sync_count(clock);
        Ok(removed)
    }

    /// Checks that `actor_id` holds GM authority over `session_id` for an
    /// infrastructure-level operation. Only identity and session are
    /// compared; the operation's content is not inspected.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Unauthorized` on any mismatch.
    pub fn authorize(
        &self,
        actor_id: Uuid,
        session_id: Uuid,
        category: OperationCategory,
    ) -> Result<(), DomainError> {
        if session_id != self.session_id || actor_id != self.gm_id {
            debug!(
                %actor_id,
                %session_id,
                category = category.as_str(),
                "gm authority denied"
            );
            return Err(DomainError::Unauthorized {
                actor_id,
                session_id,
            });
        }
        Ok(())
    }
}
