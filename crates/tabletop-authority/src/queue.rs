//! Per-session queue of player actions awaiting the GM.
//!
//! Entries are kept in delivery order: higher priority first, and arrival
//! order among equal priorities.

use std::cmp::Reverse;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tabletop_core::error::DomainError;
use tabletop_session::domain::state::PendingAction;
use uuid::Uuid;

const QUEUE: &str = "ActionQueue";

/// Delivery priority of a queued action.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    /// Delivered last.
    Low,
    /// The default priority.
    #[default]
    Normal,
    /// Delivered before normal actions.
    High,
    /// Delivered first.
    Urgent,
}

/// An action held while the GM cannot receive it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    /// The held action.
    pub action: PendingAction,
    /// Current delivery priority.
    pub priority: ActionPriority,
    /// When the action entered the queue.
    pub queued_at: DateTime<Utc>,
    #[serde(skip)]
    sequence: u64,
}

impl QueuedAction {
    fn order_key(&self) -> (Reverse<ActionPriority>, u64) {
        (Reverse(self.priority), self.sequence)
    }
}

/// An operation on an [`ActionQueue`].
#[derive(Debug, Clone)]
pub enum ActionQueueOperation {
    /// Append an action.
    QueueAction {
        /// The action to hold.
        action: PendingAction,
        /// Its delivery priority.
        priority: ActionPriority,
        /// When it was queued.
        queued_at: DateTime<Utc>,
    },
    /// Take every entry, in delivery order.
    FlushQueue,
    /// Drop every entry.
    ClearQueue,
    /// Change one entry's priority.
    UpdatePriority {
        /// The queued action.
        action_id: Uuid,
        /// Its new priority.
        priority: ActionPriority,
    },
    /// Drop entries queued more than `max_age` before `now`.
    RemoveStale {
        /// Reference time.
        now: DateTime<Utc>,
        /// Maximum age an entry may reach.
        max_age: Duration,
    },
}

impl ActionQueueOperation {
    /// Returns the operation's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::QueueAction { .. } => "queue_action",
            Self::FlushQueue => "flush_queue",
            Self::ClearQueue => "clear_queue",
            Self::UpdatePriority { .. } => "update_priority",
            Self::RemoveStale { .. } => "remove_stale",
        }
    }
}

/// Priority-ordered holding area for player actions.
#[derive(Debug, Clone, Default)]
pub struct ActionQueue {
    entries: Vec<QueuedAction>,
    next_sequence: u64,
}

impl ActionQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of held actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Held actions in delivery order.
    #[must_use]
    pub fn entries(&self) -> &[QueuedAction] {
        &self.entries
    }

    fn reorder(&mut self) {
        self.entries.sort_by_key(QueuedAction::order_key);
    }

    /// Holds `action` and returns its position in delivery order.
    pub fn push(
        &mut self,
        action: PendingAction,
        priority: ActionPriority,
        queued_at: DateTime<Utc>,
    ) -> usize {
        let action_id = action.action_id;
        self.entries.push(QueuedAction {
            action,
            priority,
            queued_at,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
        self.reorder();
        self.entries
            .iter()
            .position(|entry| entry.action.action_id == action_id)
            .unwrap_or(self.entries.len() - 1)
    }

    /// Removes and returns every entry in delivery order.
    pub fn drain(&mut self) -> Vec<QueuedAction> {
        std::mem::take(&mut self.entries)
    }

    /// Changes the priority of a held action. Entries that end up with equal
    /// priority keep their arrival order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the action is not queued.
    pub fn update_priority(
        &mut self,
        action_id: Uuid,
        priority: ActionPriority,
    ) -> Result<(), DomainError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.action.action_id == action_id)
            .ok_or_else(|| {
                DomainError::validation(QUEUE, "action_id", format!("{action_id} is not queued"))
            })?;
        entry.priority = priority;
        self.reorder();
        Ok(())
    }

    /// Removes and returns entries queued more than `max_age` before `now`.
    pub fn remove_stale(&mut self, now: DateTime<Utc>, max_age: Duration) -> Vec<QueuedAction> {
        let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| now - entry.queued_at > max_age);
        self.entries = fresh;
        stale
    }

    /// Applies one operation and returns the entries it removed from the
    /// queue (flushed, cleared or stale).
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when updating the priority of an
    /// action that is not queued.
    pub fn apply_operation(
        &mut self,
        operation: ActionQueueOperation,
    ) -> Result<Vec<QueuedAction>, DomainError> {
        match operation {
            ActionQueueOperation::QueueAction {
                action,
                priority,
                queued_at,
            } => {
                self.push(action, priority, queued_at);
                Ok(Vec::new())
            }
            ActionQueueOperation::FlushQueue | ActionQueueOperation::ClearQueue => {
                Ok(self.drain())
            }
            ActionQueueOperation::UpdatePriority {
                action_id,
                priority,
            } => {
                self.update_priority(action_id, priority)?;
                Ok(Vec::new())
            }
            ActionQueueOperation::RemoveStale { now, max_age } => {
                Ok(self.remove_stale(now, max_age))
            }
        }
    }
}
