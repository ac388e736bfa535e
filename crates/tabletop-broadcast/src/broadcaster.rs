//! The per-session state broadcaster.
//!
//! With batching enabled, broadcasts are queued and delivered in merged
//! batches. A batch is flushed when the queue reaches `max_batch_size`, or
//! `batch_delay` after the first broadcast of the batch was queued,
//! whichever comes first. The delay timer is a single tokio task armed by
//! the first queued broadcast and cancelled by any flush.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tabletop_core::clock::Clock;
use tabletop_core::transport::Transport;
use tabletop_session::domain::deltas::{ActionMessage, EncounterUpdate, InventoryChange, MapUpdate};
use tabletop_session::domain::state::CompleteSessionState;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BroadcasterConfig;
use crate::filter::filter_state_for_player;
use crate::merge::coalesce;
use crate::message::{BroadcastTarget, OutboundMessage, QueuedBroadcast};

#[derive(Debug, Default)]
struct BatchState {
    queue: Vec<QueuedBroadcast>,
    timer: Option<JoinHandle<()>>,
    /// Identifies the currently armed timer; a timer that wakes up after
    /// being superseded does nothing.
    generation: u64,
    disposed: bool,
}

impl BatchState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
    }

    fn take(&mut self) -> Vec<QueuedBroadcast> {
        self.cancel_timer();
        std::mem::take(&mut self.queue)
    }
}

struct Shared {
    session_id: Uuid,
    config: BroadcasterConfig,
    transport: Arc<dyn Transport>,
    batch: Mutex<BatchState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BatchState> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends one message to its target. Failures are logged and swallowed.
    fn deliver(&self, entry: &QueuedBroadcast) -> usize {
        let envelope = entry
            .message
            .envelope(self.session_id, entry.timestamp.timestamp_millis());
        match &entry.target {
            BroadcastTarget::All => match self.transport.send_to_session(self.session_id, &envelope) {
                Ok(()) => 1,
                Err(error) => {
                    warn!(
                        session_id = %self.session_id,
                        event = envelope.event,
                        %error,
                        "session broadcast failed"
                    );
                    0
                }
            },
            BroadcastTarget::Players(players) => {
                if players.is_empty() {
                    debug!(session_id = %self.session_id, event = envelope.event, "broadcast has no recipients");
                }
                let mut sent = 0;
                for player_id in players {
                    match self.transport.send_to_player(*player_id, &envelope) {
                        Ok(()) => sent += 1,
                        Err(error) => warn!(
                            session_id = %self.session_id,
                            %player_id,
                            event = envelope.event,
                            %error,
                            "player broadcast failed"
                        ),
                    }
                }
                sent
            }
        }
    }

    fn send_batch(&self, entries: Vec<QueuedBroadcast>) {
        if entries.is_empty() {
            return;
        }
        let queued = entries.len();
        let merged = coalesce(entries);
        let delivered: usize = merged.iter().map(|entry| self.deliver(entry)).sum();
        debug!(
            session_id = %self.session_id,
            queued,
            messages = merged.len(),
            delivered,
            "flushed broadcast batch"
        );
    }

    fn flush_from_timer(&self, generation: u64) {
        let entries = {
            let mut batch = self.lock();
            if batch.generation != generation {
                return;
            }
            batch.timer = None;
            batch.generation += 1;
            std::mem::take(&mut batch.queue)
        };
        self.send_batch(entries);
    }
}

/// Batches, filters and fans out session updates for one session.
///
/// Dropping the broadcaster disposes it, so queued broadcasts are sent
/// rather than lost.
pub struct StateBroadcaster {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for StateBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBroadcaster")
            .field("session_id", &self.shared.session_id)
            .field("config", &self.shared.config)
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

impl StateBroadcaster {
    /// Creates the broadcaster of `session_id`.
    #[must_use]
    pub fn new(
        session_id: Uuid,
        config: BroadcasterConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                session_id,
                config,
                transport,
                batch: Mutex::new(BatchState::default()),
            }),
            clock,
        }
    }

    /// The session this broadcaster serves.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    /// Number of broadcasts waiting for the next flush.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    fn arm_timer(&self, batch: &mut BatchState) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            return false;
        };
        let shared = Arc::clone(&self.shared);
        let delay = self.shared.config.batch_delay;
        let generation = batch.generation;
        batch.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.flush_from_timer(generation);
        }));
        true
    }

    fn enqueue(&self, message: OutboundMessage, target: BroadcastTarget) {
        let entry = QueuedBroadcast {
            message,
            target,
            timestamp: self.clock.now(),
        };
        if !self.shared.config.enable_batching {
            self.shared.deliver(&entry);
            return;
        }

        let ready = {
            let mut batch = self.shared.lock();
            if batch.disposed {
                Err(entry)
            } else {
                batch.queue.push(entry);
                if batch.queue.len() >= self.shared.config.max_batch_size {
                    Ok(batch.take())
                } else if batch.timer.is_none() && !self.arm_timer(&mut batch) {
                    // Outside a runtime there is no timer to wait for.
                    Ok(batch.take())
                } else {
                    Ok(Vec::new())
                }
            }
        };
        match ready {
            Ok(entries) => self.shared.send_batch(entries),
            Err(entry) => {
                self.shared.deliver(&entry);
            }
        }
    }

    /// Sends `player_id` the snapshot they may see.
    pub fn broadcast_full_state(&self, player_id: Uuid, state: &CompleteSessionState) {
        let filtered = filter_state_for_player(state, player_id);
        self.enqueue(
            OutboundMessage::FullState(Box::new(filtered)),
            BroadcastTarget::player(player_id),
        );
    }

    /// Broadcasts a map delta.
    pub fn broadcast_map_update(&self, update: MapUpdate, target: BroadcastTarget) {
        self.enqueue(OutboundMessage::MapUpdate(update), target);
    }

    /// Broadcasts an encounter delta.
    pub fn broadcast_encounter_update(&self, update: EncounterUpdate, target: BroadcastTarget) {
        self.enqueue(OutboundMessage::EncounterUpdate(update), target);
    }

    /// Sends an inventory change to the player owning the character.
    pub fn broadcast_inventory_change(
        &self,
        character_id: Uuid,
        player_id: Uuid,
        change: InventoryChange,
    ) {
        self.enqueue(
            OutboundMessage::InventoryChange {
                character_id,
                change,
            },
            BroadcastTarget::player(player_id),
        );
    }

    /// Broadcasts the resolution of a player action.
    pub fn broadcast_action_result(&self, message: ActionMessage, target: BroadcastTarget) {
        self.enqueue(OutboundMessage::ActionResult(message), target);
    }

    /// Broadcasts changed runtime flags to the whole session.
    pub fn broadcast_runtime_state_change(&self, changes: Map<String, Value>) {
        self.enqueue(OutboundMessage::RuntimeState(changes), BroadcastTarget::All);
    }

    /// Sends everything queued now and cancels the delay timer.
    pub fn flush(&self) {
        let entries = self.shared.lock().take();
        self.shared.send_batch(entries);
    }

    /// Cancels the delay timer and performs a final flush. Broadcasts made
    /// afterwards are sent immediately. Disposing twice is a no-op.
    pub fn dispose(&self) {
        let entries = {
            let mut batch = self.shared.lock();
            if batch.disposed {
                return;
            }
            batch.disposed = true;
            batch.take()
        };
        info!(
            session_id = %self.shared.session_id,
            pending = entries.len(),
            "disposing state broadcaster"
        );
        self.shared.send_batch(entries);
    }
}

impl Drop for StateBroadcaster {
    fn drop(&mut self) {
        self.dispose();
    }
}
