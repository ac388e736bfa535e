//! Registry of open sessions.
//!
//! Each runtime sits behind its own `tokio::sync::Mutex`, so commands on
//! one session are applied one at a time while different sessions proceed
//! independently.

use std::collections::HashMap;
use std::sync::Arc;

use tabletop_core::error::DomainError;
use tabletop_session::application::command_handlers::{handle_start_session, reconstitute};
use tabletop_session::domain::commands::StartSession;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::runtime::SessionRuntime;

/// A shared handle to one open session.
pub type SessionHandle = Arc<Mutex<SessionRuntime>>;

/// Every open session of the engine.
#[derive(Debug)]
pub struct SessionHub {
    context: EngineContext,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new(context: EngineContext) -> Self {
        Self {
            context,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The hub's collaborators and settings.
    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Opens the session named by `command`.
    ///
    /// An already open session is returned as is. A session with stored
    /// history is rebuilt from it; otherwise the session is started.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if a stored session belongs to a
    /// different campaign or GM than the command names, and any error from
    /// loading, replaying or starting the session.
    #[instrument(skip(self, command), fields(session_id = %command.session_id))]
    pub async fn open_session(&self, command: &StartSession) -> Result<SessionHandle, DomainError> {
        if let Some(handle) = self.sessions.read().await.get(&command.session_id) {
            return Ok(Arc::clone(handle));
        }

        let history = self
            .context
            .repository
            .load_events(command.session_id)
            .await?;
        let session = if history.is_empty() {
            let (session, _) = handle_start_session(
                command,
                self.context.clock.as_ref(),
                self.context.repository.as_ref(),
            )
            .await?;
            info!(correlation_id = %command.correlation_id, "started session");
            session
        } else {
            let session = reconstitute(command.session_id, &history)?;
            if session.campaign_id() != command.campaign_id || session.gm_id() != command.gm_id {
                return Err(DomainError::validation(
                    "SessionHub",
                    "session_id",
                    "session exists for a different campaign or gm",
                ));
            }
            info!(
                correlation_id = %command.correlation_id,
                events = history.len(),
                "resumed session from history"
            );
            session
        };

        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(command.session_id)
            .or_insert_with(|| Arc::new(Mutex::new(SessionRuntime::new(session, &self.context))));
        Ok(Arc::clone(handle))
    }

    /// Returns the open session `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the session is not open.
    pub async fn session(&self, session_id: Uuid) -> Result<SessionHandle, DomainError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(DomainError::AggregateNotFound(session_id))
    }

    /// Identifiers of every open session.
    pub async fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().copied().collect()
    }

    /// Closes `session_id`, flushing its pending broadcasts.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the session is not open.
    pub async fn close_session(&self, session_id: Uuid) -> Result<(), DomainError> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(&session_id)
            .ok_or(DomainError::AggregateNotFound(session_id))?;
        handle.lock().await.dispose();
        info!(%session_id, "closed session");
        Ok(())
    }

    /// Drops queued actions older than the configured age from every open
    /// session. Returns how many were dropped.
    pub async fn sweep_stale_actions(&self) -> usize {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        let max_age = self.context.config.stale_action_age;
        let mut removed = 0;
        for handle in handles {
            removed += handle.lock().await.remove_stale_actions(max_age).len();
        }
        removed
    }
}
