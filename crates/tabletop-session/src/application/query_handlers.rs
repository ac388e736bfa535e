//! Query handlers for the session context.
//!
//! Queries return read-only views of the authoritative state together with
//! its integrity hash, so clients can later prove which revision they hold.

use serde::Serialize;
use tabletop_core::aggregate::AggregateRoot;
use tabletop_core::error::DomainError;
use tabletop_core::integrity::{StateHash, hash_state};
use tabletop_core::repository::EventRepository;
use uuid::Uuid;

use crate::application::command_handlers;
use crate::domain::aggregates::GameSession;
use crate::domain::state::CompleteSessionState;

/// Read-only view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStateView {
    /// The session identifier.
    pub session_id: Uuid,
    /// Snapshot of the authoritative state.
    pub state: CompleteSessionState,
    /// Integrity hash of `state`.
    pub hash: StateHash,
    /// Aggregate version (number of applied events).
    pub version: i64,
}

/// Builds the view of an in-memory session.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if the state cannot be hashed.
pub fn get_session_state(session: &GameSession) -> Result<SessionStateView, DomainError> {
    let state = session.snapshot();
    let hash = hash_state(&state)?;
    Ok(SessionStateView {
        session_id: session.id,
        state,
        hash,
        version: session.version(),
    })
}

/// Rebuilds a session from its stored history and returns its view.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID.
/// Returns `DomainError::Infrastructure` if event loading or
/// deserialization fails.
pub async fn load_session_state(
    session_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<SessionStateView, DomainError> {
    let stored_events = repo.load_events(session_id).await?;
    let session = command_handlers::reconstitute(session_id, &stored_events)?;
    get_session_state(&session)
}
