//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict: the caller's base version is not the
    /// version the server is currently at.
    #[error(
        "version conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    VersionConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The version the caller believed was current.
        expected: String,
        /// The version the server is actually at.
        actual: String,
    },

    /// A field-level domain rule was violated.
    #[error("validation error on {aggregate}.{field}: {message}")]
    Validation {
        /// The aggregate type that rejected the value.
        aggregate: String,
        /// The offending field.
        field: String,
        /// Human-readable explanation.
        message: String,
    },

    /// A referenced entity lies outside the aggregate's campaign.
    #[error("boundary violation on {aggregate}: {entity} {entity_id} is outside the campaign")]
    BoundaryViolation {
        /// The aggregate type that rejected the reference.
        aggregate: String,
        /// The kind of entity referenced (item, token, character).
        entity: String,
        /// The referenced entity identifier.
        entity_id: Uuid,
    },

    /// A state snapshot could not be serialized for hashing.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The actor does not hold GM authority over the session.
    #[error("actor {actor_id} lacks GM authority over session {session_id}")]
    Unauthorized {
        /// The actor that attempted the operation.
        actor_id: Uuid,
        /// The session the operation targeted.
        session_id: Uuid,
    },

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Builds a `Validation` error for the given aggregate and field.
    pub fn validation(
        aggregate: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            aggregate: aggregate.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns `true` when the caller must refetch authoritative state rather
    /// than retry.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_aggregate_and_field() {
        let err = DomainError::validation("GameSession", "action_type", "is required");

        assert_eq!(
            err.to_string(),
            "validation error on GameSession.action_type: is required"
        );
    }

    #[test]
    fn test_is_version_conflict_only_for_conflicts() {
        let conflict = DomainError::VersionConflict {
            aggregate_id: Uuid::new_v4(),
            expected: "4".to_owned(),
            actual: "5".to_owned(),
        };

        assert!(conflict.is_version_conflict());
        assert!(!DomainError::Serialization("cycle".into()).is_version_conflict());
    }
}
