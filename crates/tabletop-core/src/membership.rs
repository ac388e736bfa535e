//! Campaign-membership collaborator.
//!
//! Sessions may only reference items, tokens and characters owned by their
//! own campaign. Ownership lives in the external document store; this module
//! defines the lookup seam and the resolved form that travels inside events.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Kind of a campaign-owned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// An inventory item.
    Item,
    /// A map token.
    Token,
    /// A character (player character or NPC).
    Character,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Item => "item",
            Self::Token => "token",
            Self::Character => "character",
        })
    }
}

/// A reference to a campaign-owned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identifier.
    pub id: Uuid,
}

impl EntityRef {
    /// Creates a reference.
    #[must_use]
    pub fn new(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

/// A reference together with the campaign the document store says owns it.
/// `campaign_id` is `None` when the entity is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    /// The referenced entity.
    pub entity: EntityRef,
    /// Owning campaign, if the entity exists.
    pub campaign_id: Option<Uuid>,
}

/// Document store lookup telling which campaign owns an entity.
#[async_trait]
pub trait CampaignDirectory: Send + Sync {
    /// Returns the campaign owning `entity`, or `None` if it does not exist.
    async fn campaign_of(&self, entity: EntityRef) -> Result<Option<Uuid>, DomainError>;
}

/// Resolves the owning campaign of every reference, in order.
///
/// # Errors
///
/// Propagates lookup failures from the directory.
pub async fn resolve_references(
    directory: &dyn CampaignDirectory,
    entities: &[EntityRef],
) -> Result<Vec<ResolvedReference>, DomainError> {
    let mut resolved = Vec::with_capacity(entities.len());
    for entity in entities {
        let campaign_id = directory.campaign_of(*entity).await?;
        resolved.push(ResolvedReference {
            entity: *entity,
            campaign_id,
        });
    }
    Ok(resolved)
}

/// Fails unless every entity in `required` was resolved to `campaign_id`.
///
/// # Errors
///
/// Returns `DomainError::BoundaryViolation` for the first entity that is
/// unresolved, unknown, or owned by another campaign.
pub fn ensure_within_campaign(
    aggregate: &str,
    campaign_id: Uuid,
    required: &[EntityRef],
    resolved: &[ResolvedReference],
) -> Result<(), DomainError> {
    for entity in required {
        let owner = resolved
            .iter()
            .find(|r| r.entity == *entity)
            .and_then(|r| r.campaign_id);
        if owner != Some(campaign_id) {
            return Err(DomainError::BoundaryViolation {
                aggregate: aggregate.to_owned(),
                entity: entity.kind.to_string(),
                entity_id: entity.id,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_within_campaign_accepts_owned_entities() {
        let campaign_id = Uuid::new_v4();
        let item = EntityRef::new(EntityKind::Item, Uuid::new_v4());
        let resolved = vec![ResolvedReference {
            entity: item,
            campaign_id: Some(campaign_id),
        }];

        assert!(ensure_within_campaign("GameSession", campaign_id, &[item], &resolved).is_ok());
    }

    #[test]
    fn test_ensure_within_campaign_rejects_foreign_unknown_and_unresolved() {
        let campaign_id = Uuid::new_v4();
        let foreign = EntityRef::new(EntityKind::Character, Uuid::new_v4());
        let unknown = EntityRef::new(EntityKind::Token, Uuid::new_v4());
        let unresolved = EntityRef::new(EntityKind::Item, Uuid::new_v4());
        let resolved = vec![
            ResolvedReference {
                entity: foreign,
                campaign_id: Some(Uuid::new_v4()),
            },
            ResolvedReference {
                entity: unknown,
                campaign_id: None,
            },
        ];

        for entity in [foreign, unknown, unresolved] {
            match ensure_within_campaign("GameSession", campaign_id, &[entity], &resolved) {
                Err(DomainError::BoundaryViolation {
                    entity: kind,
                    entity_id,
                    ..
                }) => {
                    assert_eq!(kind, entity.kind.to_string());
                    assert_eq!(entity_id, entity.id);
                }
                other => panic!("expected BoundaryViolation, got {other:?}"),
            }
        }
    }
}
