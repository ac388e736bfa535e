//! Test campaign directory: an in-memory `CampaignDirectory`.

use std::collections::HashMap;

use async_trait::async_trait;
use tabletop_core::error::DomainError;
use tabletop_core::membership::{CampaignDirectory, EntityKind, EntityRef};
use uuid::Uuid;

/// A campaign directory backed by a fixed ownership table. Entities that were
/// never registered resolve to `None`.
#[derive(Debug, Default, Clone)]
pub struct StaticCampaignDirectory {
    owners: HashMap<EntityRef, Uuid>,
}

impl StaticCampaignDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` of `kind` as owned by `campaign_id`.
    #[must_use]
    pub fn with(mut self, kind: EntityKind, id: Uuid, campaign_id: Uuid) -> Self {
        self.owners.insert(EntityRef::new(kind, id), campaign_id);
        self
    }
}

#[async_trait]
impl CampaignDirectory for StaticCampaignDirectory {
    async fn campaign_of(&self, entity: EntityRef) -> Result<Option<Uuid>, DomainError> {
        Ok(self.owners.get(&entity).copied())
    }
}
