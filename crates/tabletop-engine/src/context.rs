//! Collaborators shared by every session runtime.

use std::sync::Arc;

use tabletop_core::clock::Clock;
use tabletop_core::membership::CampaignDirectory;
use tabletop_core::repository::EventRepository;
use tabletop_core::transport::Transport;

use crate::config::EngineConfig;

/// The engine's external collaborators and settings.
#[derive(Clone)]
pub struct EngineContext {
    /// Engine settings.
    pub config: EngineConfig,
    /// Campaign membership lookups for boundary checks.
    pub directory: Arc<dyn CampaignDirectory>,
    /// Durable event storage.
    pub repository: Arc<dyn EventRepository>,
    /// Outbound delivery to players and sessions.
    pub transport: Arc<dyn Transport>,
    /// Source of every timestamp.
    pub clock: Arc<dyn Clock>,
}

impl EngineContext {
    /// Creates a context.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        directory: Arc<dyn CampaignDirectory>,
        repository: Arc<dyn EventRepository>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            directory,
            repository,
            transport,
            clock,
        }
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
