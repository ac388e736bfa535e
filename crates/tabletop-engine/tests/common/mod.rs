//! Shared helpers for engine integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tabletop_broadcast::BroadcasterConfig;
use tabletop_core::clock::Clock;
use tabletop_core::membership::{CampaignDirectory, EntityKind};
use tabletop_core::repository::EventRepository;
use tabletop_core::transport::Transport;
use tabletop_engine::hub::SessionHandle;
use tabletop_engine::{EngineConfig, EngineContext, SessionHub};
use tabletop_session::domain::commands::{
    ChangeRuntimeFlags, JoinPlayer, SessionCommand, StartSession, SubmitAction,
};
use tabletop_test_support::{FixedClock, RecordingEventRepository, RecordingTransport, StaticCampaignDirectory};
use uuid::Uuid;

/// A clock tests can move forward.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Mutex::new(FixedClock::standard().0))
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// One campaign with a GM, two players and a few campaign-owned entities.
pub struct Table {
    pub session_id: Uuid,
    pub campaign_id: Uuid,
    pub gm_id: Uuid,
    pub alice: Uuid,
    pub bob: Uuid,
    pub character_id: Uuid,
    pub item_id: Uuid,
    pub foreign_item_id: Uuid,
    pub transport: Arc<RecordingTransport>,
    pub repository: Arc<RecordingEventRepository>,
    pub clock: Arc<ManualClock>,
    pub hub: SessionHub,
}

/// Configuration that delivers every broadcast as soon as it is made.
pub fn immediate() -> EngineConfig {
    EngineConfig {
        broadcaster: BroadcasterConfig::immediate(),
        ..EngineConfig::default()
    }
}

pub fn table(config: EngineConfig) -> Table {
    table_with_history(config, Vec::new())
}

pub fn table_with_history(
    config: EngineConfig,
    history: Vec<tabletop_core::repository::StoredEvent>,
) -> Table {
    let campaign_id = Uuid::new_v4();
    let character_id = Uuid::new_v4();
    let item_id = Uuid::new_v4();
    let foreign_item_id = Uuid::new_v4();
    let directory = StaticCampaignDirectory::new()
        .with(EntityKind::Character, character_id, campaign_id)
        .with(EntityKind::Item, item_id, campaign_id)
        .with(EntityKind::Item, foreign_item_id, Uuid::new_v4());
    let transport = Arc::new(RecordingTransport::new());
    let repository = Arc::new(RecordingEventRepository::new(history));
    let clock = Arc::new(ManualClock::new());
    let context = EngineContext::new(
        config,
        Arc::new(directory) as Arc<dyn CampaignDirectory>,
        Arc::clone(&repository) as Arc<dyn EventRepository>,
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    Table {
        session_id: Uuid::new_v4(),
        campaign_id,
        gm_id: Uuid::new_v4(),
        alice: Uuid::new_v4(),
        bob: Uuid::new_v4(),
        character_id,
        item_id,
        foreign_item_id,
        transport,
        repository,
        clock,
        hub: SessionHub::new(context),
    }
}

impl Table {
    pub fn start_command(&self) -> StartSession {
        StartSession {
            correlation_id: Uuid::new_v4(),
            session_id: self.session_id,
            campaign_id: self.campaign_id,
            gm_id: self.gm_id,
        }
    }

    pub async fn open(&self) -> SessionHandle {
        self.hub.open_session(&self.start_command()).await.unwrap()
    }

    pub fn join(&self, player_id: Uuid) -> SessionCommand {
        SessionCommand::JoinPlayer(JoinPlayer {
            correlation_id: Uuid::new_v4(),
            session_id: self.session_id,
            player_id,
            controlled_characters: vec![self.character_id],
        })
    }

    pub fn submit(&self, player_id: Uuid, action_type: &str) -> SubmitAction {
        SubmitAction {
            correlation_id: Uuid::new_v4(),
            session_id: self.session_id,
            action_id: Uuid::new_v4(),
            player_id,
            campaign_id: self.campaign_id,
            action_type: action_type.to_owned(),
            payload: json!({ "roll": 12 }),
        }
    }

    pub fn flags(&self, expected_version: Option<&str>, key: &str, value: Value) -> SessionCommand {
        let mut changes = Map::new();
        changes.insert(key.to_owned(), value);
        SessionCommand::ChangeRuntimeFlags(ChangeRuntimeFlags {
            correlation_id: Uuid::new_v4(),
            session_id: self.session_id,
            expected_version: expected_version.map(str::to_owned),
            changes,
        })
    }

    /// Opens the session and joins Alice and Bob.
    pub async fn seated(&self) -> SessionHandle {
        let handle = self.open().await;
        {
            let mut runtime = handle.lock().await;
            runtime.execute(self.alice, self.join(self.alice)).await.unwrap();
            runtime.execute(self.bob, self.join(self.bob)).await.unwrap();
        }
        self.transport.clear();
        handle
    }
}
