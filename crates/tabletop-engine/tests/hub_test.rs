//! Integration tests for opening, resuming and closing sessions.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tabletop_authority::queue::ActionPriority;
use tabletop_broadcast::BroadcasterConfig;
use tabletop_core::aggregate::AggregateRoot;
use tabletop_core::error::DomainError;
use tabletop_engine::EngineConfig;
use uuid::Uuid;

#[tokio::test]
async fn test_opening_an_open_session_returns_the_same_runtime() {
    // Arrange
    let table = common::table(common::immediate());

    // Act
    let first = table.open().await;
    let second = table.open().await;

    // Assert
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(table.repository.appended_events().len(), 1);
    assert_eq!(table.hub.session_ids().await, vec![table.session_id]);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let table = common::table(common::immediate());

    let result = table.hub.session(table.session_id).await;

    assert!(matches!(result, Err(DomainError::AggregateNotFound(id)) if id == table.session_id));
}

#[tokio::test]
async fn test_session_is_resumed_from_stored_history() {
    // Arrange
    let original = common::table(common::immediate());
    let handle = original.seated().await;
    handle
        .lock()
        .await
        .execute(original.gm_id, original.flags(None, "paused", json!(true)))
        .await
        .unwrap();
    let history = original.repository.all_appended();
    let restarted = common::table_with_history(common::immediate(), history);
    let command = tabletop_session::domain::commands::StartSession {
        session_id: original.session_id,
        campaign_id: original.campaign_id,
        gm_id: original.gm_id,
        correlation_id: Uuid::new_v4(),
    };

    // Act
    let resumed = restarted.hub.open_session(&command).await.unwrap();

    // Assert
    let runtime = resumed.lock().await;
    assert_eq!(runtime.session().version(), 4);
    assert_eq!(runtime.session().state().state_version, "4");
    assert!(runtime.session().state().has_player(original.alice));
    assert_eq!(runtime.session().state().runtime["paused"], json!(true));
    assert!(restarted.repository.appended_events().is_empty());
}

#[tokio::test]
async fn test_resuming_with_another_gm_is_rejected() {
    let original = common::table(common::immediate());
    original.open().await;
    let restarted =
        common::table_with_history(common::immediate(), original.repository.all_appended());
    let command = tabletop_session::domain::commands::StartSession {
        session_id: original.session_id,
        campaign_id: original.campaign_id,
        gm_id: Uuid::new_v4(),
        correlation_id: Uuid::new_v4(),
    };

    let result = restarted.hub.open_session(&command).await;

    assert!(matches!(result, Err(DomainError::Validation { .. })));
    assert!(restarted.hub.session_ids().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_closing_a_session_flushes_pending_broadcasts() {
    // Arrange
    let config = EngineConfig {
        broadcaster: BroadcasterConfig {
            enable_batching: true,
            max_batch_size: 10,
            batch_delay: Duration::from_millis(100),
        },
        ..EngineConfig::default()
    };
    let table = common::table(config);
    let handle = table.seated().await;
    {
        let mut runtime = handle.lock().await;
        runtime
            .execute(table.gm_id, table.flags(None, "combat", json!(true)))
            .await
            .unwrap();
        runtime
            .execute(table.gm_id, table.flags(None, "round", json!(1)))
            .await
            .unwrap();
    }
    assert!(table.transport.sent().is_empty());

    // Act
    table.hub.close_session(table.session_id).await.unwrap();

    // Assert
    let sent = table.transport.sent_to_session(table.session_id);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload["changes"], json!({ "combat": true, "round": 1 }));
    assert!(matches!(
        table.hub.session(table.session_id).await,
        Err(DomainError::AggregateNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_batched_updates_arrive_after_the_delay() {
    // Arrange
    let config = EngineConfig {
        broadcaster: BroadcasterConfig {
            enable_batching: true,
            max_batch_size: 10,
            batch_delay: Duration::from_millis(100),
        },
        ..EngineConfig::default()
    };
    let table = common::table(config);
    let handle = table.seated().await;

    // Act
    handle
        .lock()
        .await
        .execute(table.gm_id, table.flags(None, "combat", json!(true)))
        .await
        .unwrap();
    let before_delay = table.transport.sent().len();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Assert
    assert_eq!(before_delay, 0);
    assert_eq!(table.transport.sent_to_session(table.session_id).len(), 1);
}

#[tokio::test]
async fn test_sweep_drops_only_actions_past_the_configured_age() {
    // Arrange
    let config = EngineConfig {
        stale_action_age: chrono::Duration::minutes(30),
        ..common::immediate()
    };
    let table = common::table(config);
    let handle = table.seated().await;
    handle
        .lock()
        .await
        .submit_player_action(table.submit(table.alice, "attack"), ActionPriority::Normal)
        .await
        .unwrap();
    table.clock.advance(chrono::Duration::minutes(20));
    handle
        .lock()
        .await
        .submit_player_action(table.submit(table.bob, "cast"), ActionPriority::Normal)
        .await
        .unwrap();
    table.clock.advance(chrono::Duration::minutes(15));

    // Act
    let removed = table.hub.sweep_stale_actions().await;

    // Assert
    assert_eq!(removed, 1);
    let runtime = handle.lock().await;
    let queued = runtime.authority().queued_actions();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].action.player_id, table.bob);
}
