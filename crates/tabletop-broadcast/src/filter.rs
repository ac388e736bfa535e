//! Per-recipient filtering of full session snapshots.

use tabletop_session::domain::state::CompleteSessionState;
use uuid::Uuid;

/// Returns the part of `state` that `player_id` may see.
///
/// The session's GM sees everything. Any other recipient:
/// - sees only the map areas revealed to them, unless they may view
///   restricted areas;
/// - never sees hidden tokens;
/// - sees only their own pending actions and their own permissions.
#[must_use]
pub fn filter_state_for_player(state: &CompleteSessionState, player_id: Uuid) -> CompleteSessionState {
    if player_id == state.gm_id {
        return state.clone();
    }
    let permissions = state.permissions_of(player_id);
    let mut filtered = state.clone();

    if let Some(map) = filtered.current_map.as_mut() {
        if !permissions.view_restricted_areas {
            map.areas
                .retain(|area| permissions.revealed_areas.contains(&area.id));
        }
        map.tokens.retain(|token| !token.hidden);
    }
    filtered
        .pending_actions
        .retain(|action| action.player_id == player_id);
    filtered
        .player_permissions
        .retain(|id, _| *id == player_id);
    filtered
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{Map, Value};
    use tabletop_session::domain::state::{
        MapArea, MapState, PendingAction, PlayerPermissions, Position, TokenState,
    };

    use super::*;

    struct Table {
        state: CompleteSessionState,
        gm: Uuid,
        alice: Uuid,
        bob: Uuid,
    }

    fn area(id: &str) -> MapArea {
        MapArea {
            id: id.to_owned(),
            name: id.to_owned(),
        }
    }

    fn pending(player_id: Uuid) -> PendingAction {
        PendingAction {
            action_id: Uuid::new_v4(),
            player_id,
            campaign_id: Uuid::nil(),
            action_type: "search".to_owned(),
            payload: Value::Null,
            submitted_at: Utc::now(),
        }
    }

    fn table() -> Table {
        let gm = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut state = CompleteSessionState::empty(Uuid::new_v4());
        state.gm_id = gm;
        state.current_map = Some(MapState {
            map_id: Uuid::new_v4(),
            name: "Tomb".to_owned(),
            areas: vec![area("gate"), area("crypt"), area("treasury")],
            tokens: vec![
                TokenState {
                    id: Uuid::new_v4(),
                    character_id: None,
                    position: Position { x: 0.0, y: 0.0 },
                    hidden: false,
                    properties: Map::new(),
                },
                TokenState {
                    id: Uuid::new_v4(),
                    character_id: None,
                    position: Position { x: 4.0, y: 4.0 },
                    hidden: true,
                    properties: Map::new(),
                },
            ],
            properties: Map::new(),
        });
        state.pending_actions = vec![pending(alice), pending(bob), pending(alice)];
        state.player_permissions.insert(
            alice,
            PlayerPermissions {
                view_restricted_areas: false,
                revealed_areas: ["gate".to_owned()].into(),
                ..PlayerPermissions::default()
            },
        );
        state.player_permissions.insert(
            bob,
            PlayerPermissions {
                view_restricted_areas: true,
                ..PlayerPermissions::default()
            },
        );
        Table {
            state,
            gm,
            alice,
            bob,
        }
    }

    #[test]
    fn test_player_sees_only_revealed_areas_and_own_actions() {
        // Arrange
        let t = table();

        // Act
        let filtered = filter_state_for_player(&t.state, t.alice);

        // Assert
        let map = filtered.current_map.unwrap();
        let areas: Vec<_> = map.areas.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(areas, vec!["gate"]);
        assert_eq!(map.tokens.len(), 1);
        assert_eq!(filtered.pending_actions.len(), 2);
        assert!(filtered.pending_actions.iter().all(|a| a.player_id == t.alice));
        assert_eq!(filtered.player_permissions.len(), 1);
        assert!(filtered.player_permissions.contains_key(&t.alice));
    }

    #[test]
    fn test_restricted_viewer_sees_every_area_but_not_others_actions() {
        let t = table();

        let filtered = filter_state_for_player(&t.state, t.bob);

        assert_eq!(filtered.current_map.unwrap().areas.len(), 3);
        assert_eq!(filtered.pending_actions.len(), 1);
        assert_eq!(filtered.pending_actions[0].player_id, t.bob);
    }

    #[test]
    fn test_gm_receives_unfiltered_state() {
        let t = table();

        let filtered = filter_state_for_player(&t.state, t.gm);

        assert_eq!(filtered, t.state);
    }

    #[test]
    fn test_unknown_player_sees_no_areas() {
        let t = table();

        let filtered = filter_state_for_player(&t.state, Uuid::new_v4());

        assert!(filtered.current_map.unwrap().areas.is_empty());
        assert!(filtered.pending_actions.is_empty());
        assert!(filtered.player_permissions.is_empty());
    }
}
