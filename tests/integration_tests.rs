//! Integration tests for the pickup-room service
//!
//! These tests drive the whole system through the manager and the command
//! dispatcher against the in-memory platform:
//! - room formation for every group kind
//! - staged teardown after the first departure
//! - raw deliveries through the production command handler
//! - registration persistence and store failures

mod fixtures;

use fixtures::{
    create_test_system, create_test_system_with_store, expect_room, friend_code_for,
    register_players, FailingStore, STAGE,
};
use pickup_room::amqp::handlers::dispatch_delivery;
use pickup_room::error::{as_pickup_error, ErrorCategory};
use pickup_room::platform::{ChannelKind, Principal, VIEW_CHANNEL};
use pickup_room::player::{JsonFileRegistrationStore, PlayerStatus};
use pickup_room::room::RoomState;
use pickup_room::service::ProductionCommandHandler;
use pickup_room::types::{EnqueueOutcome, GroupKind, LeaveOutcome, PresenceOutcome};
use pickup_room::PickupError;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const DRAIN: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_complete_pair_lifecycle() {
    let system = create_test_system();
    let manager = &system.manager;
    let ids = register_players(manager, 100, 2).await;

    assert_eq!(
        assert_ok!(manager.enqueue(&ids[0], GroupKind::Pair).await),
        EnqueueOutcome::Queued { waiting: 1 }
    );
    let room_id = expect_room(assert_ok!(manager.enqueue(&ids[1], GroupKind::Pair).await));

    // Grouping, text and voice channel
    let channels = system.platform.live_channels();
    assert_eq!(channels.len(), 3);
    let text = channels
        .iter()
        .find(|c| c.kind == ChannelKind::Text)
        .expect("text channel")
        .clone();

    let roster = system.platform.messages_in(&text.id);
    assert_eq!(roster.len(), 1);
    for id in &ids {
        assert!(roster[0].contains(&format!("<@{}> - {}", id, friend_code_for(id))));
        assert_eq!(
            system.platform.access_of(&text.id, &Principal::Member(id.clone())),
            Some((VIEW_CHANNEL, 0))
        );
        assert!(system.platform.roles_of(id).contains("in-progress"));
        assert!(!system.platform.roles_of(id).contains("search-pair"));
    }
    assert_eq!(
        system.platform.access_of(&text.id, &Principal::Everyone),
        Some((0, VIEW_CHANNEL))
    );

    let shared = manager.rooms().get(room_id).unwrap().expect("room is live");
    assert_eq!(shared.lock().await.state(), RoomState::Active);

    // First departure starts the teardown, the second does not
    assert_eq!(
        assert_ok!(manager.leave(&ids[0]).await),
        LeaveOutcome::LeftRoom {
            room_id,
            teardown_started: true
        }
    );
    assert_eq!(
        system.platform.access_of(&text.id, &Principal::Member(ids[0].clone())),
        Some((0, VIEW_CHANNEL))
    );
    for id in &ids {
        assert!(!system.platform.roles_of(id).contains("in-progress"));
    }

    assert_eq!(manager.shutdown(DRAIN).await, 0);

    assert!(system.platform.live_channels().is_empty());
    assert!(manager.rooms().get(room_id).unwrap().is_none());
    assert_eq!(shared.lock().await.state(), RoomState::Closed);

    let messages = system.platform.messages_in(&text.id);
    assert_eq!(messages.len(), 4);
    assert!(messages[1].starts_with("A player has left. The room will be closed in"));
    assert!(messages[2].starts_with("Room will be closed in"));
    assert!(messages[3].starts_with("Room will be closed in"));

    let stats = manager.get_stats().unwrap();
    assert_eq!(stats.rooms_formed, 1);
    assert_eq!(stats.rooms_closed, 1);
    assert_eq!(stats.teardowns_started, 1);
    assert_eq!(stats.active_rooms, 0);

    // Both players are free to search again
    for id in &ids {
        let player = manager.registry().tracked(id).unwrap().unwrap();
        assert_eq!(player.status(), PlayerStatus::Idle);
    }
    assert_eq!(
        assert_ok!(manager.enqueue(&ids[1], GroupKind::Pair).await),
        EnqueueOutcome::Queued { waiting: 1 }
    );
}

#[tokio::test]
async fn test_second_departure_does_not_restart_teardown() {
    let system = create_test_system();
    let manager = &system.manager;
    let ids = register_players(manager, 150, 2).await;

    manager.enqueue(&ids[0], GroupKind::Pair).await.unwrap();
    let room_id = expect_room(manager.enqueue(&ids[1], GroupKind::Pair).await.unwrap());

    manager.leave(&ids[0]).await.unwrap();
    assert_eq!(
        manager.leave(&ids[1]).await.unwrap(),
        LeaveOutcome::LeftRoom {
            room_id,
            teardown_started: false
        }
    );
    assert_eq!(manager.shutdown(DRAIN).await, 0);
    assert_eq!(manager.get_stats().unwrap().teardowns_started, 1);

    // Nothing left to leave once the room is closed
    assert_eq!(
        manager.leave(&ids[1]).await.unwrap(),
        LeaveOutcome::NotParticipating
    );
}

#[tokio::test]
async fn test_quad_team_fills_with_solo_player() {
    let system = create_test_system();
    let manager = &system.manager;
    let ids = register_players(manager, 200, 4).await;

    assert_eq!(
        manager
            .enqueue_team(&ids[0], GroupKind::Quad, &ids[1..3])
            .await
            .unwrap(),
        EnqueueOutcome::Queued { waiting: 3 }
    );
    for id in &ids[..3] {
        assert!(system.platform.roles_of(id).contains("search-quad"));
    }

    let room_id = expect_room(manager.enqueue(&ids[3], GroupKind::Quad).await.unwrap());
    let shared = manager.rooms().get(room_id).unwrap().unwrap();
    let room = shared.lock().await;
    assert_eq!(room.kind(), GroupKind::Quad);
    assert_eq!(room.member_ids(), ids);
    drop(room);

    let stats = manager.get_stats().unwrap();
    assert_eq!(stats.teams_queued, 1);
    assert_eq!(stats.players_queued, 4);
    assert_eq!(stats.waiting_by_kind[&GroupKind::Quad], 0);
}

#[tokio::test]
async fn test_private_room_gets_two_team_channels() {
    let system = create_test_system();
    let manager = &system.manager;
    let ids = register_players(manager, 300, 8).await;

    manager
        .enqueue_team(&ids[0], GroupKind::Private, &ids[1..4])
        .await
        .unwrap();
    for id in &ids[4..7] {
        manager.enqueue(id, GroupKind::Private).await.unwrap();
    }
    expect_room(manager.enqueue(&ids[7], GroupKind::Private).await.unwrap());

    let channels = system.platform.live_channels();
    let mut voice: Vec<String> = channels
        .iter()
        .filter(|c| c.kind == ChannelKind::Voice)
        .map(|c| c.name.clone())
        .collect();
    voice.sort();
    assert_eq!(voice, vec!["Team Alpha", "Team Beta"]);
    assert_eq!(channels.len(), 4);
}

#[tokio::test]
async fn test_team_too_large_is_rejected_without_side_effects() {
    let system = create_test_system();
    let manager = &system.manager;
    let ids = register_players(manager, 400, 3).await;

    let err = assert_err!(
        manager
            .enqueue_team(&ids[0], GroupKind::Pair, &ids[1..])
            .await
    );
    assert!(matches!(
        as_pickup_error(&err),
        Some(PickupError::TeamTooLarge { .. })
    ));
    for id in &ids {
        assert!(system.platform.roles_of(id).is_empty());
        let player = manager.registry().tracked(id).unwrap().unwrap();
        assert_eq!(player.status(), PlayerStatus::Idle);
    }
    assert_eq!(manager.get_stats().unwrap().players_waiting, 0);
}

#[tokio::test]
async fn test_offline_player_leaves_queue_but_not_room() {
    let system = create_test_system();
    let manager = &system.manager;
    let ids = register_players(manager, 500, 3).await;

    manager.enqueue(&ids[0], GroupKind::Quad).await.unwrap();
    assert_eq!(
        manager.presence_offline(&ids[0]).await.unwrap(),
        PresenceOutcome::RemovedFromQueue {
            kind: GroupKind::Quad
        }
    );
    assert!(!system.platform.roles_of(&ids[0]).contains("search-quad"));

    manager.enqueue(&ids[1], GroupKind::Pair).await.unwrap();
    let room_id = expect_room(manager.enqueue(&ids[2], GroupKind::Pair).await.unwrap());
    assert_eq!(
        manager.presence_offline(&ids[1]).await.unwrap(),
        PresenceOutcome::Ignored
    );
    let player = manager.registry().tracked(&ids[1]).unwrap().unwrap();
    assert_eq!(player.status(), PlayerStatus::InMatch(room_id));
}

#[tokio::test]
async fn test_raw_deliveries_through_command_handler() {
    let system = create_test_system();
    let handler = ProductionCommandHandler::new(system.manager.clone(), Some("search".to_string()));

    let deliveries = [
        r#"{"type":"Register","player_id":"601","friend_code":"1111-2222-3333","channel_id":"search","timestamp":"2026-01-01T00:00:00Z"}"#,
        r#"{"type":"Register","player_id":"602","friend_code":"4444-5555-6666","channel_id":"search","timestamp":"2026-01-01T00:00:00Z"}"#,
        r#"{"type":"Enqueue","player_id":"601","group_kind":"pair","channel_id":"elsewhere","timestamp":"2026-01-01T00:00:00Z"}"#,
        r#"{"type":"EnqueueTeam","player_id":"601","group_kind":"pair","member_ids":["<@602>"],"channel_id":"search","timestamp":"2026-01-01T00:00:00Z"}"#,
        r#"{"type":"Leave","player_id":"602","channel_id":"search","timestamp":"2026-01-01T00:00:00Z"}"#,
        r#"{"type":"Enqueue","player_id":"601""#,
    ];
    for delivery in deliveries {
        dispatch_delivery(&handler, delivery.as_bytes()).await;
    }
    assert_eq!(system.manager.get_stats().unwrap().teardowns_started, 0);

    let text = system
        .platform
        .live_channels()
        .into_iter()
        .find(|c| c.kind == ChannelKind::Text)
        .expect("room text channel");
    let leave = format!(
        r#"{{"type":"Leave","player_id":"602","channel_id":"{}","timestamp":"2026-01-01T00:00:00Z"}}"#,
        text.id
    );
    dispatch_delivery(&handler, leave.as_bytes()).await;

    assert_eq!(
        system.platform.messages_in("search"),
        vec![
            "<@601>: Registered successfully! Use !pair, !quad, or !private to start searching.",
            "<@602>: Registered successfully! Use !pair, !quad, or !private to start searching.",
        ]
    );
    assert!(system.platform.messages_in("elsewhere").is_empty());

    let stats = system.manager.get_stats().unwrap();
    assert_eq!(stats.rooms_formed, 1);
    assert_eq!(stats.teardowns_started, 1);
    assert_eq!(system.manager.shutdown(DRAIN).await, 0);
    assert!(system.platform.live_channels().is_empty());
}

#[tokio::test]
async fn test_bad_command_fields_are_answered() {
    let system = create_test_system();
    let handler = ProductionCommandHandler::new(system.manager.clone(), Some("search".to_string()));

    let deliveries = [
        r#"{"type":"Register","player_id":"701","friend_code":"","channel_id":"search","timestamp":"2026-01-01T00:00:00Z"}"#,
        r#"{"type":"Register","player_id":"702","friend_code":"1111-2222-3333","channel_id":"search","timestamp":"2026-01-01T00:00:00Z"}"#,
        r#"{"type":"EnqueueTeam","player_id":"702","group_kind":"quad","member_ids":["bob"],"channel_id":"search","timestamp":"2026-01-01T00:00:00Z"}"#,
    ];
    for delivery in deliveries {
        dispatch_delivery(&handler, delivery.as_bytes()).await;
    }

    let replies = system.platform.messages_in("search");
    assert_eq!(replies.len(), 3);
    assert!(replies[0].starts_with("<@701>: You must provide your friend code when registering."));
    assert!(replies[1].starts_with("<@702>: Registered successfully!"));
    assert_eq!(replies[2], "<@702>: bob is not a valid player name.");
    assert_eq!(system.manager.get_stats().unwrap().players_waiting, 0);
}

#[tokio::test]
async fn test_registrations_survive_restart() {
    let path = std::env::temp_dir().join(format!("pickup-it-{}.json", uuid::Uuid::new_v4()));

    {
        let store = Arc::new(JsonFileRegistrationStore::open(&path).unwrap());
        let system = create_test_system_with_store(store);
        register_players(&system.manager, 700, 2).await;
    }

    let store = Arc::new(JsonFileRegistrationStore::open(&path).unwrap());
    let system = create_test_system_with_store(store);
    assert_eq!(
        system.manager.enqueue("700", GroupKind::Pair).await.unwrap(),
        EnqueueOutcome::Queued { waiting: 1 }
    );
    let player = system.manager.registry().tracked("700").unwrap().unwrap();
    assert_eq!(player.friend_code(), friend_code_for("700"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_store_failure_is_not_user_facing() {
    let store = Arc::new(FailingStore::new());
    let system = create_test_system_with_store(store.clone());

    let err = assert_err!(system.manager.register("800", "1111-2222-3333").await);
    let pickup = as_pickup_error(&err).expect("classified error");
    assert!(matches!(pickup, PickupError::StoreFailed { .. }));
    assert_eq!(pickup.category(), ErrorCategory::Collaborator);
    assert!(!pickup.is_user_facing());

    assert_err!(system.manager.enqueue("800", GroupKind::Pair).await);
    assert_eq!(store.calls(), 2);
    assert_eq!(system.manager.get_stats().unwrap().commands_rejected, 0);
}

#[tokio::test]
async fn test_teardown_timing_follows_stages() {
    let system = create_test_system();
    let manager = &system.manager;
    let ids = register_players(manager, 900, 2).await;

    manager.enqueue(&ids[0], GroupKind::Pair).await.unwrap();
    let room_id = expect_room(manager.enqueue(&ids[1], GroupKind::Pair).await.unwrap());

    let started = std::time::Instant::now();
    manager.leave(&ids[1]).await.unwrap();
    assert!(manager.scheduler().is_scheduled(room_id));
    assert_eq!(manager.shutdown(DRAIN).await, 0);

    assert!(started.elapsed() >= STAGE * 3);
    assert!(!manager.scheduler().is_scheduled(room_id));
}
