mod common;

use std::time::Duration;

use common::{client, client_with, config, fixed, seat_pair, start_game, wait_for_stage, wait_for_view};
use number_duel::{
    dao::{
        models::{Feedback, Role},
        record_store::{RecordStore, memory::MemoryRecordStore},
    },
    error::ServiceError,
    services::{room_service, turn_engine::TurnError},
    state::{
        reconciler::{Reconciled, Source},
        session::PushStatus,
        stage::Stage,
    },
};

#[tokio::test]
async fn full_game_until_a_winner() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    let bob = client(&store, config(15)).await;

    start_game(&alice, &bob).await;

    let record = room_service::submit_guess(&alice.session, "2468")
        .await
        .expect("winning guess");
    assert_eq!(record.winner.as_deref(), Some("alice"));
    assert_eq!(
        record.guesses[0].feedback,
        Feedback {
            total_matches: 4,
            correct_positions: 4
        }
    );

    let alice_view = wait_for_stage(&alice, Stage::Finished).await;
    let bob_view = wait_for_stage(&bob, Stage::Finished).await;
    for view in [&alice_view, &bob_view] {
        let room = view.room.as_ref().expect("room attached");
        assert_eq!(room.winner.as_deref(), Some("alice"));
        assert_eq!(room.guesses.len(), 1);
        assert!(room.time_left.is_none());
    }

    let err = room_service::submit_guess(&bob.session, "1357")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Turn(TurnError::GameFinished) | ServiceError::Turn(TurnError::WrongStage(_))
    ));
}

#[tokio::test]
async fn secrets_stay_private_to_their_owner() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    let bob = client(&store, config(15)).await;

    start_game(&alice, &bob).await;

    let alice_room = alice.view().await.room.expect("room attached");
    let bob_room = bob.view().await.room.expect("room attached");
    assert_eq!(alice_room.my_secret.as_deref(), Some("1357"));
    assert_eq!(bob_room.my_secret.as_deref(), Some("2468"));
    assert!(alice_room.opponent_secret_set);
    assert!(bob_room.opponent_secret_set);

    let json = serde_json::to_string(&alice.view().await).expect("view serializes");
    assert!(!json.contains("2468"));
}

#[tokio::test]
async fn turns_alternate_between_players() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    let bob = client(&store, config(15)).await;

    start_game(&alice, &bob).await;

    let err = room_service::submit_guess(&bob.session, "1111")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Turn(TurnError::NotYourTurn)));

    let record = room_service::submit_guess(&alice.session, "1234")
        .await
        .expect("alice guesses");
    assert_eq!(record.current_turn, Role::Player2);

    let err = room_service::submit_guess(&alice.session, "5678")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Turn(TurnError::NotYourTurn)));

    wait_for_view(&bob, |view| {
        view.room.as_ref().is_some_and(|room| room.my_turn)
    })
    .await;
    let record = room_service::submit_guess(&bob.session, "1111")
        .await
        .expect("bob guesses");
    assert_eq!(record.current_turn, Role::Player1);
    assert_eq!(record.guesses.len(), 2);
    assert_eq!(record.guesses[1].player, "bob");
}

#[tokio::test]
async fn malformed_digits_are_rejected_without_writing() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    let bob = client(&store, config(15)).await;

    seat_pair(&alice, &bob).await;
    let err = room_service::set_secret(&alice.session, "12a4")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Turn(TurnError::InvalidDigits)));

    room_service::set_secret(&alice.session, "0042")
        .await
        .expect("leading zeros are fine");
    let err = room_service::set_secret(&alice.session, "9999")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Turn(TurnError::SecretAlreadySet)));
}

#[tokio::test]
async fn duplicate_snapshots_are_discarded() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    let bob = client(&store, config(15)).await;

    seat_pair(&alice, &bob).await;
    let (_, record_id, _) = alice.session.room_handle().await.expect("room attached");
    let record = store
        .fetch_by_id(record_id)
        .await
        .unwrap()
        .expect("record exists");

    let before = alice.view().await.room.expect("room attached").reconcile;
    assert_eq!(
        alice.session.reconcile(Source::Poll, record.clone()).await,
        Reconciled::Duplicate
    );
    assert_eq!(
        alice.session.reconcile(Source::Push, record).await,
        Reconciled::Duplicate
    );
    let after = alice.view().await.room.expect("room attached").reconcile;
    assert_eq!(after.applied, before.applied);
    assert!(after.discarded >= before.discarded + 2);
    assert_eq!(alice.stage().await, Stage::Setup);
}

#[tokio::test]
async fn failed_refresh_keeps_the_last_view() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    let bob = client(&store, config(15)).await;

    seat_pair(&alice, &bob).await;
    let before = alice.view().await.room.expect("room attached");

    store.set_offline(true);
    let err = room_service::refresh(&alice.session).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable(_)));

    let after = alice.view().await;
    assert_eq!(after.stage, Stage::Setup);
    let room = after.room.expect("room still attached");
    assert_eq!(room.player2, before.player2);
    assert!(!room.closed);

    store.set_offline(false);
    room_service::refresh(&alice.session)
        .await
        .expect("refresh succeeds once the store is back");
}

#[tokio::test]
async fn reset_deletes_the_record_and_closes_the_opponent_room() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    let bob = client(&store, config(15)).await;

    start_game(&alice, &bob).await;
    room_service::reset(&alice.session).await.expect("reset");

    let alice_view = alice.view().await;
    assert_eq!(alice_view.stage, Stage::Login);
    assert!(alice_view.room.is_none());
    assert!(alice_view.name.is_none());
    assert!(store.is_empty());

    let bob_view = wait_for_view(&bob, |view| {
        view.room.as_ref().is_some_and(|room| room.closed)
    })
    .await;
    assert_eq!(bob_view.stage, Stage::Playing);
    assert!(bob_view.room.as_ref().is_some_and(|room| room.time_left.is_none()));

    let err = room_service::submit_guess(&bob.session, "1357")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    room_service::reset(&bob.session)
        .await
        .expect("reset of a closed room skips the delete");
    assert_eq!(bob.stage().await, Stage::Login);
}

#[tokio::test]
async fn reset_failure_leaves_the_session_untouched() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    let bob = client(&store, config(15)).await;

    seat_pair(&alice, &bob).await;
    store.set_offline(true);
    let err = room_service::reset(&alice.session).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable(_)));
    assert_eq!(alice.stage().await, Stage::Setup);
    assert!(alice.view().await.room.is_some());

    store.set_offline(false);
    room_service::reset(&alice.session).await.expect("retry succeeds");
    assert_eq!(alice.stage().await, Stage::Login);
}

#[tokio::test]
async fn join_errors() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    let bob = client(&store, config(15)).await;
    let carol = client(&store, config(15)).await;

    let err = room_service::join_room(&bob.state, &bob.session, "bob", "NOPE42")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert_eq!(bob.stage().await, Stage::Login);

    let record = room_service::create_room(&alice.state, &alice.session, "alice")
        .await
        .expect("room created");
    assert_eq!(alice.stage().await, Stage::Lobby);

    let err = room_service::create_room(&alice.state, &alice.session, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    let err = room_service::join_room(&bob.state, &bob.session, "alice", &record.code)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    room_service::join_room(&bob.state, &bob.session, "bob", &record.code.to_lowercase())
        .await
        .expect("codes are case-insensitive");

    let err = room_service::join_room(&carol.state, &carol.session, "carol", &record.code)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    assert_eq!(carol.stage().await, Stage::Login);
}

#[tokio::test]
async fn push_channel_reports_subscribed() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    room_service::create_room(&alice.state, &alice.session, "alice")
        .await
        .expect("room created");

    let view = wait_for_view(&alice, |view| view.push_status == PushStatus::Subscribed).await;
    assert_eq!(view.stage, Stage::Lobby);
}

#[tokio::test]
async fn degraded_state_rejects_room_creation() {
    let store = MemoryRecordStore::new();
    let alice = client(&store, config(15)).await;
    alice.state.clear_record_store().await;

    let err = room_service::create_room(&alice.state, &alice.session, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Degraded));
    assert_eq!(alice.stage().await, Stage::Login);
}

#[tokio::test(start_paused = true)]
async fn expired_turn_is_auto_played_with_a_warning() {
    let store = MemoryRecordStore::new();
    let alice = client_with(&store, config(3), fixed("0000")).await;
    let bob = client_with(&store, config(60), fixed("9999")).await;

    start_game(&alice, &bob).await;
    assert_eq!(
        alice.view().await.room.expect("room attached").time_left,
        Some(3)
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    let ticking = alice.view().await.room.expect("room attached");
    assert!(ticking.guesses.is_empty());

    let view = wait_for_view(&bob, |view| {
        view.room.as_ref().is_some_and(|room| !room.guesses.is_empty())
    })
    .await;
    let room = view.room.expect("room attached");
    assert_eq!(room.guesses.len(), 1);
    assert_eq!(room.guesses[0].player, "alice");
    assert_eq!(room.guesses[0].guess, "0000");
    assert!(room.guesses[0].auto);
    assert_eq!(room.warnings.player1, 1);
    assert_eq!(room.warnings.player2, 0);
    assert_eq!(room.current_turn, Role::Player2);
    assert!(room.my_turn);
}
