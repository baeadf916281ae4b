mod common;

use std::{sync::Arc, time::Duration};

use common::{InstrumentedStore, client, client_on, config, start_game, wait_for_stage, wait_for_view};
use number_duel::{
    dao::record_store::memory::MemoryRecordStore,
    error::ServiceError,
    services::{room_service, turn_engine::RandomGuess},
    state::{session::PushStatus, stage::Stage},
};

#[tokio::test]
async fn join_during_a_failed_reset_still_reaches_setup() {
    let store = MemoryRecordStore::new();
    let flaky = InstrumentedStore::new(&store).with_failing_delete(Duration::from_millis(400));
    let alice = client_on(Arc::new(flaky), config(15), Arc::new(RandomGuess)).await;
    let bob = client(&store, config(15)).await;

    let record = room_service::create_room(&alice.state, &alice.session, "alice")
        .await
        .expect("room created");
    wait_for_stage(&alice, Stage::Lobby).await;

    let reset = tokio::spawn({
        let session = alice.session.clone();
        async move { room_service::reset(&session).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    room_service::join_room(&bob.state, &bob.session, "bob", &record.code)
        .await
        .expect("room joined");

    let err = reset.await.expect("reset task").unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable(_)));

    let view = wait_for_stage(&alice, Stage::Setup).await;
    let room = view.room.expect("room kept after failed reset");
    assert_eq!(room.player2.as_deref(), Some("bob"));
}

#[tokio::test]
async fn polling_stops_once_the_game_is_finished() {
    let store = MemoryRecordStore::new();
    let counted = InstrumentedStore::new(&store);
    let alice = client_on(Arc::new(counted.clone()), config(15), Arc::new(RandomGuess)).await;
    let bob = client(&store, config(15)).await;

    start_game(&alice, &bob).await;
    room_service::submit_guess(&alice.session, "2468")
        .await
        .expect("winning guess");
    wait_for_stage(&alice, Stage::Finished).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let settled = counted.fetches();
    assert!(settled > 0);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(counted.fetches(), settled);
}

#[tokio::test]
async fn opponent_reset_closes_push_and_stops_polling() {
    let store = MemoryRecordStore::new();
    let counted = InstrumentedStore::new(&store);
    let alice = client(&store, config(15)).await;
    let bob = client_on(Arc::new(counted.clone()), config(15), Arc::new(RandomGuess)).await;

    start_game(&alice, &bob).await;
    room_service::reset(&alice.session).await.expect("reset");

    let view = wait_for_view(&bob, |view| {
        view.push_status == PushStatus::Closed
            && view.room.as_ref().is_some_and(|room| room.closed)
    })
    .await;
    assert_eq!(view.stage, Stage::Playing);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let settled = counted.fetches();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(counted.fetches(), settled);
}
