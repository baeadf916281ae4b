#![allow(dead_code)]

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use number_duel::{
    config::AppConfig,
    dao::{
        models::{GameRecord, NewGameRecord, RecordId, RecordPatch},
        record_store::{RecordStore, Subscription, memory::MemoryRecordStore},
        storage::{StorageError, StorageResult},
    },
    dto::view::SessionView,
    services::{
        room_service, session_registry,
        turn_engine::{FixedGuess, GuessGenerator, RandomGuess},
    },
    state::{AppState, SharedState, session::Session, stage::Stage},
};

/// One participant: its own application state pointed at the shared store.
pub struct Client {
    pub state: SharedState,
    pub session: Arc<Session>,
}

impl Client {
    pub async fn view(&self) -> SessionView {
        self.session.view().await
    }

    pub async fn stage(&self) -> Stage {
        self.session.stage().await
    }
}

pub fn config(turn_duration_secs: u32) -> AppConfig {
    AppConfig {
        turn_duration_secs,
        poll_interval_ms: 200,
        ..AppConfig::default()
    }
}

pub async fn client(store: &MemoryRecordStore, config: AppConfig) -> Client {
    client_with(store, config, Arc::new(RandomGuess)).await
}

pub async fn client_with(
    store: &MemoryRecordStore,
    config: AppConfig,
    generator: Arc<dyn GuessGenerator>,
) -> Client {
    client_on(Arc::new(store.clone()), config, generator).await
}

/// Like [`client_with`] for any store implementation.
pub async fn client_on(
    store: Arc<dyn RecordStore>,
    config: AppConfig,
    generator: Arc<dyn GuessGenerator>,
) -> Client {
    let state = AppState::with_generator(config, generator);
    state.install_record_store(store).await;
    let session = session_registry::create_session(&state);
    Client { state, session }
}

pub fn fixed(digits: &str) -> Arc<dyn GuessGenerator> {
    Arc::new(FixedGuess(digits.to_string()))
}

/// Poll `client` until `predicate` holds for its view.
pub async fn wait_for_view<F>(client: &Client, predicate: F) -> SessionView
where
    F: Fn(&SessionView) -> bool,
{
    let wait = async {
        loop {
            let view = client.view().await;
            if predicate(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("view never reached the expected state")
}

pub async fn wait_for_stage(client: &Client, stage: Stage) -> SessionView {
    wait_for_view(client, |view| view.stage == stage).await
}

/// Host a room with `host`, seat `guest`, and wait until both are in setup.
pub async fn seat_pair(host: &Client, guest: &Client) -> String {
    let record = room_service::create_room(&host.state, &host.session, "alice")
        .await
        .expect("room created");
    room_service::join_room(&guest.state, &guest.session, "bob", &record.code)
        .await
        .expect("room joined");
    wait_for_stage(host, Stage::Setup).await;
    wait_for_stage(guest, Stage::Setup).await;
    record.code
}

/// Seat both clients and set their secrets (1357 for the host, 2468 for the guest).
pub async fn start_game(host: &Client, guest: &Client) {
    seat_pair(host, guest).await;
    room_service::set_secret(&host.session, "1357")
        .await
        .expect("host secret");
    room_service::set_secret(&guest.session, "2468")
        .await
        .expect("guest secret");
    wait_for_stage(host, Stage::Playing).await;
    wait_for_stage(guest, Stage::Playing).await;
}

/// Memory store wrapper that counts fetches and can make deletes slow and failing.
#[derive(Clone)]
pub struct InstrumentedStore {
    inner: MemoryRecordStore,
    fetches: Arc<AtomicUsize>,
    failing_delete: Option<Duration>,
}

impl InstrumentedStore {
    pub fn new(inner: &MemoryRecordStore) -> Self {
        Self {
            inner: inner.clone(),
            fetches: Arc::new(AtomicUsize::new(0)),
            failing_delete: None,
        }
    }

    /// Deletes wait for `delay` and then fail as unavailable.
    pub fn with_failing_delete(mut self, delay: Duration) -> Self {
        self.failing_delete = Some(delay);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl RecordStore for InstrumentedStore {
    fn create(&self, record: NewGameRecord) -> BoxFuture<'static, StorageResult<GameRecord>> {
        self.inner.create(record)
    }

    fn fetch_by_id(&self, id: RecordId) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_by_id(id)
    }

    fn fetch_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        self.inner.fetch_by_code(code)
    }

    fn update(
        &self,
        id: RecordId,
        patch: RecordPatch,
    ) -> BoxFuture<'static, StorageResult<GameRecord>> {
        self.inner.update(id, patch)
    }

    fn delete(&self, id: RecordId) -> BoxFuture<'static, StorageResult<()>> {
        match self.failing_delete {
            Some(delay) => async move {
                tokio::time::sleep(delay).await;
                Err(StorageError::unavailable(
                    "delete rejected".into(),
                    io::Error::other("connection reset"),
                ))
            }
            .boxed(),
            None => self.inner.delete(id),
        }
    }

    fn subscribe(&self, id: RecordId) -> BoxFuture<'static, StorageResult<Subscription>> {
        self.inner.subscribe(id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }
}
