/// Per-turn countdown.
pub mod countdown;
/// Merge point for the push, poll and local snapshots.
pub mod reconciler;
/// One participant's session.
pub mod session;
/// SSE broadcast hub.
pub mod sse;
/// Stage machine.
pub mod stage;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::record_store::RecordStore,
    error::ServiceError,
    services::turn_engine::{GuessGenerator, RandomGuess},
    state::session::Session,
};

/// Shared handle passed to routes and background tasks.
pub type SharedState = Arc<AppState>;

/// Central application state: the record store handle and the local sessions it hosts.
pub struct AppState {
    record_store: RwLock<Option<Arc<dyn RecordStore>>>,
    sessions: DashMap<Uuid, Arc<Session>>,
    config: AppConfig,
    generator: Arc<dyn GuessGenerator>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a record store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_generator(config, Arc::new(RandomGuess))
    }

    /// Same as [`AppState::new`] with a custom auto-guess source.
    pub fn with_generator(config: AppConfig, generator: Arc<dyn GuessGenerator>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            record_store: RwLock::new(None),
            sessions: DashMap::new(),
            config,
            generator,
            degraded: degraded_tx,
        })
    }

    /// Configuration the application was started with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Auto-guess source handed to new sessions.
    pub fn generator(&self) -> Arc<dyn GuessGenerator> {
        self.generator.clone()
    }

    /// Obtain a handle to the current record store, if one is installed.
    pub async fn record_store(&self) -> Option<Arc<dyn RecordStore>> {
        let guard = self.record_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current record store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_record_store(&self) -> Result<Arc<dyn RecordStore>, ServiceError> {
        self.record_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a record store implementation and leave degraded mode.
    pub async fn install_record_store(&self, store: Arc<dyn RecordStore>) {
        {
            let mut guard = self.record_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current record store and enter degraded mode.
    pub async fn clear_record_store(&self) {
        {
            let mut guard = self.record_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.record_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of local sessions keyed by their identifier.
    pub fn sessions(&self) -> &DashMap<Uuid, Arc<Session>> {
        &self.sessions
    }

    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
