//! Explicit context of one local participant: identity, active room, stage and
//! the background tasks feeding the room's reconciler.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::{Instant, timeout},
};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        models::{GameRecord, RecordId, Role},
        record_store::RecordStore,
    },
    dto::view::SessionView,
    error::ServiceError,
    services::{
        record_writer::{self, RecordWriter},
        sse_events, sync_service, timeout_supervisor,
        turn_engine::GuessGenerator,
    },
    state::{
        countdown::{Countdown, Tick, TurnKey},
        reconciler::{Reconciled, Reconciler, Source},
        sse::SseHub,
        stage::{PlanId, Stage, StageEvent, StageMachine, Transition},
    },
};

/// Upper bound on the store work performed inside a local transition.
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(10);

/// State of the push channel, reported for debugging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    /// No room, nothing to subscribe to.
    #[default]
    None,
    /// Subscription requested or being re-established.
    Pending,
    /// Receiving change events.
    Subscribed,
    /// The stream ended for good (record deleted).
    Closed,
}

/// Who the local participant is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Display name.
    pub name: String,
    /// Seat in the room.
    pub role: Role,
}

/// Everything a write needs, captured from the last reconciled snapshot.
#[derive(Clone)]
pub struct WriteContext {
    /// Store holding the record.
    pub store: Arc<dyn RecordStore>,
    /// Last reconciled snapshot.
    pub record: GameRecord,
    /// Stage at capture time.
    pub stage: Stage,
    /// Seat of the writer.
    pub role: Role,
}

/// Handle on the room a session currently takes part in.
pub struct Room {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) reconciler: Reconciler,
    pub(crate) countdown: Countdown,
    pub(crate) push_status: PushStatus,
    writer: RecordWriter,
    tasks: RoomTasks,
}

impl Room {
    /// Record shared by both participants.
    pub fn record_id(&self) -> &RecordId {
        self.reconciler.record_id()
    }
}

/// Background tasks bound to a room; aborted when the room is dropped.
#[derive(Default)]
struct RoomTasks {
    push: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
    countdown: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl RoomTasks {
    fn stop_poll(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.abort();
        }
    }

    fn stop_countdown(&mut self) {
        if let Some(handle) = self.countdown.take() {
            handle.abort();
        }
    }
}

impl Drop for RoomTasks {
    fn drop(&mut self) {
        let handles = [
            self.push.take(),
            self.poll.take(),
            self.countdown.take(),
            self.writer.take(),
        ];
        for handle in handles.into_iter().flatten() {
            handle.abort();
        }
    }
}

/// Mutable part of a [`Session`].
#[derive(Default)]
pub struct SessionInner {
    pub(crate) identity: Option<Identity>,
    pub(crate) stage: StageMachine,
    pub(crate) room: Option<Room>,
}

/// One local participant.
pub struct Session {
    id: Uuid,
    config: AppConfig,
    generator: Arc<dyn GuessGenerator>,
    hub: SseHub,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last participant activity.
    last_seen_ms: AtomicU64,
    inner: RwLock<SessionInner>,
}

impl Session {
    /// Fresh session in the login stage.
    pub fn new(config: AppConfig, generator: Arc<dyn GuessGenerator>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            hub: SseHub::new(config.sse_capacity),
            config,
            generator,
            transition_gate: Mutex::new(()),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
            created_at: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
            inner: RwLock::new(SessionInner::default()),
        })
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration captured at creation.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Auto-guess source.
    pub fn generator(&self) -> &dyn GuessGenerator {
        self.generator.as_ref()
    }

    /// Record participant activity.
    pub fn touch(&self) {
        let elapsed = u64::try_from(self.created_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_seen_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Time since the last activity; zero while an SSE stream is attached.
    pub fn idle_for(&self) -> Duration {
        if self.hub.subscriber_count() > 0 {
            return Duration::ZERO;
        }
        let last_seen = Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed));
        self.created_at.elapsed().saturating_sub(last_seen)
    }

    /// Broadcast hub for this session's SSE stream.
    pub fn hub(&self) -> &SseHub {
        &self.hub
    }

    /// Current stage.
    pub async fn stage(&self) -> Stage {
        self.inner.read().await.stage.stage()
    }

    /// Projection for the participant.
    pub async fn view(&self) -> SessionView {
        let inner = self.inner.read().await;
        SessionView::build(self.id, &inner)
    }

    /// Push the current view to SSE subscribers.
    pub async fn publish_view(&self) {
        let view = self.view().await;
        sse_events::broadcast_view(&self.hub, &view);
    }

    /// Run a local stage transition around `work`.
    ///
    /// The transition is planned first (rejecting actions invalid in the
    /// current stage), applied only if `work` succeeds, and `commit` then runs
    /// under the same write lock so no reconciled update can interleave.
    pub async fn run_transition<W, Fut, T, C, R>(
        self: &Arc<Self>,
        event: StageEvent,
        work: W,
        commit: C,
    ) -> Result<R, ServiceError>
    where
        W: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
        C: FnOnce(&mut SessionInner, T) -> R,
    {
        let _gate = self.transition_gate.lock().await;
        let plan = self.inner.write().await.stage.plan(event)?;

        let work_future = work();
        let outcome = match self.transition_timeout {
            Some(limit) => timeout(limit, work_future)
                .await
                .unwrap_or(Err(ServiceError::Timeout)),
            None => work_future.await,
        };

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                self.abort_transition(event, plan.id).await;
                return Err(err);
            }
        };

        let result = {
            let mut inner = self.inner.write().await;
            let transition = inner.stage.apply(plan.id)?;
            log_transition(self.id, &transition);
            commit(&mut *inner, value)
        };
        self.publish_view().await;
        Ok(result)
    }

    /// Drop a failed local plan and catch up with whatever the record did meanwhile.
    ///
    /// Snapshots reconciled while the plan was pending were not observed by the
    /// stage machine, and later copies of them arrive as duplicates.
    async fn abort_transition(self: &Arc<Self>, event: StageEvent, plan_id: PlanId) {
        {
            let mut inner = self.inner.write().await;
            if let Err(abort_err) = inner.stage.abort(plan_id) {
                warn!(
                    session_id = %self.id,
                    event = ?event,
                    error = %ServiceError::from(abort_err),
                    "failed to abort transition after work error"
                );
                return;
            }
            self.settle(&mut *inner);
        }
        self.publish_view().await;
    }

    /// Seat this session in a freshly created or joined room and start its channels.
    pub(crate) fn attach_room(
        self: &Arc<Self>,
        inner: &mut SessionInner,
        store: Arc<dyn RecordStore>,
        record: GameRecord,
        identity: Identity,
    ) {
        let record_id = record.id.clone();
        let weak = Arc::downgrade(self);

        let (writer, writer_task) = record_writer::spawn(weak.clone());
        let tasks = RoomTasks {
            push: Some(sync_service::spawn_push(
                weak.clone(),
                store.clone(),
                record_id.clone(),
            )),
            poll: Some(sync_service::spawn_poll(
                weak,
                store.clone(),
                record_id,
                self.config.poll_interval(),
            )),
            countdown: None,
            writer: Some(writer_task),
        };

        info!(
            session_id = %self.id,
            record_id = %record.id,
            code = %record.code,
            role = %identity.role,
            "entered room"
        );

        inner.identity = Some(identity);
        inner.room = Some(Room {
            store,
            reconciler: Reconciler::seeded(record),
            countdown: Countdown::new(self.config.turn_duration_secs),
            push_status: PushStatus::Pending,
            writer,
            tasks,
        });
        self.settle(inner);
    }

    /// Forget the room and identity; dropping the room stops its tasks.
    pub(crate) fn detach_room(&self, inner: &mut SessionInner) {
        if let Some(room) = inner.room.take() {
            info!(session_id = %self.id, record_id = %room.record_id(), "left room");
        }
        inner.identity = None;
    }

    /// Feed a snapshot from any channel through the reconciler.
    pub async fn reconcile(self: &Arc<Self>, source: Source, record: GameRecord) -> Reconciled {
        let outcome = {
            let mut inner = self.inner.write().await;
            let Some(room) = inner.room.as_mut() else {
                return Reconciled::Ignored;
            };
            let outcome = room.reconciler.offer(source, record);
            if outcome == Reconciled::Applied {
                self.settle(&mut *inner);
            }
            outcome
        };

        match outcome {
            Reconciled::Applied => {
                debug!(session_id = %self.id, ?source, "applied snapshot");
                self.publish_view().await;
            }
            _ => debug!(session_id = %self.id, ?source, ?outcome, "discarded snapshot"),
        }
        outcome
    }

    /// Mark the room as gone.
    pub async fn tombstone(&self, source: Source) -> Reconciled {
        let outcome = {
            let mut inner = self.inner.write().await;
            let Some(room) = inner.room.as_mut() else {
                return Reconciled::Ignored;
            };
            let outcome = room.reconciler.tombstone(source);
            if outcome == Reconciled::Closed {
                room.countdown.stop();
                room.tasks.stop_countdown();
                room.tasks.stop_poll();
            }
            outcome
        };

        if outcome == Reconciled::Closed {
            info!(session_id = %self.id, ?source, "room closed");
            sse_events::broadcast_info(&self.hub, "the room was closed");
            self.publish_view().await;
        }
        outcome
    }

    /// Update the push channel state and publish the view if it changed.
    pub async fn set_push_status(&self, status: PushStatus) {
        let changed = {
            let mut inner = self.inner.write().await;
            match inner.room.as_mut() {
                Some(room) if room.push_status != status => {
                    room.push_status = status;
                    true
                }
                _ => false,
            }
        };
        if changed {
            debug!(session_id = %self.id, ?status, "push status changed");
            self.publish_view().await;
        }
    }

    /// True without a room or once the record is gone.
    pub async fn is_room_closed(&self) -> bool {
        let inner = self.inner.read().await;
        inner
            .room
            .as_ref()
            .is_none_or(|room| room.reconciler.is_closed())
    }

    /// Advance the turn countdown by one second.
    ///
    /// Returns `None` once the countdown is no longer running.
    pub async fn tick_countdown(&self) -> Option<(Tick, RecordWriter)> {
        let mut inner = self.inner.write().await;
        let room = inner.room.as_mut()?;
        let tick = room.countdown.tick()?;
        Some((tick, room.writer.clone()))
    }

    /// Store handle and record id of the active room, with its closed flag.
    pub async fn room_handle(&self) -> Option<(Arc<dyn RecordStore>, RecordId, bool)> {
        let inner = self.inner.read().await;
        inner.room.as_ref().map(|room| {
            (
                room.store.clone(),
                room.record_id().clone(),
                room.reconciler.is_closed(),
            )
        })
    }

    /// Queue handle for writes to the active room.
    pub async fn writer(&self) -> Result<RecordWriter, ServiceError> {
        let inner = self.inner.read().await;
        let room = inner.room.as_ref().ok_or_else(no_room)?;
        if room.reconciler.is_closed() {
            return Err(room_closed());
        }
        Ok(room.writer.clone())
    }

    /// Capture what a write needs from the last reconciled snapshot.
    pub async fn write_context(&self) -> Result<WriteContext, ServiceError> {
        let inner = self.inner.read().await;
        let (Some(identity), Some(room)) = (inner.identity.as_ref(), inner.room.as_ref()) else {
            return Err(no_room());
        };
        if room.reconciler.is_closed() {
            return Err(room_closed());
        }
        let record = room.reconciler.current().cloned().ok_or_else(no_room)?;
        Ok(WriteContext {
            store: room.store.clone(),
            record,
            stage: inner.stage.stage(),
            role: identity.role,
        })
    }

    /// Derive stage transitions from the reconciled record and apply their effects.
    fn settle(self: &Arc<Self>, inner: &mut SessionInner) {
        let SessionInner {
            identity,
            stage,
            room,
        } = inner;
        let (Some(identity), Some(room)) = (identity.as_ref(), room.as_mut()) else {
            return;
        };
        let Some(snapshot) = room.reconciler.current() else {
            return;
        };

        for transition in stage.observe(snapshot, identity.role) {
            log_transition(self.id, &transition);
        }

        match stage.stage() {
            Stage::Playing if !room.reconciler.is_closed() => {
                let turn = TurnKey::of(snapshot);
                if room.countdown.is_running() {
                    room.countdown.observe(turn);
                } else {
                    room.countdown.start(turn);
                    room.tasks.countdown =
                        Some(timeout_supervisor::spawn(Arc::downgrade(self)));
                }
            }
            Stage::Finished => {
                room.countdown.stop();
                room.tasks.stop_countdown();
                room.tasks.stop_poll();
            }
            _ => {}
        }
    }
}

fn log_transition(session_id: Uuid, transition: &Transition) {
    info!(
        %session_id,
        from = ?transition.from,
        to = ?transition.to,
        event = ?transition.event,
        "stage changed"
    );
}

fn no_room() -> ServiceError {
    ServiceError::InvalidState("no active room".into())
}

fn room_closed() -> ServiceError {
    ServiceError::InvalidState("the room was closed".into())
}
