//! Single-writer queue for a session's game writes.
//!
//! Human guesses, secrets and timer-driven auto-guesses all enter the same
//! channel and are committed one at a time, each planned from the snapshot
//! reconciled after the previous commit.

use std::sync::{Arc, Weak};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    dao::{models::GameRecord, storage::StorageResult},
    error::ServiceError,
    services::turn_engine,
    state::{countdown::TurnKey, reconciler::Source, session::Session},
};

const QUEUE_CAPACITY: usize = 8;

type Reply = oneshot::Sender<Result<GameRecord, ServiceError>>;

/// Work accepted by the writer.
pub enum WriteCommand {
    /// Commit a human guess.
    Guess {
        /// The four digits.
        digits: String,
        /// Receives the commit outcome.
        reply: Reply,
    },
    /// Commit the participant's secret.
    Secret {
        /// The four digits.
        digits: String,
        /// Receives the commit outcome.
        reply: Reply,
    },
    /// Auto-play the turn identified by `turn` if it is still current.
    Timeout {
        /// Turn the timeout was armed for.
        turn: TurnKey,
    },
}

/// Cloneable handle feeding a session's writer task.
#[derive(Clone)]
pub struct RecordWriter {
    tx: mpsc::Sender<WriteCommand>,
}

impl RecordWriter {
    /// Queue a guess and wait for its commit.
    pub async fn guess(&self, digits: String) -> Result<GameRecord, ServiceError> {
        self.request(|reply| WriteCommand::Guess { digits, reply }).await
    }

    /// Queue a secret and wait for its commit.
    pub async fn set_secret(&self, digits: String) -> Result<GameRecord, ServiceError> {
        self.request(|reply| WriteCommand::Secret { digits, reply }).await
    }

    /// Queue a timeout without waiting for it; returns `false` if the queue is full or gone.
    pub fn timeout(&self, turn: TurnKey) -> bool {
        self.tx.try_send(WriteCommand::Timeout { turn }).is_ok()
    }

    async fn request<F>(&self, build: F) -> Result<GameRecord, ServiceError>
    where
        F: FnOnce(Reply) -> WriteCommand,
    {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| writer_gone())?;
        response.await.map_err(|_| writer_gone())?
    }
}

fn writer_gone() -> ServiceError {
    ServiceError::InvalidState("the room is no longer active".into())
}

/// Start the writer task of a session.
pub fn spawn(session: Weak<Session>) -> (RecordWriter, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let handle = tokio::spawn(run(session, rx));
    (RecordWriter { tx }, handle)
}

async fn run(session: Weak<Session>, mut rx: mpsc::Receiver<WriteCommand>) {
    while let Some(command) = rx.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };

        match command {
            WriteCommand::Guess { digits, reply } => {
                let _ = reply.send(commit_guess(&session, &digits).await);
            }
            WriteCommand::Secret { digits, reply } => {
                let _ = reply.send(commit_secret(&session, &digits).await);
            }
            WriteCommand::Timeout { turn } => commit_timeout(&session, turn).await,
        }
    }
}

async fn commit_guess(session: &Arc<Session>, digits: &str) -> Result<GameRecord, ServiceError> {
    let ctx = session.write_context().await?;
    let planned = turn_engine::plan_guess(&ctx.record, ctx.stage, ctx.role, digits)?;

    let write = ctx.store.update(ctx.record.id.clone(), planned.patch);
    let record = commit(session, &ctx.record, write).await?;
    info!(
        session_id = %session.id(),
        role = %ctx.role,
        total_matches = planned.feedback.total_matches,
        correct_positions = planned.feedback.correct_positions,
        "guess committed"
    );
    Ok(record)
}

async fn commit_secret(session: &Arc<Session>, digits: &str) -> Result<GameRecord, ServiceError> {
    let ctx = session.write_context().await?;
    let patch = turn_engine::plan_secret(&ctx.record, ctx.stage, ctx.role, digits)?;

    let write = ctx.store.update(ctx.record.id.clone(), patch);
    let record = commit(session, &ctx.record, write).await?;
    info!(session_id = %session.id(), role = %ctx.role, "secret committed");
    Ok(record)
}

async fn commit_timeout(session: &Arc<Session>, turn: TurnKey) {
    let ctx = match session.write_context().await {
        Ok(ctx) => ctx,
        Err(err) => {
            debug!(session_id = %session.id(), error = %err, "timeout dropped");
            return;
        }
    };

    let Some(planned) = turn_engine::plan_timeout(&ctx.record, turn, session.generator()) else {
        debug!(session_id = %session.id(), ?turn, "stale or unplayable timeout skipped");
        return;
    };

    let write = ctx.store.update(ctx.record.id.clone(), planned.patch);
    match commit(session, &ctx.record, write).await {
        Ok(_) => info!(
            session_id = %session.id(),
            timed_out = %turn.turn,
            correct_positions = planned.feedback.correct_positions,
            "auto-guess committed"
        ),
        Err(err) => warn!(session_id = %session.id(), error = %err, "auto-guess failed"),
    }
}

/// Await a store write and feed its result straight into the reconciler.
async fn commit<F>(
    session: &Arc<Session>,
    base: &GameRecord,
    write: F,
) -> Result<GameRecord, ServiceError>
where
    F: Future<Output = StorageResult<GameRecord>>,
{
    match write.await {
        Ok(record) => {
            session.reconcile(Source::Local, record.clone()).await;
            Ok(record)
        }
        Err(err) if err.is_not_found() => {
            session.tombstone(Source::Local).await;
            Err(ServiceError::NotFound(format!("room `{}`", base.code)))
        }
        Err(err) => {
            warn!(session_id = %session.id(), error = %err, "record write failed");
            Err(err.into())
        }
    }
}
