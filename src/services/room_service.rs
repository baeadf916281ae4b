//! Intents a participant issues against their session: create, join, set
//! secret, guess, refresh and reset.

use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::{
    dao::{
        models::{GameRecord, NewGameRecord, RecordPatch, Role},
        record_store::RecordStore,
        storage::StorageError,
    },
    error::ServiceError,
    services::sync_service,
    state::{
        SharedState,
        reconciler::Reconciled,
        session::{Identity, Session},
        stage::StageEvent,
    },
};

const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random uppercase base-36 invite code.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Canonical form of a code typed by a participant.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn normalize_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput("name must not be empty".into()));
    }
    Ok(name.to_string())
}

/// Host a new room: Login → Lobby.
pub async fn create_room(
    state: &SharedState,
    session: &Arc<Session>,
    name: &str,
) -> Result<GameRecord, ServiceError> {
    let name = normalize_name(name)?;
    let store = state.require_record_store().await?;
    let config = session.config().clone();

    let work_store = store.clone();
    let host = name.clone();
    let work = move || async move {
        for attempt in 1..=config.max_code_attempts {
            let code = generate_code(config.code_length);
            match work_store
                .create(NewGameRecord::hosted_by(code.clone(), host.clone()))
                .await
            {
                Ok(record) => return Ok(record),
                Err(StorageError::Conflict { .. }) => {
                    warn!(%code, attempt, "invite code already taken; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ServiceError::Conflict(
            "could not allocate a free invite code".into(),
        ))
    };

    let session_ref = session.clone();
    let record = session
        .run_transition(StageEvent::RoomCreated, work, move |inner, record: GameRecord| {
            let identity = Identity {
                name,
                role: Role::Player1,
            };
            session_ref.attach_room(inner, store, record.clone(), identity);
            record
        })
        .await?;

    info!(session_id = %session.id(), code = %record.code, "room created");
    Ok(record)
}

/// Take the second seat of the room identified by `code`: Login → Setup.
pub async fn join_room(
    state: &SharedState,
    session: &Arc<Session>,
    name: &str,
    code: &str,
) -> Result<GameRecord, ServiceError> {
    let name = normalize_name(name)?;
    let code = normalize_code(code);
    if code.is_empty() {
        return Err(ServiceError::InvalidInput("code must not be empty".into()));
    }
    let store = state.require_record_store().await?;

    let work_store = store.clone();
    let guest = name.clone();
    let work = move || async move { claim_second_seat(work_store.as_ref(), &code, &guest).await };

    let session_ref = session.clone();
    let record = session
        .run_transition(StageEvent::RoomJoined, work, move |inner, record: GameRecord| {
            let identity = Identity {
                name,
                role: Role::Player2,
            };
            session_ref.attach_room(inner, store, record.clone(), identity);
            record
        })
        .await?;

    info!(session_id = %session.id(), code = %record.code, "room joined");
    Ok(record)
}

async fn claim_second_seat(
    store: &dyn RecordStore,
    code: &str,
    name: &str,
) -> Result<GameRecord, ServiceError> {
    let room = store
        .fetch_by_code(code.to_string())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{code}`")))?;

    if room.player2.is_some() {
        return Err(ServiceError::Conflict("room already has two players".into()));
    }
    if room.player1 == name {
        return Err(ServiceError::Conflict(format!(
            "name `{name}` is already taken in this room"
        )));
    }

    store
        .update(room.id.clone(), RecordPatch::join(name))
        .await
        .map_err(Into::into)
}

/// Set the local participant's secret through the session writer.
pub async fn set_secret(session: &Arc<Session>, digits: &str) -> Result<GameRecord, ServiceError> {
    let writer = session.writer().await?;
    writer.set_secret(digits.trim().to_string()).await
}

/// Submit a guess through the session writer.
pub async fn submit_guess(
    session: &Arc<Session>,
    digits: &str,
) -> Result<GameRecord, ServiceError> {
    let writer = session.writer().await?;
    writer.guess(digits.trim().to_string()).await
}

/// Fetch the record now and feed it through the reconciler.
pub async fn refresh(session: &Arc<Session>) -> Result<Reconciled, ServiceError> {
    let (store, record_id, _) = session
        .room_handle()
        .await
        .ok_or_else(|| ServiceError::InvalidState("no active room".into()))?;
    sync_service::fetch_into(session, store.as_ref(), &record_id)
        .await
        .map_err(Into::into)
}

/// Leave the room and delete its record: any stage → Login.
///
/// If the delete fails the session is left untouched so the participant can retry.
pub async fn reset(session: &Arc<Session>) -> Result<(), ServiceError> {
    let room = session.room_handle().await;

    let work = move || async move {
        match room {
            Some((store, record_id, false)) => match store.delete(record_id).await {
                Ok(()) => Ok(()),
                Err(err) if err.is_not_found() => Ok(()),
                Err(err) => Err(ServiceError::from(err)),
            },
            _ => Ok(()),
        }
    };

    let session_ref = session.clone();
    session
        .run_transition(StageEvent::Reset, work, move |inner, ()| {
            session_ref.detach_room(inner);
        })
        .await?;

    info!(session_id = %session.id(), "session reset");
    Ok(())
}
