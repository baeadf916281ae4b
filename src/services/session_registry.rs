//! Local sessions hosted by this process, one per participant.

use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::room_service,
    state::{SharedState, session::Session},
};

const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// Open a new local session in the login stage.
pub fn create_session(state: &SharedState) -> Arc<Session> {
    let session = Session::new(state.config().clone(), state.generator());
    state.sessions().insert(session.id(), session.clone());
    info!(session_id = %session.id(), "session created");
    session
}

/// Look up a session and mark it as active.
pub fn get_session(state: &SharedState, id: Uuid) -> Result<Arc<Session>, ServiceError> {
    let session = state
        .sessions()
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| ServiceError::NotFound(format!("session `{id}`")))?;
    session.touch();
    Ok(session)
}

/// Reset the session (deleting its record, if any) and forget it.
pub async fn close_session(state: &SharedState, id: Uuid) -> Result<(), ServiceError> {
    let session = get_session(state, id)?;
    room_service::reset(&session).await?;
    state.sessions().remove(&id);
    info!(session_id = %id, "session closed");
    Ok(())
}

/// Drop every session idle for longer than the configured timeout.
///
/// Abandoned sessions are reset like an explicit close. If the reset fails the
/// session is dropped anyway, which stops its background tasks.
pub async fn reap_idle(state: &SharedState) -> usize {
    let limit = state.config().session_idle_timeout();
    let idle: Vec<Arc<Session>> = state
        .sessions()
        .iter()
        .filter(|entry| entry.value().idle_for() >= limit)
        .map(|entry| entry.value().clone())
        .collect();

    for session in &idle {
        if let Err(err) = room_service::reset(session).await {
            warn!(session_id = %session.id(), error = %err, "reset of idle session failed");
        }
        state.sessions().remove(&session.id());
        info!(session_id = %session.id(), "idle session reaped");
    }
    idle.len()
}

/// Periodically reap idle sessions for the lifetime of the process.
pub fn spawn_reaper(state: SharedState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(REAP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            reap_idle(&state).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    fn state() -> SharedState {
        AppState::new(AppConfig {
            session_idle_timeout_secs: 60,
            ..AppConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_reaped_and_active_ones_kept() {
        let state = state();
        let idle = create_session(&state);
        let active = create_session(&state);

        tokio::time::sleep(Duration::from_secs(45)).await;
        get_session(&state, active.id()).unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(reap_idle(&state).await, 1);
        assert!(get_session(&state, idle.id()).is_err());
        assert!(get_session(&state, active.id()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn open_streams_keep_a_session_alive() {
        let state = state();
        let session = create_session(&state);
        let _stream = session.hub().subscribe();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(reap_idle(&state).await, 0);
        assert_eq!(state.sessions().len(), 1);
    }
}
