//! Builders for the events sent on a session's SSE stream.

use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        sse::{CountdownTickEvent, ServerEvent},
        view::SessionView,
    },
    state::sse::SseHub,
};

const EVENT_SESSION_VIEW: &str = "session.view";
const EVENT_COUNTDOWN_TICK: &str = "countdown.tick";
const EVENT_INFO: &str = "info";

/// Broadcast the session view after any reconciled or local change.
pub fn broadcast_view(hub: &SseHub, view: &SessionView) {
    send_event(hub, EVENT_SESSION_VIEW, view);
}

/// Broadcast the seconds left in the running turn.
pub fn broadcast_tick(hub: &SseHub, remaining: u32) {
    send_event(hub, EVENT_COUNTDOWN_TICK, &CountdownTickEvent { remaining });
}

/// Send a human-readable info message.
pub fn broadcast_info(hub: &SseHub, message: &str) {
    hub.broadcast(ServerEvent::new(
        Some(EVENT_INFO.to_string()),
        message.to_string(),
    ));
}

fn send_event<T: Serialize>(hub: &SseHub, event: &str, payload: &T) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => hub.broadcast(message),
        Err(err) => warn!(event, error = %err, "failed to serialise SSE payload"),
    }
}
