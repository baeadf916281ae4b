//! Session lifecycle and room intents.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        requests::{CreateRoomRequest, DigitsRequest, JoinRoomRequest},
        view::SessionView,
    },
    error::AppError,
    services::{room_service, session_registry},
    state::SharedState,
};

/// Routes driving a local session through the game.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session).delete(close_session))
        .route("/sessions/{id}/room", post(create_room))
        .route("/sessions/{id}/room/join", post(join_room))
        .route("/sessions/{id}/room/secret", post(set_secret))
        .route("/sessions/{id}/room/guess", post(submit_guess))
        .route("/sessions/{id}/room/refresh", post(refresh_room))
        .route("/sessions/{id}/room/reset", post(reset_room))
}

/// Open a new session in the login stage.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    responses((status = 201, description = "Session opened", body = SessionView))
)]
pub async fn create_session(
    State(state): State<SharedState>,
) -> (StatusCode, Json<SessionView>) {
    let session = session_registry::create_session(&state);
    (StatusCode::CREATED, Json(session.view().await))
}

/// Current view of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session view", body = SessionView),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = session_registry::get_session(&state, id)?;
    Ok(Json(session.view().await))
}

/// Reset the session, deleting its room record, and forget it.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Unknown session"),
        (status = 503, description = "Record could not be deleted")
    )
)]
pub async fn close_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_registry::close_session(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Host a new room and wait for an opponent.
#[utoipa::path(
    post,
    path = "/sessions/{id}/room",
    tag = "room",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created; session in lobby", body = SessionView),
        (status = 409, description = "Session is not in the login stage"),
        (status = 503, description = "Record store unavailable")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let session = session_registry::get_session(&state, id)?;
    room_service::create_room(&state, &session, &payload.name).await?;
    Ok(Json(session.view().await))
}

/// Take the second seat of a room.
#[utoipa::path(
    post,
    path = "/sessions/{id}/room/join",
    tag = "room",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Room joined; session in setup", body = SessionView),
        (status = 404, description = "No room with that code"),
        (status = 409, description = "Room full or name taken")
    )
)]
/// Join a room by invite code.
pub async fn join_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<JoinRoomRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let session = session_registry::get_session(&state, id)?;
    room_service::join_room(&state, &session, &payload.name, &payload.code).await?;
    Ok(Json(session.view().await))
}

/// Choose the local participant's secret.
#[utoipa::path(
    post,
    path = "/sessions/{id}/room/secret",
    tag = "room",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = DigitsRequest,
    responses(
        (status = 200, description = "Secret stored", body = SessionView),
        (status = 400, description = "Not four digits"),
        (status = 409, description = "Secret already set or wrong stage")
    )
)]
/// Set the viewer's secret.
pub async fn set_secret(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<DigitsRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let session = session_registry::get_session(&state, id)?;
    room_service::set_secret(&session, &payload.digits).await?;
    Ok(Json(session.view().await))
}

/// Guess the opponent's secret.
#[utoipa::path(
    post,
    path = "/sessions/{id}/room/guess",
    tag = "room",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = DigitsRequest,
    responses(
        (status = 200, description = "Guess recorded", body = SessionView),
        (status = 400, description = "Not four digits"),
        (status = 409, description = "Not this participant's turn or game over")
    )
)]
/// Guess the opponent's secret.
pub async fn submit_guess(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<DigitsRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let session = session_registry::get_session(&state, id)?;
    room_service::submit_guess(&session, &payload.digits).await?;
    Ok(Json(session.view().await))
}

/// Fetch the room record now instead of waiting for the next poll.
#[utoipa::path(
    post,
    path = "/sessions/{id}/room/refresh",
    tag = "room",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session view after the fetch", body = SessionView),
        (status = 503, description = "Fetch failed; previous view kept")
    )
)]
/// Fetch the record now and reconcile it.
pub async fn refresh_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = session_registry::get_session(&state, id)?;
    room_service::refresh(&session).await?;
    Ok(Json(session.view().await))
}

/// Leave the room, delete its record and go back to login.
#[utoipa::path(
    post,
    path = "/sessions/{id}/room/reset",
    tag = "room",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session back in login", body = SessionView),
        (status = 503, description = "Record could not be deleted")
    )
)]
/// Leave the room and delete its record.
pub async fn reset_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = session_registry::get_session(&state, id)?;
    room_service::reset(&session).await?;
    Ok(Json(session.view().await))
}
