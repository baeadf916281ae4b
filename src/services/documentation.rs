use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Number Duel.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::session_stream,
        crate::routes::sessions::create_session,
        crate::routes::sessions::get_session,
        crate::routes::sessions::close_session,
        crate::routes::sessions::create_room,
        crate::routes::sessions::join_room,
        crate::routes::sessions::set_secret,
        crate::routes::sessions::submit_guess,
        crate::routes::sessions::refresh_room,
        crate::routes::sessions::reset_room,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::requests::CreateRoomRequest,
            crate::dto::requests::JoinRoomRequest,
            crate::dto::requests::DigitsRequest,
            crate::dto::view::SessionView,
            crate::dto::view::RoomView,
            crate::dto::view::GuessStats,
            crate::dto::sse::CountdownTickEvent,
            crate::dao::models::Role,
            crate::dao::models::Guess,
            crate::dao::models::Feedback,
            crate::dao::models::Warnings,
            crate::state::stage::Stage,
            crate::state::session::PushStatus,
            crate::state::reconciler::ReconcileStats,
            crate::state::reconciler::Source,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "sessions", description = "Local participant sessions"),
        (name = "room", description = "Room intents of a session"),
    )
)]
pub struct ApiDoc;
