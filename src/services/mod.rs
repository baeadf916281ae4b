/// OpenAPI documentation generation.
pub mod documentation;
/// Mastermind-style scoring of guesses.
pub mod feedback;
/// Health check service.
pub mod health_service;
/// Serialized writes against a session's record.
pub mod record_writer;
/// Room intents: create, join, secret, guess, refresh and reset.
pub mod room_service;
/// Registry of local sessions.
pub mod session_registry;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Record store connection supervisor.
pub mod storage_supervisor;
/// Push and poll channels feeding the reconciler.
pub mod sync_service;
/// Turn countdown and auto-guess driver.
pub mod timeout_supervisor;
/// Turn rules: guesses, secrets and timeouts.
pub mod turn_engine;
