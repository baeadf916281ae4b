//! Library crate for number-duel, exposing modules for binaries and integration tests.

/// Runtime configuration loaded from `config/app.json`.
pub mod config;
/// Persistence layer: record models, the store trait and its backends.
pub mod dao;
/// Request and response payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Session, room and background services.
pub mod services;
/// Shared application state and per-session state.
pub mod state;
