/// Health check payload.
pub mod health;
/// Validated request bodies.
pub mod requests;
/// Server-sent event payloads.
pub mod sse;
/// Custom validators used by the request bodies.
pub mod validation;
/// Session and room projections.
pub mod view;
