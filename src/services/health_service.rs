use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether a record store is installed and answering.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let Some(store) = state.record_store().await else {
        warn!("record store unavailable (degraded mode)");
        return HealthResponse::degraded();
    };

    match store.health_check().await {
        Ok(()) => HealthResponse::ok(),
        Err(err) => {
            warn!(error = %err, "record store health check failed");
            HealthResponse::degraded()
        }
    }
}
