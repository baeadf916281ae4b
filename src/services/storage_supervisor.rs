//! Background task keeping a record store installed.
//!
//! Connects with back-off, then health-checks the store and drops it after
//! repeated failures so the application switches to degraded mode.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{record_store::RecordStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_FAILED_CHECKS: u32 = 3;

/// Connect to the record store and keep the shared state in degraded mode while it is unavailable.
///
/// A store that fails [`MAX_FAILED_CHECKS`] health checks in a row is dropped and
/// `connect` is called again with exponential backoff.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RecordStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_record_store(store.clone()).await;
                info!("record store connected; leaving degraded mode");
                delay = INITIAL_DELAY;
                watch_health(&state, store.as_ref()).await;
                warn!("record store unhealthy; entering degraded mode");
                state.clear_record_store().await;
            }
            Err(err) => {
                warn!(error = %err, "record store connection attempt failed");
            }
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Return once the store has failed too many consecutive health checks.
async fn watch_health(state: &SharedState, store: &dyn RecordStore) {
    let mut failures = 0;

    loop {
        sleep(HEALTH_POLL_INTERVAL).await;
        match store.health_check().await {
            Ok(()) => {
                if failures > 0 {
                    info!(failures, "record store healthy again");
                }
                failures = 0;
            }
            Err(err) => {
                failures += 1;
                warn!(attempt = failures, error = %err, "record store health check failed");
                if failures >= MAX_FAILED_CHECKS {
                    return;
                }
            }
        }
        if state.is_degraded().await {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig, dao::record_store::memory::MemoryRecordStore, state::AppState,
    };

    #[tokio::test(start_paused = true)]
    async fn installs_store_and_drops_it_when_unhealthy() {
        let state = AppState::new(AppConfig::default());
        let store = MemoryRecordStore::new();
        let handle = {
            let state = state.clone();
            let store = store.clone();
            tokio::spawn(run(state, move || {
                let store = store.clone();
                async move {
                    store.health_check().await?;
                    Ok::<Arc<dyn RecordStore>, StorageError>(Arc::new(store))
                }
            }))
        };

        let mut degraded = state.degraded_watcher();
        tokio::time::timeout(Duration::from_secs(5), degraded.wait_for(|value| !*value))
            .await
            .expect("supervisor should connect")
            .expect("watch sender alive");

        store.set_offline(true);
        tokio::time::timeout(Duration::from_secs(60), degraded.wait_for(|value| *value))
            .await
            .expect("supervisor should enter degraded mode")
            .expect("watch sender alive");

        store.set_offline(false);
        tokio::time::timeout(Duration::from_secs(60), degraded.wait_for(|value| !*value))
            .await
            .expect("supervisor should reconnect")
            .expect("watch sender alive");

        handle.abort();
    }
}
