//! Number Duel binary entrypoint wiring REST, SSE, and the record store layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use number_duel::{
    config::AppConfig,
    dao::{
        record_store::{RecordStore, memory::MemoryRecordStore},
        storage::StorageError,
    },
    routes,
    services::{session_registry, storage_supervisor},
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());

    spawn_storage_supervisor(app_state.clone());
    session_registry::spawn_reaper(app_state.clone());
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the record store backend and keep it connected in the background.
///
/// CouchDB is used when `COUCH_BASE_URL` is set; otherwise every session hosted
/// by this process shares an in-memory store.
fn spawn_storage_supervisor(state: SharedState) {
    #[cfg(feature = "couch-store")]
    if env::var("COUCH_BASE_URL").is_ok() {
        use number_duel::dao::record_store::couchdb::{CouchConfig, CouchRecordStore};

        info!("using CouchDB record store");
        tokio::spawn(storage_supervisor::run(state, || async {
            let config = CouchConfig::from_env()?;
            let store = CouchRecordStore::connect(config).await?;
            Ok::<Arc<dyn RecordStore>, StorageError>(Arc::new(store))
        }));
        return;
    }

    info!("COUCH_BASE_URL not set; using in-memory record store");
    let store = MemoryRecordStore::new();
    tokio::spawn(storage_supervisor::run(state, move || {
        let store = store.clone();
        async move { Ok::<Arc<dyn RecordStore>, StorageError>(Arc::new(store)) }
    }));
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
