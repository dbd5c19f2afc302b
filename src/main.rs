mod api;
mod config;
mod engine;
mod error;
mod gateway;
mod geo;
mod lock;
mod models;
mod observability;
mod persist;
mod sessions;
mod state;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::gateway::{Gateway, NoopGateway};
use crate::observability::metrics::Metrics;
use crate::persist::Store;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    tracing::info!(
        admin_id = ?config.admin_id,
        data_file = %config.data_file.display(),
        log_rotate_bytes = config.log_rotate_bytes,
        gateway_configured = config.gateway_token.is_some(),
        "config loaded"
    );

    let document = persist::load(&config.data_file).await;
    let metrics = Metrics::new();
    let store = Store::spawn(config.data_file.clone(), metrics.clone());
    // the real messaging transport plugs in here
    let gw: Arc<dyn Gateway> = Arc::new(NoopGateway);

    let shared_state = Arc::new(AppState::new(
        store,
        gw,
        config.admin_id,
        config.locks_dir.clone(),
        metrics,
    ));
    shared_state.hydrate(document);

    let dropped = sessions::rehydrate(&shared_state).await;
    if dropped > 0 {
        tracing::warn!(dropped, "dropped stale sessions at startup");
    }

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    // drain the write queue before exiting
    shared_state.flush().await;
    tracing::info!("write queue flushed; bye");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
