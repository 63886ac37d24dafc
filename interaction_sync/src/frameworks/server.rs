// Framework bootstrap for the interaction relay runtime.

use crate::frameworks::config;
use crate::interface_adapters::net::{
    despawn_object_handler, health_handler, spawn_object_handler, ws_handler,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{SessionSettings, spawn_session};

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/objects", post(spawn_object_handler))
        .route("/objects/{object_id}", delete(despawn_object_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    // build state
    let state = build_state();
    let session = state.session.clone();
    // Start the Web Server
    let app = router(state);

    tracing::info!(%address, host_id = session.host_id, "listening");

    // Serve app and report errors rather than panicking
    let result = axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    });
    session.shutdown();
    result
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::relay_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state() -> Arc<AppState> {
    let settings = SessionSettings {
        host_id: config::HOST_PARTICIPANT_ID,
        event_channel_capacity: config::event_channel_capacity(),
        broadcast_capacity: config::broadcast_capacity(),
    };
    tracing::debug!(
        event_channel_capacity = settings.event_channel_capacity,
        broadcast_capacity = settings.broadcast_capacity,
        "session configured"
    );

    // The session task owns the host authority for every replicated object.
    let session = spawn_session(settings);

    Arc::new(AppState { session })
}
