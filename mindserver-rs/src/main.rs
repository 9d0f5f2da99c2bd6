mod error;
mod handlers;
mod hub;
mod models;
mod registry;
mod ws;

use crate::handlers::AppState;
use crate::hub::SessionHub;
use axum::{
    routing::{get, post},
    Router,
};
use mindserver_sdk_rs::config::{GatewayConfig, HubConfig};
use mindserver_sdk_rs::gateway::Gateway;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/health", get(handlers::health))
        .route("/agents", get(handlers::agents))
        // Gateway routes
        .route("/completions", post(handlers::create_completion))
        .route("/api/completions", post(handlers::create_completion))
        .route("/api/create_completions", post(handlers::create_completion))
        .route("/embeddings", post(handlers::create_embedding))
        .route("/api/embeddings", post(handlers::create_embedding))
        // Hub
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    mindserver_sdk_rs::logger::init_logging("mindserver");

    let hub_config = HubConfig::from_env()?;
    let gateway_config = GatewayConfig::from_env()?;

    let gateway = Gateway::from_config(&gateway_config)?;
    tracing::info!("Default provider: {}", gateway.default_provider());
    let state = Arc::new(AppState::new(
        SessionHub::new(hub_config.shutdown_grace),
        gateway,
    ));
    let hub = state.hub.clone();

    let listener = TcpListener::bind(hub_config.bind_addr()).await?;
    tracing::info!("MindServer listening on {}", listener.local_addr()?);

    tokio::select! {
        result = axum::serve(listener, app(state)).into_future() => result?,
        _ = hub.shutdown_signal() => tracing::info!("Hub shut down"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }
    Ok(())
}
