use crate::error::ApiError;
use crate::hub::SessionHub;
use crate::models::{CompletionResponse, EmbeddingItem, HealthResponse};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use mindserver_sdk_rs::gateway::Gateway;
use mindserver_sdk_rs::llm::{CompletionRequest, EmbeddingRequest};
use std::sync::Arc;

pub struct AppState {
    pub hub: Arc<SessionHub>,
    pub gateway: Arc<Gateway>,
}

impl AppState {
    pub fn new(hub: SessionHub, gateway: Gateway) -> Self {
        Self {
            hub: Arc::new(hub),
            gateway: Arc::new(gateway),
        }
    }
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

pub async fn agents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.hub.snapshot().await)
}

/// 201 for a fresh completion, 200 when served from the cache.
pub async fn create_completion(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompletionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.gateway.create_completion(&req).await?;
    let status = if result.cached {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(CompletionResponse {
            content: result.content,
        }),
    ))
}

pub async fn create_embedding(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmbeddingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.gateway.create_embedding(&req).await?;
    let status = if result.cached {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let items: Vec<EmbeddingItem> = result
        .embeddings
        .into_iter()
        .map(|embedding| EmbeddingItem { embedding })
        .collect();
    Ok((status, Json(items)))
}
