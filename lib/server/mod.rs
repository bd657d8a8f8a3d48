pub mod monitoring;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cache::CacheError;
use crate::firebase_client::Item;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemsResponse {
    pub items: Vec<Item>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Any read failure surfaces as a 500 with the error chain in the body.
pub struct ApiError(CacheError);

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = crate::logging::error_chain(&self.0);
        error!(event = "read_request_failed", error = %message, "read request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: message }),
        )
            .into_response()
    }
}

async fn health_handler() -> String {
    "Healthy".to_string()
}

async fn expose_metrics(State(registry): State<Arc<RwLock<Registry>>>) -> Response {
    let mut buffer = String::new();
    let registry = registry.read().await;
    match encode(&mut buffer, &registry) {
        Ok(()) => buffer.into_response(),
        Err(err) => {
            error!(event = "metrics_encode_failed", error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn all_items(state: State<Arc<AppState>>) -> Result<Json<ItemsResponse>, ApiError> {
    let items = state.cache.get_all().await?;
    Ok(Json(ItemsResponse {
        items: items.as_ref().clone(),
    }))
}

async fn stories(state: State<Arc<AppState>>) -> Result<Json<ItemsResponse>, ApiError> {
    let items = state.cache.get_stories().await?;
    Ok(Json(ItemsResponse {
        items: items.as_ref().clone(),
    }))
}

async fn jobs(state: State<Arc<AppState>>) -> Result<Json<ItemsResponse>, ApiError> {
    let items = state.cache.get_jobs().await?;
    Ok(Json(ItemsResponse {
        items: items.as_ref().clone(),
    }))
}

async fn flush_cache(state: State<Arc<AppState>>) -> StatusCode {
    state.cache.flush().await;
    StatusCode::NO_CONTENT
}

/// Health and metrics routes, served by every mode.
pub fn ops_router(registry: Arc<RwLock<Registry>>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(expose_metrics))
        .with_state(registry)
}

/// Public read API served from the cache.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/all", get(all_items))
        .route("/stories", get(stories))
        .route("/jobs", get(jobs))
        .route("/cache/flush", post(flush_cache))
        .with_state(state.clone())
        .merge(ops_router(state.registry.clone()))
}

/// Registers the process metric families on `registry`.
pub async fn register_metrics(registry: &RwLock<Registry>) {
    let mut registry = registry.write().await;
    monitoring::register_all(&mut registry).await;
}

/// Binds `addr` and serves `app` until `shutdown_token` is cancelled.
///
/// Returns the bound address, which differs from `addr` when binding port 0.
pub async fn serve(
    app: Router,
    addr: SocketAddr,
    shutdown_token: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<Result<(), std::io::Error>>), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(event = "http_listening", addr = %local_addr, "http server listening");

    let server_handle = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
        })
        .await
    });

    Ok((local_addr, server_handle))
}
