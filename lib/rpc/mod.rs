use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use futures::future::BoxFuture;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::db::{ItemStore, StoreError};
use crate::firebase_client::Item;
use crate::server::{self, ApiError, ItemsResponse};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveItemResponse {
    pub id: i64,
    pub success: bool,
}

async fn save_item(
    state: State<Arc<AppState>>,
    Json(item): Json<Item>,
) -> (StatusCode, Json<SaveItemResponse>) {
    match state.store.upsert(&item).await {
        Ok(()) => {
            debug!(event = "rpc_item_saved", item_id = item.id, "item saved");
            (
                StatusCode::OK,
                Json(SaveItemResponse {
                    id: item.id,
                    success: true,
                }),
            )
        }
        Err(err) => {
            error!(
                event = "rpc_save_failed",
                item_id = item.id,
                error = %err,
                "failed to save item to the database"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SaveItemResponse {
                    id: item.id,
                    success: false,
                }),
            )
        }
    }
}

async fn list_items(state: State<Arc<AppState>>) -> Result<Json<ItemsResponse>, ApiError> {
    let items = state.cache.get_all().await?;
    Ok(Json(ItemsResponse {
        items: items.as_ref().clone(),
    }))
}

async fn list_items_by_type(
    state: State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> Result<Json<ItemsResponse>, ApiError> {
    let items = state.cache.get_by_type(&tag).await?;
    Ok(Json(ItemsResponse {
        items: items.as_ref().clone(),
    }))
}

/// Storage service reached by relay consumers. Reads go through the cache, writes do not.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rpc/items", get(list_items).post(save_item))
        .route("/rpc/items/type/{tag}", get(list_items_by_type))
        .with_state(state.clone())
        .merge(server::ops_router(state.registry.clone()))
}

/// [`ItemStore`] that forwards every call to a remote storage service.
pub struct RpcItemStore {
    client: reqwest::Client,
    base_url: String,
}

impl RpcItemStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base_url = base_url.trim().trim_end_matches('/');
        Url::parse(base_url).map_err(|err| {
            StoreError::Unavailable(format!("invalid rpc URL {base_url:?}: {err}"))
        })?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    async fn save(&self, item: &Item) -> Result<(), StoreError> {
        let url = format!("{}/rpc/items", self.base_url);
        let response = self.client.post(&url).json(item).send().await?;
        let status = response.status();

        // A failing server still reports which item it refused.
        match response.json::<SaveItemResponse>().await {
            Ok(body) if !body.success => Err(StoreError::Rejected { id: body.id }),
            Ok(_) if status.is_success() => Ok(()),
            _ => Err(StoreError::UnexpectedStatus {
                operation: "save item".to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn fetch_items(&self, path: &str, operation: &str) -> Result<Vec<Item>, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::UnexpectedStatus {
                operation: operation.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json::<ItemsResponse>().await?.items)
    }
}

impl ItemStore for RpcItemStore {
    fn upsert<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.save(item))
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Item>, StoreError>> {
        Box::pin(self.fetch_items("/rpc/items", "list items"))
    }

    fn list_by_type<'a>(&'a self, type_: &'a str) -> BoxFuture<'a, Result<Vec<Item>, StoreError>> {
        Box::pin(async move {
            self.fetch_items(&format!("/rpc/items/type/{type_}"), "list items by type")
                .await
        })
    }
}
