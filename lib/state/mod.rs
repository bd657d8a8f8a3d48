use std::sync::Arc;

use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::cache::ItemCache;
use crate::db::ItemStore;

/// Shared handles for the HTTP surfaces, built once at startup.
pub struct AppState {
    pub store: Arc<dyn ItemStore>,
    pub cache: Arc<ItemCache<dyn ItemStore>>,
    pub shutdown_token: CancellationToken,
    pub registry: Arc<RwLock<Registry>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ItemStore>,
        cache: Arc<ItemCache<dyn ItemStore>>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            store,
            cache,
            shutdown_token,
            registry: Arc::new(RwLock::new(<Registry>::default())),
        }
    }
}
