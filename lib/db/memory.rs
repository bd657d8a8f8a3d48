use std::collections::BTreeMap;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use super::{ItemStore, StoreError};
use crate::firebase_client::Item;

/// In-process store with the same upsert and ordering semantics as `PgItemStore`.
#[derive(Default)]
pub struct MemoryItemStore {
    items: RwLock<BTreeMap<i64, Item>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|item| (item.id, item)).collect()),
        }
    }

    pub async fn get(&self, item_id: i64) -> Option<Item> {
        self.items.read().await.get(&item_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

impl ItemStore for MemoryItemStore {
    fn upsert<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.items.write().await.insert(item.id, item.clone());
            Ok(())
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Item>, StoreError>> {
        Box::pin(async move { Ok(self.items.read().await.values().cloned().collect()) })
    }

    fn list_by_type<'a>(&'a self, type_: &'a str) -> BoxFuture<'a, Result<Vec<Item>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .items
                .read()
                .await
                .values()
                .filter(|item| item.type_ == type_)
                .cloned()
                .collect())
        })
    }
}
