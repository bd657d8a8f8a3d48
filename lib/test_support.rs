use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::db::{ItemStore, MemoryItemStore, StoreError};
use crate::firebase_client::{FirebaseClientError, Item, ItemSource};

pub(crate) fn story(id: i64) -> Item {
    Item {
        id,
        type_: "story".to_string(),
        by: "alice".to_string(),
        time: 1_700_000_000,
        title: format!("item-{id}"),
        url: "https://example.com".to_string(),
        score: 42,
        ..Item::default()
    }
}

pub(crate) fn job(id: i64) -> Item {
    Item {
        type_: "job".to_string(),
        ..story(id)
    }
}

pub(crate) fn dead(id: i64) -> Item {
    Item {
        dead: true,
        ..story(id)
    }
}

pub(crate) fn deleted(id: i64) -> Item {
    Item {
        deleted: true,
        ..story(id)
    }
}

fn upstream_unavailable(resource: String) -> FirebaseClientError {
    FirebaseClientError::UnexpectedStatus {
        resource,
        status: 503,
    }
}

/// Scripted item source. Unknown ids fail with a 503-style error.
#[derive(Default)]
pub(crate) struct MockSource {
    top_ids: Mutex<Option<Vec<i64>>>,
    items: Mutex<HashMap<i64, Option<Item>>>,
    fetch_calls: AtomicUsize,
    fetch_delay: Mutex<Duration>,
    cancel_after_fetches: Mutex<Option<(usize, CancellationToken)>>,
}

impl MockSource {
    pub(crate) fn with_items(items: Vec<Item>) -> Self {
        let source = Self::default();
        *source.top_ids.lock().expect("top_ids mutex poisoned") =
            Some(items.iter().map(|item| item.id).collect());
        {
            let mut scripted = source.items.lock().expect("items mutex poisoned");
            for item in items {
                scripted.insert(item.id, Some(item));
            }
        }
        source
    }

    pub(crate) fn with_top_ids(self, ids: Vec<i64>) -> Self {
        *self.top_ids.lock().expect("top_ids mutex poisoned") = Some(ids);
        self
    }

    pub(crate) fn failing_top_ids(self) -> Self {
        *self.top_ids.lock().expect("top_ids mutex poisoned") = None;
        self
    }

    pub(crate) fn with_missing(self, item_id: i64) -> Self {
        self.items
            .lock()
            .expect("items mutex poisoned")
            .insert(item_id, None);
        self
    }

    pub(crate) fn with_fetch_delay(self, delay: Duration) -> Self {
        *self.fetch_delay.lock().expect("delay mutex poisoned") = delay;
        self
    }

    /// Cancels `token` from inside the `n`-th fetch call.
    pub(crate) fn cancel_on_fetch(self, n: usize, token: CancellationToken) -> Self {
        *self
            .cancel_after_fetches
            .lock()
            .expect("cancel mutex poisoned") = Some((n, token));
        self
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl ItemSource for MockSource {
    fn list_top_identifiers(&self) -> BoxFuture<'_, Result<Vec<i64>, FirebaseClientError>> {
        Box::pin(async move {
            self.top_ids
                .lock()
                .expect("top_ids mutex poisoned")
                .clone()
                .ok_or_else(|| upstream_unavailable("topstories".to_string()))
        })
    }

    fn get_item(&self, item_id: i64) -> BoxFuture<'_, Result<Option<Item>, FirebaseClientError>> {
        Box::pin(async move {
            let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((n, token)) = self
                .cancel_after_fetches
                .lock()
                .expect("cancel mutex poisoned")
                .as_ref()
            {
                if call == *n {
                    token.cancel();
                }
            }

            let delay = *self.fetch_delay.lock().expect("delay mutex poisoned");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.items
                .lock()
                .expect("items mutex poisoned")
                .get(&item_id)
                .cloned()
                .ok_or_else(|| upstream_unavailable(format!("item {item_id}")))
        })
    }
}

/// Memory-backed store that counts calls and can fail on demand.
#[derive(Default)]
pub(crate) struct MockStore {
    pub(crate) inner: MemoryItemStore,
    upsert_calls: Mutex<Vec<i64>>,
    list_all_calls: AtomicUsize,
    list_by_type_calls: Mutex<Vec<String>>,
    failing_upserts: Mutex<HashSet<i64>>,
    list_failures: Mutex<VecDeque<String>>,
    list_delay: Mutex<Duration>,
}

impl MockStore {
    pub(crate) fn with_items(items: Vec<Item>) -> Self {
        Self {
            inner: MemoryItemStore::with_items(items),
            ..Self::default()
        }
    }

    pub(crate) fn failing_upsert_for(self, item_id: i64) -> Self {
        self.failing_upserts
            .lock()
            .expect("failing_upserts mutex poisoned")
            .insert(item_id);
        self
    }

    /// The next list call fails with `message`; later calls succeed again.
    pub(crate) fn fail_next_list(&self, message: &str) {
        self.list_failures
            .lock()
            .expect("list_failures mutex poisoned")
            .push_back(message.to_string());
    }

    pub(crate) fn with_list_delay(self, delay: Duration) -> Self {
        *self.list_delay.lock().expect("delay mutex poisoned") = delay;
        self
    }

    pub(crate) fn upserted_ids(&self) -> Vec<i64> {
        self.upsert_calls
            .lock()
            .expect("upsert_calls mutex poisoned")
            .clone()
    }

    pub(crate) fn list_all_calls(&self) -> usize {
        self.list_all_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn list_by_type_calls(&self) -> Vec<String> {
        self.list_by_type_calls
            .lock()
            .expect("list_by_type_calls mutex poisoned")
            .clone()
    }

    async fn before_list(&self) -> Result<(), StoreError> {
        let delay = *self.list_delay.lock().expect("delay mutex poisoned");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self
            .list_failures
            .lock()
            .expect("list_failures mutex poisoned")
            .pop_front()
        {
            Some(message) => Err(StoreError::Unavailable(message)),
            None => Ok(()),
        }
    }
}

impl ItemStore for MockStore {
    fn upsert<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.upsert_calls
                .lock()
                .expect("upsert_calls mutex poisoned")
                .push(item.id);
            if self
                .failing_upserts
                .lock()
                .expect("failing_upserts mutex poisoned")
                .contains(&item.id)
            {
                return Err(StoreError::Unavailable(format!(
                    "scripted upsert failure for item {}",
                    item.id
                )));
            }
            self.inner.upsert(item).await
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Item>, StoreError>> {
        Box::pin(async move {
            self.list_all_calls.fetch_add(1, Ordering::SeqCst);
            self.before_list().await?;
            self.inner.list_all().await
        })
    }

    fn list_by_type<'a>(&'a self, type_: &'a str) -> BoxFuture<'a, Result<Vec<Item>, StoreError>> {
        Box::pin(async move {
            self.list_by_type_calls
                .lock()
                .expect("list_by_type_calls mutex poisoned")
                .push(type_.to_string());
            self.before_list().await?;
            self.inner.list_by_type(type_).await
        })
    }
}
