#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use futures::future::BoxFuture;
use hn_relay_lib::db::{ItemStore, MemoryItemStore, StoreError};
use hn_relay_lib::firebase_client::Item;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub fn story_json(id: i64) -> Value {
    serde_json::json!({
        "id": id,
        "type": "story",
        "by": "pg",
        "time": 1_700_000_000 + id,
        "title": format!("story {id}"),
        "url": format!("https://example.com/{id}"),
        "score": 10 + id,
        "kids": [id * 100, id * 100 + 1],
        "descendants": 2
    })
}

pub fn job_json(id: i64) -> Value {
    serde_json::json!({
        "id": id,
        "type": "job",
        "by": "yc",
        "time": 1_700_000_000 + id,
        "title": format!("job {id}"),
        "text": "We are hiring",
        "score": 1
    })
}

pub fn item(id: i64, type_: &str) -> Item {
    Item {
        id,
        type_: type_.to_string(),
        title: format!("{type_} {id}"),
        ..Item::default()
    }
}

struct MockFirebaseState {
    top_ids: Option<Vec<i64>>,
    items: HashMap<i64, Value>,
    failing_items: HashMap<i64, u16>,
    item_requests: AtomicUsize,
}

/// In-process stand-in for the Hacker News Firebase API.
pub struct MockFirebaseServer {
    pub base_url: String,
    state: Arc<MockFirebaseState>,
    task: tokio::task::JoinHandle<()>,
}

impl MockFirebaseServer {
    pub async fn start(items: Vec<Value>, top_ids: Vec<i64>) -> Self {
        Self::start_with_config(items, Some(top_ids), HashMap::new()).await
    }

    /// `top_ids: None` makes `topstories.json` answer 500.
    pub async fn start_with_config(
        items: Vec<Value>,
        top_ids: Option<Vec<i64>>,
        failing_items: HashMap<i64, u16>,
    ) -> Self {
        let items = items
            .into_iter()
            .map(|value| {
                let id = value["id"].as_i64().expect("mock item needs a numeric id");
                (id, value)
            })
            .collect();
        let state = Arc::new(MockFirebaseState {
            top_ids,
            items,
            failing_items,
            item_requests: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/v0/topstories.json", get(top_stories_handler))
            .route("/v0/item/{item_path}", get(item_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock firebase listener");
        let addr = listener
            .local_addr()
            .expect("mock firebase listener should have a local address");

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("mock firebase axum server failed");
        });

        Self {
            base_url: format!("http://{addr}/v0"),
            state,
            task,
        }
    }

    pub fn item_requests(&self) -> usize {
        self.state.item_requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockFirebaseServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn top_stories_handler(
    State(state): State<Arc<MockFirebaseState>>,
) -> (StatusCode, Json<Value>) {
    match &state.top_ids {
        Some(ids) => (StatusCode::OK, Json(serde_json::json!(ids))),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "scripted failure" })),
        ),
    }
}

async fn item_handler(
    AxumPath(item_path): AxumPath<String>,
    State(state): State<Arc<MockFirebaseState>>,
) -> (StatusCode, Json<Value>) {
    state.item_requests.fetch_add(1, Ordering::SeqCst);
    let item_id = item_path
        .trim_end_matches(".json")
        .parse::<i64>()
        .expect("mock item path should contain numeric id");

    if let Some(status) = state.failing_items.get(&item_id) {
        let code = StatusCode::from_u16(*status).expect("configured status should be valid");
        return (
            code,
            Json(serde_json::json!({ "error": format!("scripted status {status}") })),
        );
    }

    let payload = state.items.get(&item_id).cloned().unwrap_or(Value::Null);
    (StatusCode::OK, Json(payload))
}

/// Serves `app` on an ephemeral port until the returned token is cancelled.
pub async fn spawn_app(app: Router) -> (String, CancellationToken) {
    let shutdown_token = CancellationToken::new();
    let (addr, _handle): (SocketAddr, _) = hn_relay_lib::server::serve(
        app,
        SocketAddr::from(([127, 0, 0, 1], 0)),
        shutdown_token.clone(),
    )
    .await
    .expect("test server should bind");
    (format!("http://{addr}"), shutdown_token)
}

/// Memory store that counts list calls and can be told to fail.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryItemStore,
    list_calls: AtomicUsize,
    failing: Mutex<bool>,
    rejected_ids: Mutex<HashSet<i64>>,
}

impl CountingStore {
    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            inner: MemoryItemStore::with_items(items),
            ..Self::default()
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("failing mutex poisoned") = failing;
    }

    pub fn reject(&self, item_id: i64) {
        self.rejected_ids
            .lock()
            .expect("rejected mutex poisoned")
            .insert(item_id);
    }

    fn check(&self) -> Result<(), StoreError> {
        if *self.failing.lock().expect("failing mutex poisoned") {
            return Err(StoreError::Unavailable("database is down".to_string()));
        }
        Ok(())
    }
}

impl ItemStore for CountingStore {
    fn upsert<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if self
                .rejected_ids
                .lock()
                .expect("rejected mutex poisoned")
                .contains(&item.id)
            {
                return Err(StoreError::Unavailable(format!("refusing item {}", item.id)));
            }
            self.inner.upsert(item).await
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Item>, StoreError>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.list_all().await
        })
    }

    fn list_by_type<'a>(&'a self, type_: &'a str) -> BoxFuture<'a, Result<Vec<Item>, StoreError>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.list_by_type(type_).await
        })
    }
}
