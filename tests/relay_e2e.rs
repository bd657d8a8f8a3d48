mod common;

use std::sync::Arc;
use std::time::Duration;

use hn_relay_lib::cache::ItemCache;
use hn_relay_lib::db::{ItemStore, StoreError};
use hn_relay_lib::firebase_client::FirebaseClient;
use hn_relay_lib::queue::MemoryItemQueue;
use hn_relay_lib::relay::{pump_queue, Publisher, RelayService};
use hn_relay_lib::rpc::{self, RpcItemStore};
use hn_relay_lib::state::AppState;
use tokio_util::sync::CancellationToken;

use common::{item, job_json, spawn_app, story_json, CountingStore, MockFirebaseServer};

async fn start_rpc(store: Arc<CountingStore>) -> (String, CancellationToken) {
    let dyn_store: Arc<dyn ItemStore> = store;
    let cache = Arc::new(ItemCache::new(dyn_store.clone(), Duration::from_secs(60)));
    let state = Arc::new(AppState::new(dyn_store, cache, CancellationToken::new()));
    spawn_app(rpc::router(state)).await
}

fn rpc_client(base_url: &str) -> RpcItemStore {
    RpcItemStore::new(base_url, Duration::from_secs(5)).expect("valid rpc url")
}

#[tokio::test]
async fn published_items_reach_storage_through_the_rpc_service() {
    let mut dead = story_json(2);
    dead["dead"] = serde_json::json!(true);
    let firebase =
        MockFirebaseServer::start(vec![story_json(1), dead, job_json(3)], vec![1, 2, 3]).await;
    let storage = Arc::new(CountingStore::default());
    let (rpc_url, rpc_shutdown) = start_rpc(storage.clone()).await;

    let queue = Arc::new(MemoryItemQueue::new());
    let source = Arc::new(
        FirebaseClient::new(&firebase.base_url, Duration::from_secs(5)).expect("valid url"),
    );
    let publish = Publisher::new(source, queue.clone())
        .run(&CancellationToken::new())
        .await
        .expect("publish run");
    assert_eq!(publish.published, 2);
    assert_eq!(queue.len().await, 2);

    let relay = RelayService::new(Arc::new(rpc_client(&rpc_url)), 2).expect("valid consumers");
    let (sender, receiver) = flume::bounded(2);
    let cancel = CancellationToken::new();
    let pump = {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            pump_queue(queue.as_ref(), sender, &cancel, Duration::from_millis(5)).await
        })
    };
    let consumers = tokio::spawn(async move { relay.run(receiver).await });

    while storage.inner.len().await < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel.cancel();
    pump.await.expect("pump task");
    let summary = consumers.await.expect("relay task");

    assert_eq!(summary.relayed, 2);
    assert_eq!(summary.failures, 0);
    assert_eq!(storage.inner.get(1).await.expect("story").title, "story 1");
    assert_eq!(storage.inner.get(3).await.expect("job").type_, "job");
    assert!(storage.inner.get(2).await.is_none());
    rpc_shutdown.cancel();
}

#[tokio::test]
async fn rpc_reads_go_through_the_cache() {
    let storage = Arc::new(CountingStore::with_items(vec![
        item(1, "story"),
        item(2, "job"),
    ]));
    let (rpc_url, shutdown) = start_rpc(storage.clone()).await;
    let client = rpc_client(&rpc_url);

    let all = client.list_all().await.expect("list all");
    let again = client.list_all().await.expect("list all again");
    let jobs = client.list_by_type("job").await.expect("list jobs");

    assert_eq!(all, again);
    assert_eq!(all.len(), 2);
    assert_eq!(jobs, vec![item(2, "job")]);
    assert_eq!(storage.list_calls(), 2);
    shutdown.cancel();
}

#[tokio::test]
async fn refused_save_is_reported_as_rejected() {
    let storage = Arc::new(CountingStore::default());
    storage.reject(5);
    let (rpc_url, shutdown) = start_rpc(storage.clone()).await;
    let client = rpc_client(&rpc_url);

    client
        .upsert(&item(4, "story"))
        .await
        .expect("accepted save");
    let err = client
        .upsert(&item(5, "story"))
        .await
        .expect_err("refused save");

    assert!(matches!(err, StoreError::Rejected { id: 5 }));
    assert_eq!(storage.inner.len().await, 1);
    shutdown.cancel();
}

#[tokio::test]
async fn unreachable_rpc_service_counts_as_relay_failure() {
    let relay = RelayService::new(Arc::new(rpc_client("http://127.0.0.1:9")), 1)
        .expect("valid consumers");
    let (sender, receiver) = flume::bounded(1);
    let consumers = tokio::spawn(async move { relay.run(receiver).await });

    sender
        .send_async(item(1, "story"))
        .await
        .expect("consumer should be listening");
    drop(sender);
    let summary = consumers.await.expect("relay task");

    assert_eq!(summary.relayed, 0);
    assert_eq!(summary.failures, 1);
}
