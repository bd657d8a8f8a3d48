use std::sync::Arc;

use tracing::{debug, warn};

use super::types::{ItemOutcome, WorkerTally};
use crate::db::ItemStore;
use crate::firebase_client::ItemSource;
use crate::server::monitoring::INGEST_METRICS;

/// Fetches one id and upserts it if it is live. Failures are logged and reported, never raised.
pub async fn process_item<S, P>(source: &S, store: &P, item_id: i64) -> ItemOutcome
where
    S: ItemSource + ?Sized,
    P: ItemStore + ?Sized,
{
    let item = match source.get_item(item_id).await {
        Ok(Some(item)) => item,
        Ok(None) => {
            debug!(event = "item_missing", item_id, "upstream returned no item");
            return ItemOutcome::Missing;
        }
        Err(err) => {
            warn!(
                event = "item_fetch_failed",
                item_id,
                error = %err,
                "failed to fetch item"
            );
            return ItemOutcome::FetchFailed;
        }
    };

    if !item.is_live() {
        debug!(
            event = "item_skipped",
            item_id,
            dead = item.dead,
            deleted = item.deleted,
            "skipping dead or deleted item"
        );
        return ItemOutcome::SkippedNotLive;
    }

    match store.upsert(&item).await {
        Ok(()) => ItemOutcome::Persisted,
        Err(err) => {
            warn!(
                event = "item_persist_failed",
                item_id,
                error = %err,
                "failed to persist item"
            );
            ItemOutcome::PersistFailed
        }
    }
}

/// Pulls ids until every sender is gone, then reports what it handled.
pub async fn run_worker<S, P>(
    worker_idx: usize,
    source: Arc<S>,
    store: Arc<P>,
    receiver: flume::Receiver<i64>,
) -> WorkerTally
where
    S: ItemSource + ?Sized,
    P: ItemStore + ?Sized,
{
    let mut tally = WorkerTally::default();

    while let Ok(item_id) = receiver.recv_async().await {
        let outcome = process_item(source.as_ref(), store.as_ref(), item_id).await;
        if let Some(m) = INGEST_METRICS.get() {
            match outcome {
                ItemOutcome::Persisted => m.items_persisted.inc(),
                ItemOutcome::SkippedNotLive | ItemOutcome::Missing => m.items_skipped.inc(),
                ItemOutcome::FetchFailed => m.fetch_failures.inc(),
                ItemOutcome::PersistFailed => m.persist_failures.inc(),
            };
        }
        tally.record(outcome);
    }

    debug!(
        event = "ingest_worker_drained",
        worker_idx,
        received = tally.received,
        persisted = tally.persisted,
        "ingest worker finished"
    );
    tally
}
