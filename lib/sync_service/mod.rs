pub mod error;
pub mod types;
pub mod worker;


use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::db::ItemStore;
use crate::firebase_client::ItemSource;
use crate::server::monitoring::INGEST_METRICS;

pub use error::Error;
pub use types::{IngestSummary, ItemOutcome, WorkerTally};

/// Fans the current top stories out to a fixed pool of fetch-and-persist workers.
///
/// Ids travel over a zero-capacity channel, so the producer only gets ahead of the
/// workers by the single id it is trying to hand over.
pub struct IngestService<S: ?Sized, P: ?Sized> {
    source: Arc<S>,
    store: Arc<P>,
    num_workers: usize,
}

impl<S: ?Sized, P: ?Sized> Clone for IngestService<S, P> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            store: self.store.clone(),
            num_workers: self.num_workers,
        }
    }
}

impl<S, P> IngestService<S, P>
where
    S: ItemSource + ?Sized + 'static,
    P: ItemStore + ?Sized + 'static,
{
    pub fn new(source: Arc<S>, store: Arc<P>, num_workers: usize) -> Result<Self, Error> {
        if num_workers == 0 {
            return Err(Error::Config("ingestion needs at least one worker".to_string()));
        }
        Ok(Self {
            source,
            store,
            num_workers,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Runs one batch over the upstream's current top stories.
    ///
    /// Only a failure to list identifiers fails the run; per-item failures are counted in
    /// the summary. Cancelling stops dispatch, and ids already handed to a worker still
    /// complete before this returns.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<IngestSummary, Error> {
        let (sender, receiver) = flume::bounded::<i64>(0);
        let worker_handles = self.spawn_workers(receiver);

        let item_ids = match self.source.list_top_identifiers().await {
            Ok(item_ids) => item_ids,
            Err(err) => {
                error!(
                    event = "ingest_list_failed",
                    error = %err,
                    "failed to list top story identifiers"
                );
                drop(sender);
                join_workers(worker_handles, 0, false).await;
                return Err(Error::ListIdentifiers(err));
            }
        };

        info!(
            event = "ingest_run_started",
            candidates = item_ids.len(),
            workers = self.num_workers,
            "starting ingestion batch"
        );
        let (dispatched, cancelled) = dispatch(item_ids, sender, cancel).await;
        Ok(join_workers(worker_handles, dispatched, cancelled).await)
    }

    /// Runs one batch over a caller-provided id list.
    pub async fn run_ids(&self, item_ids: Vec<i64>, cancel: &CancellationToken) -> IngestSummary {
        let (sender, receiver) = flume::bounded::<i64>(0);
        let worker_handles = self.spawn_workers(receiver);
        let (dispatched, cancelled) = dispatch(item_ids, sender, cancel).await;
        join_workers(worker_handles, dispatched, cancelled).await
    }

    fn spawn_workers(&self, receiver: flume::Receiver<i64>) -> Vec<JoinHandle<WorkerTally>> {
        (0..self.num_workers)
            .map(|worker_idx| {
                let source = self.source.clone();
                let store = self.store.clone();
                let worker_receiver = receiver.clone();
                tokio::spawn(async move {
                    worker::run_worker(worker_idx, source, store, worker_receiver).await
                })
            })
            .collect()
    }
}

/// Hands ids to workers one at a time until the list is exhausted or `cancel` fires.
///
/// Dropping `sender` on return closes the channel, which is what lets workers drain.
async fn dispatch(
    item_ids: Vec<i64>,
    sender: flume::Sender<i64>,
    cancel: &CancellationToken,
) -> (usize, bool) {
    let mut dispatched = 0usize;

    for item_id in item_ids {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(
                    event = "ingest_dispatch_cancelled",
                    dispatched,
                    "cancellation requested, stopping dispatch"
                );
                return (dispatched, true);
            }
            sent = sender.send_async(item_id) => {
                if sent.is_err() {
                    warn!(
                        event = "ingest_workers_gone",
                        dispatched,
                        "no ingest workers left to receive ids"
                    );
                    break;
                }
                dispatched += 1;
                if let Some(m) = INGEST_METRICS.get() {
                    m.items_dispatched.inc();
                }
            }
        }
    }

    (dispatched, false)
}

/// `sent` is the producer's own count. A hand-off can land in the same poll that cancellation
/// wins, so the summary trusts what the workers report when that is higher.
async fn join_workers(
    worker_handles: Vec<JoinHandle<WorkerTally>>,
    sent: usize,
    cancelled: bool,
) -> IngestSummary {
    let mut summary = IngestSummary {
        cancelled,
        ..IngestSummary::default()
    };

    for (worker_idx, handle) in worker_handles.into_iter().enumerate() {
        match handle.await {
            Ok(tally) => summary.merge(&tally),
            Err(err) => {
                error!(
                    event = "ingest_worker_crashed",
                    worker_idx,
                    error = %err,
                    "ingest worker task failed"
                );
                summary.worker_loads.push(0);
            }
        }
    }

    summary.dispatched = summary.processed().max(sent);

    if let Some(m) = INGEST_METRICS.get() {
        m.runs_completed.inc();
    }
    info!(
        event = "ingest_run_finished",
        dispatched = summary.dispatched,
        persisted = summary.persisted,
        skipped = summary.skipped + summary.missing,
        failures = summary.failures(),
        cancelled = summary.cancelled,
        "ingestion batch finished"
    );
    summary
}
