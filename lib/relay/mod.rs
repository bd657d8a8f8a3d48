use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::ItemStore;
use crate::firebase_client::{Item, ItemSource};
use crate::queue::{ItemQueue, QueueError};
use crate::server::monitoring::RELAY_METRICS;
use crate::sync_service::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: usize,
    /// Dead, deleted or missing upstream.
    pub skipped: usize,
    pub fetch_failures: usize,
    pub publish_failures: usize,
    pub cancelled: bool,
}

/// Fetches the current top stories and publishes live ones onto the durable queue.
pub struct Publisher<S: ?Sized, Q: ?Sized> {
    source: Arc<S>,
    queue: Arc<Q>,
}

impl<S, Q> Publisher<S, Q>
where
    S: ItemSource + ?Sized,
    Q: ItemQueue + ?Sized,
{
    pub fn new(source: Arc<S>, queue: Arc<Q>) -> Self {
        Self { source, queue }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<PublishSummary, Error> {
        let item_ids = self
            .source
            .list_top_identifiers()
            .await
            .map_err(Error::ListIdentifiers)?;
        info!(
            event = "publish_run_started",
            candidates = item_ids.len(),
            "publishing top stories"
        );

        let mut summary = PublishSummary::default();
        for item_id in item_ids {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.publish_one(item_id, &mut summary).await;
        }

        info!(
            event = "publish_run_finished",
            published = summary.published,
            skipped = summary.skipped,
            failures = summary.fetch_failures + summary.publish_failures,
            cancelled = summary.cancelled,
            "publish run finished"
        );
        Ok(summary)
    }

    async fn publish_one(&self, item_id: i64, summary: &mut PublishSummary) {
        let item = match self.source.get_item(item_id).await {
            Ok(Some(item)) if item.is_live() => item,
            Ok(_) => {
                debug!(event = "publish_skipped", item_id, "item missing, dead or deleted");
                summary.skipped += 1;
                return;
            }
            Err(err) => {
                warn!(event = "item_fetch_failed", item_id, error = %err, "failed to fetch item");
                summary.fetch_failures += 1;
                return;
            }
        };

        match self.queue.push(&item).await {
            Ok(()) => {
                summary.published += 1;
                if let Some(m) = RELAY_METRICS.get() {
                    m.items_published.inc();
                }
            }
            Err(err) => {
                error!(
                    event = "publish_failed",
                    item_id,
                    error = %err,
                    "failed to send item to queue"
                );
                summary.publish_failures += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpSummary {
    pub forwarded: usize,
    pub undecodable: usize,
    pub queue_errors: usize,
}

/// Moves items from the durable queue into the consumer channel until `cancel` fires.
///
/// Cancellation is checked between pops; a pop already sent to the queue always completes,
/// and an item popped while cancellation races its hand-off is pushed back onto the queue.
/// Returning drops `sender`, which closes the channel for the consumers.
pub async fn pump_queue<Q>(
    queue: &Q,
    sender: flume::Sender<Item>,
    cancel: &CancellationToken,
    idle_wait: Duration,
) -> PumpSummary
where
    Q: ItemQueue + ?Sized,
{
    let mut summary = PumpSummary::default();

    loop {
        if cancel.is_cancelled() {
            break;
        }
        // RPOP removes the message before replying, so the pop must not be dropped midway.
        let popped = queue.pop().await;

        match popped {
            Ok(Some(item)) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        requeue(queue, &item).await;
                        break;
                    }
                    sent = sender.send_async(item.clone()) => {
                        if sent.is_err() {
                            warn!(event = "relay_consumers_gone", "no relay consumers left");
                            requeue(queue, &item).await;
                            break;
                        }
                        summary.forwarded += 1;
                        if let Some(m) = RELAY_METRICS.get() {
                            m.channel_depth.set(sender.len() as i64);
                        }
                    }
                }
            }
            Ok(None) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(idle_wait) => {}
                }
            }
            Err(QueueError::Decode(err)) => {
                warn!(
                    event = "queue_message_dropped",
                    error = %err,
                    "dropping undecodable queue message"
                );
                summary.undecodable += 1;
            }
            Err(err) => {
                error!(event = "queue_pop_failed", error = %err, "failed to read from queue");
                summary.queue_errors += 1;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(idle_wait) => {}
                }
            }
        }
    }

    info!(
        event = "queue_pump_stopped",
        forwarded = summary.forwarded,
        undecodable = summary.undecodable,
        queue_errors = summary.queue_errors,
        "queue pump stopped"
    );
    summary
}

async fn requeue<Q: ItemQueue + ?Sized>(queue: &Q, item: &Item) {
    if let Err(err) = queue.push(item).await {
        error!(
            event = "requeue_failed",
            item_id = item.id,
            error = %err,
            "failed to return item to queue"
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub relayed: usize,
    pub failures: usize,
    pub worker_loads: Vec<usize>,
}

/// Consumers draining the relay channel into a sink store, normally across the rpc boundary.
pub struct RelayService<P: ?Sized> {
    sink: Arc<P>,
    num_workers: usize,
}

impl<P> RelayService<P>
where
    P: ItemStore + ?Sized + 'static,
{
    pub fn new(sink: Arc<P>, num_workers: usize) -> Result<Self, Error> {
        if num_workers == 0 {
            return Err(Error::Config("relay needs at least one consumer".to_string()));
        }
        Ok(Self { sink, num_workers })
    }

    /// Runs until every sender of `receiver` has been dropped and the channel is empty.
    pub async fn run(&self, receiver: flume::Receiver<Item>) -> RelaySummary {
        info!(
            event = "relay_started",
            workers = self.num_workers,
            "starting relay consumers"
        );
        let handles: Vec<JoinHandle<(usize, usize)>> = (0..self.num_workers)
            .map(|worker_idx| {
                let sink = self.sink.clone();
                let worker_receiver = receiver.clone();
                tokio::spawn(async move { consume(worker_idx, sink, worker_receiver).await })
            })
            .collect();
        drop(receiver);

        let mut summary = RelaySummary::default();
        for (worker_idx, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok((relayed, failures)) => {
                    summary.relayed += relayed;
                    summary.failures += failures;
                    summary.worker_loads.push(relayed + failures);
                }
                Err(err) => {
                    error!(
                        event = "relay_worker_crashed",
                        worker_idx,
                        error = %err,
                        "relay consumer task failed"
                    );
                    summary.worker_loads.push(0);
                }
            }
        }

        info!(
            event = "relay_stopped",
            relayed = summary.relayed,
            failures = summary.failures,
            "relay consumers drained"
        );
        summary
    }
}

async fn consume<P>(
    worker_idx: usize,
    sink: Arc<P>,
    receiver: flume::Receiver<Item>,
) -> (usize, usize)
where
    P: ItemStore + ?Sized,
{
    let (mut relayed, mut failures) = (0usize, 0usize);

    while let Ok(item) = receiver.recv_async().await {
        if let Some(m) = RELAY_METRICS.get() {
            m.channel_depth.set(receiver.len() as i64);
        }
        match sink.upsert(&item).await {
            Ok(()) => {
                relayed += 1;
                if let Some(m) = RELAY_METRICS.get() {
                    m.items_relayed.inc();
                }
            }
            Err(err) => {
                failures += 1;
                if let Some(m) = RELAY_METRICS.get() {
                    m.relay_failures.inc();
                }
                warn!(
                    event = "relay_persist_failed",
                    worker_idx,
                    item_id = item.id,
                    error = %err,
                    "failed to persist relayed item"
                );
            }
        }
    }

    debug!(
        event = "relay_worker_drained",
        worker_idx,
        relayed,
        failures,
        "relay consumer finished"
    );
    (relayed, failures)
}
