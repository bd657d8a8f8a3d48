use crate::build_info;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;
use tokio::sync::OnceCell;

/// Registers build metadata as a labeled gauge fixed at `1`.
pub fn register_build_info_metric(registry: &mut Registry, prefix: &str) {
    let build_info_metric = Family::<BuildInfoLabels, Gauge>::default();
    build_info_metric
        .get_or_create(&BuildInfoLabels {
            service: "hn_relay",
            version: build_info::VERSION,
            commit: build_info::short_commit_hash(),
        })
        .set(1);
    registry.sub_registry_with_prefix(prefix).register(
        "build_info",
        "Build identity labels for this process",
        build_info_metric,
    );
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildInfoLabels {
    service: &'static str,
    version: &'static str,
    commit: &'static str,
}

#[derive(Clone, Default)]
pub struct IngestMetrics {
    /// Ids handed from the producer to a worker.
    pub items_dispatched: Counter,
    pub items_persisted: Counter,
    /// Dead, deleted or missing items.
    pub items_skipped: Counter,
    pub fetch_failures: Counter,
    pub persist_failures: Counter,
    pub runs_completed: Counter,
}

impl IngestMetrics {
    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::default();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "items_dispatched",
            "Total number of item ids dispatched to ingestion workers",
            metrics.items_dispatched.clone(),
        );
        sub_registry.register(
            "items_persisted",
            "Total number of items upserted into storage",
            metrics.items_persisted.clone(),
        );
        sub_registry.register(
            "items_skipped",
            "Total number of dead, deleted or missing items skipped",
            metrics.items_skipped.clone(),
        );
        sub_registry.register(
            "fetch_failures",
            "Total number of failed item fetches",
            metrics.fetch_failures.clone(),
        );
        sub_registry.register(
            "persist_failures",
            "Total number of failed item upserts",
            metrics.persist_failures.clone(),
        );
        sub_registry.register(
            "runs_completed",
            "Total number of completed ingestion runs",
            metrics.runs_completed.clone(),
        );
        metrics
    }
}

#[derive(Clone, Default)]
pub struct RelayMetrics {
    pub items_published: Counter,
    pub items_relayed: Counter,
    pub relay_failures: Counter,
    /// Items waiting in the in-process channel between the queue pump and consumers.
    pub channel_depth: Gauge,
}

impl RelayMetrics {
    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::default();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "items_published",
            "Total number of items published to the durable queue",
            metrics.items_published.clone(),
        );
        sub_registry.register(
            "items_relayed",
            "Total number of items persisted through the rpc boundary",
            metrics.items_relayed.clone(),
        );
        sub_registry.register(
            "relay_failures",
            "Total number of items whose relay persistence failed",
            metrics.relay_failures.clone(),
        );
        sub_registry.register(
            "channel_depth",
            "Items buffered between the queue pump and relay consumers",
            metrics.channel_depth.clone(),
        );
        metrics
    }
}

#[derive(Clone, Default)]
pub struct CacheMetrics {
    pub hits: Counter,
    pub misses: Counter,
    /// Callers that joined a fill already in flight.
    pub coalesced: Counter,
    pub fill_failures: Counter,
}

impl CacheMetrics {
    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::default();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register("hits", "Total number of cache hits", metrics.hits.clone());
        sub_registry.register(
            "misses",
            "Total number of cache misses that started a storage fill",
            metrics.misses.clone(),
        );
        sub_registry.register(
            "coalesced",
            "Total number of callers that waited on an in-flight fill",
            metrics.coalesced.clone(),
        );
        sub_registry.register(
            "fill_failures",
            "Total number of storage fills that failed",
            metrics.fill_failures.clone(),
        );
        metrics
    }
}

pub static INGEST_METRICS: OnceCell<IngestMetrics> = OnceCell::const_new();
pub static RELAY_METRICS: OnceCell<RelayMetrics> = OnceCell::const_new();
pub static CACHE_METRICS: OnceCell<CacheMetrics> = OnceCell::const_new();

/// Registers every metric family on `registry` once per process.
pub async fn register_all(registry: &mut Registry) {
    INGEST_METRICS
        .get_or_init(|| async { IngestMetrics::register(&mut *registry, "ingest") })
        .await;
    RELAY_METRICS
        .get_or_init(|| async { RelayMetrics::register(&mut *registry, "relay") })
        .await;
    CACHE_METRICS
        .get_or_init(|| async { CacheMetrics::register(&mut *registry, "cache") })
        .await;
    register_build_info_metric(registry, "hn_relay");
}
