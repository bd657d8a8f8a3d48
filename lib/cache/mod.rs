use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::db::{ItemStore, StoreError};
use crate::firebase_client::Item;
use crate::server::monitoring::CACHE_METRICS;

pub const STORY_TYPE: &str = "story";
pub const JOB_TYPE: &str = "job";

/// Query a cached list answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    All,
    ByType(String),
}

impl CacheKey {
    pub fn stories() -> Self {
        Self::ByType(STORY_TYPE.to_string())
    }

    pub fn jobs() -> Self {
        Self::ByType(JOB_TYPE.to_string())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "items:all"),
            Self::ByType(tag) => write!(f, "items:type:{tag}"),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Every caller waiting on the same fill receives a clone of this error.
    #[error("failed to fill cache entry {key}")]
    Fill {
        key: CacheKey,
        #[source]
        source: Arc<StoreError>,
    },
}

type FillResult = Result<Arc<Vec<Item>>, CacheError>;
type Fill = Shared<BoxFuture<'static, FillResult>>;

struct CacheEntry {
    items: Arc<Vec<Item>>,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, Fill>,
    /// Bumped by `flush`; fills started under an older generation do not write back.
    generation: u64,
}

/// Cache-aside wrapper over an [`ItemStore`] with per-key single-flight fills.
///
/// Concurrent misses on one key share a single storage call. Successful results are kept
/// for `ttl`; failures reach every waiter and are never stored.
pub struct ItemCache<S: ?Sized> {
    store: Arc<S>,
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl<S> ItemCache<S>
where
    S: ItemStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get_all(&self) -> FillResult {
        self.get(&CacheKey::All).await
    }

    pub async fn get_stories(&self) -> FillResult {
        self.get(&CacheKey::stories()).await
    }

    pub async fn get_jobs(&self) -> FillResult {
        self.get(&CacheKey::jobs()).await
    }

    pub async fn get_by_type(&self, tag: &str) -> FillResult {
        self.get(&CacheKey::ByType(tag.to_string())).await
    }

    pub async fn get(&self, key: &CacheKey) -> FillResult {
        let fill = {
            let mut state = self.state.lock().await;

            if let Some(entry) = state.entries.get(key) {
                if entry.expires_at > Instant::now() {
                    if let Some(m) = CACHE_METRICS.get() {
                        m.hits.inc();
                    }
                    debug!(event = "cache_hit", key = %key, "cache hit");
                    return Ok(entry.items.clone());
                }
            }

            match state.in_flight.get(key) {
                Some(fill) => {
                    if let Some(m) = CACHE_METRICS.get() {
                        m.coalesced.inc();
                    }
                    debug!(event = "cache_fill_joined", key = %key, "waiting on in-flight fill");
                    fill.clone()
                }
                None => {
                    if let Some(m) = CACHE_METRICS.get() {
                        m.misses.inc();
                    }
                    debug!(event = "cache_miss", key = %key, "starting cache fill");
                    let fill = self.start_fill(key.clone(), state.generation);
                    state.in_flight.insert(key.clone(), fill.clone());
                    fill
                }
            }
        };

        fill.await
    }

    /// Drops every entry and detaches in-flight fills, so the next `get` of any key
    /// reaches storage.
    pub async fn flush(&self) {
        let mut state = self.state.lock().await;
        let dropped = state.entries.len();
        state.entries.clear();
        state.in_flight.clear();
        state.generation = state.generation.wrapping_add(1);
        info!(event = "cache_flushed", dropped, "cache flushed");
    }

    fn start_fill(&self, key: CacheKey, generation: u64) -> Fill {
        let store = self.store.clone();
        let state = self.state.clone();
        let ttl = self.ttl;

        async move {
            let loaded = match &key {
                CacheKey::All => store.list_all().await,
                CacheKey::ByType(tag) => store.list_by_type(tag).await,
            };
            let loaded = loaded.map(Arc::new);

            let mut state = state.lock().await;
            if state.generation == generation {
                state.in_flight.remove(&key);
                if let Ok(items) = &loaded {
                    let now = Instant::now();
                    // Tags come from request paths, so stale keys are pruned rather than kept.
                    state.entries.retain(|_, entry| entry.expires_at > now);
                    state.entries.insert(
                        key.clone(),
                        CacheEntry {
                            items: items.clone(),
                            expires_at: now + ttl,
                        },
                    );
                }
            }
            drop(state);

            loaded.map_err(|err| {
                if let Some(m) = CACHE_METRICS.get() {
                    m.fill_failures.inc();
                }
                warn!(event = "cache_fill_failed", key = %key, error = %err, "cache fill failed");
                CacheError::Fill {
                    key,
                    source: Arc::new(err),
                }
            })
        }
        .boxed()
        .shared()
    }
}
