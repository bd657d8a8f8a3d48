use std::collections::VecDeque;
use std::sync::Arc;

use deadpool_redis::{Config, Pool, Runtime};
use futures::future::BoxFuture;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::firebase_client::Item;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Failed to encode item {id}: {source}")]
    Encode {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    /// The message was already removed from the queue when this is returned.
    #[error("Failed to decode queued item: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Durable FIFO carrying JSON-encoded items between the publisher and relay consumers.
pub trait ItemQueue: Send + Sync {
    fn push<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), QueueError>>;

    /// Oldest message, or `None` when the queue is currently empty.
    fn pop(&self) -> BoxFuture<'_, Result<Option<Item>, QueueError>>;
}

impl<T> ItemQueue for Arc<T>
where
    T: ItemQueue + ?Sized,
{
    fn push<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), QueueError>> {
        (**self).push(item)
    }

    fn pop(&self) -> BoxFuture<'_, Result<Option<Item>, QueueError>> {
        (**self).pop()
    }
}

fn encode(item: &Item) -> Result<String, QueueError> {
    serde_json::to_string(item).map_err(|source| QueueError::Encode {
        id: item.id,
        source,
    })
}

fn decode(payload: &str) -> Result<Item, QueueError> {
    serde_json::from_str(payload).map_err(QueueError::Decode)
}

/// Redis list queue: producers `LPUSH`, consumers `RPOP`.
pub struct RedisItemQueue {
    pool: Pool,
    queue_key: String,
}

impl RedisItemQueue {
    pub fn new(redis_url: &str, queue_key: &str) -> Result<Self, QueueError> {
        if queue_key.trim().is_empty() {
            return Err(QueueError::Config("queue name cannot be empty".to_string()));
        }
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| QueueError::Config(e.to_string()))?;

        Ok(Self {
            pool,
            queue_key: queue_key.to_owned(),
        })
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.llen(&self.queue_key).await?)
    }

    async fn push_payload(&self, payload: String) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await?;
        conn.lpush::<_, _, ()>(&self.queue_key, payload).await?;
        Ok(())
    }

    async fn pop_payload(&self) -> Result<Option<Item>, QueueError> {
        let mut conn = self.pool.get().await?;
        let payload: Option<String> = conn.rpop(&self.queue_key, None).await?;
        payload.as_deref().map(decode).transpose()
    }
}

impl ItemQueue for RedisItemQueue {
    fn push<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            let payload = encode(item)?;
            self.push_payload(payload).await
        })
    }

    fn pop(&self) -> BoxFuture<'_, Result<Option<Item>, QueueError>> {
        Box::pin(self.pop_payload())
    }
}

/// In-process queue holding the same JSON payloads as [`RedisItemQueue`].
#[derive(Default)]
pub struct MemoryItemQueue {
    messages: Mutex<VecDeque<String>>,
}

impl MemoryItemQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a raw payload, bypassing encoding.
    pub async fn push_raw(&self, payload: &str) {
        self.messages.lock().await.push_back(payload.to_string());
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

impl ItemQueue for MemoryItemQueue {
    fn push<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            let payload = encode(item)?;
            self.messages.lock().await.push_back(payload);
            Ok(())
        })
    }

    fn pop(&self) -> BoxFuture<'_, Result<Option<Item>, QueueError>> {
        Box::pin(async move {
            let payload = self.messages.lock().await.pop_front();
            payload.as_deref().map(decode).transpose()
        })
    }
}
