pub mod memory;
pub mod models;
pub mod pg;
pub mod schema;

use std::sync::Arc;

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_async::{
    pg::AsyncPgConnection,
    pooled_connection::{
        deadpool::{BuildError, Pool, PoolError},
        AsyncDieselConnectionManager,
    },
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use futures::future::BoxFuture;
use thiserror::Error;

use crate::firebase_client::Item;

pub use memory::MemoryItemStore;
pub use pg::PgItemStore;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Diesel(#[from] diesel::result::Error),

    #[error(transparent)]
    Connection(#[from] diesel::ConnectionError),

    #[error("migration error: {0}")]
    Migration(String),

    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("unexpected HTTP status from {operation}: {status}")]
    UnexpectedStatus { operation: String, status: u16 },

    #[error("remote store rejected item {id}")]
    Rejected { id: i64 },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable home of ingested items.
///
/// `upsert` is keyed by `Item::id` and idempotent; list results are ordered by id.
pub trait ItemStore: Send + Sync {
    fn upsert<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), StoreError>>;

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Item>, StoreError>>;

    fn list_by_type<'a>(&'a self, type_: &'a str) -> BoxFuture<'a, Result<Vec<Item>, StoreError>>;
}

impl<T> ItemStore for Arc<T>
where
    T: ItemStore + ?Sized,
{
    fn upsert<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).upsert(item)
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Item>, StoreError>> {
        (**self).list_all()
    }

    fn list_by_type<'a>(&'a self, type_: &'a str) -> BoxFuture<'a, Result<Vec<Item>, StoreError>> {
        (**self).list_by_type(type_)
    }
}

pub async fn build_db_pool(db_url: &str) -> Result<Pool<AsyncPgConnection>, BuildError> {
    let pool_config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    Pool::builder(pool_config).build()
}

/// Applies pending embedded migrations over a short-lived synchronous connection.
pub fn run_migrations(db_url: &str) -> Result<(), StoreError> {
    let mut conn = PgConnection::establish(db_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| StoreError::Migration(err.to_string()))?;
    Ok(())
}
