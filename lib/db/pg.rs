use diesel::insert_into;
use diesel::pg::upsert::excluded;
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use futures::future::BoxFuture;
use tracing::debug;

use super::models::ItemRow;
use super::schema::items;
use super::{ItemStore, StoreError};
use crate::firebase_client::Item;

/// Postgres-backed store used by the ingest and rpc modes.
#[derive(Clone)]
pub struct PgItemStore {
    pool: Pool<AsyncPgConnection>,
}

impl PgItemStore {
    pub fn new(pool: Pool<AsyncPgConnection>) -> Self {
        Self { pool }
    }

    async fn upsert_row(&self, row: ItemRow) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        insert_into(items::table)
            .values(&row)
            .on_conflict(items::id)
            .do_update()
            .set((
                items::type_.eq(excluded(items::type_)),
                items::text.eq(excluded(items::text)),
                items::url.eq(excluded(items::url)),
                items::score.eq(excluded(items::score)),
                items::title.eq(excluded(items::title)),
                items::time.eq(excluded(items::time)),
                items::by.eq(excluded(items::by)),
                items::dead.eq(excluded(items::dead)),
                items::deleted.eq(excluded(items::deleted)),
            ))
            .execute(&mut conn)
            .await?;
        debug!(event = "item_saved", item_id = row.id, "item saved");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Item>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows = items::table
            .select(ItemRow::as_select())
            .order(items::id.asc())
            .load::<ItemRow>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn load_by_type(&self, type_: &str) -> Result<Vec<Item>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows = items::table
            .filter(items::type_.eq(type_))
            .select(ItemRow::as_select())
            .order(items::id.asc())
            .load::<ItemRow>(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }
}

impl ItemStore for PgItemStore {
    fn upsert<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.upsert_row(ItemRow::from(item.clone())))
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Item>, StoreError>> {
        Box::pin(self.load_all())
    }

    fn list_by_type<'a>(&'a self, type_: &'a str) -> BoxFuture<'a, Result<Vec<Item>, StoreError>> {
        Box::pin(self.load_by_type(type_))
    }
}
