use diesel::prelude::*;

use crate::firebase_client::Item;

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = super::schema::items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ItemRow {
    pub id: i64,
    pub type_: String,
    pub text: String,
    pub url: String,
    pub score: i64,
    pub title: String,
    pub time: i64,
    pub by: String,
    pub dead: bool,
    pub deleted: bool,
}

impl From<Item> for ItemRow {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            type_: item.type_,
            text: strip_nul(item.text),
            url: strip_nul(item.url),
            score: item.score,
            title: strip_nul(item.title),
            time: item.time,
            by: item.by,
            dead: item.dead,
            deleted: item.deleted,
        }
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            type_: row.type_,
            text: row.text,
            url: row.url,
            score: row.score,
            title: row.title,
            time: row.time,
            by: row.by,
            dead: row.dead,
            deleted: row.deleted,
        }
    }
}

/// Postgres text columns reject embedded NUL bytes; upstream comment text occasionally has them.
fn strip_nul(value: String) -> String {
    if value.contains('\0') {
        value.replace('\0', "")
    } else {
        value
    }
}
