//! Rows returned by repository queries.
//!
//! JSON columns arrive as text and are decoded when a row becomes a domain
//! entry; nothing here talks to the database.

use super::StoreError;
use crate::model::{CompositeItem, Marketplace, OrderInfo, QueueEntry};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) const QUEUE_COLUMNS: &str = "id, article, marketplace, items, order_created_at, info, \
     is_complete, is_printing, created_at, updated_at";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueRow {
    pub id: String,
    pub article: String,
    pub marketplace: String,
    pub items: String,
    pub order_created_at: DateTime<Utc>,
    pub info: String,
    pub is_complete: bool,
    pub is_printing: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = StoreError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let marketplace = Marketplace::parse(&row.marketplace)
            .ok_or_else(|| StoreError::UnknownMarketplace(row.marketplace.clone()))?;
        let items: Vec<CompositeItem> = decode_json("items", &row.items)?;
        let info: OrderInfo = decode_json("info", &row.info)?;
        Ok(QueueEntry {
            id: row.id,
            article: row.article,
            marketplace,
            items,
            order_created_at: row.order_created_at,
            info,
            is_complete: row.is_complete,
            is_printing: row.is_printing,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn encode_json<T: Serialize + ?Sized>(
    column: &'static str,
    value: &T,
) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Json { column, source })
}

pub(crate) fn decode_json<T: DeserializeOwned>(
    column: &'static str,
    raw: &str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Json { column, source })
}
