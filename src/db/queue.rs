use super::model::{decode_json, encode_json, QueueRow, QUEUE_COLUMNS};
use super::{Pool, Result};
use crate::model::{CompositeItem, Marketplace, NewQueueEntry, QueueEntry};
use chrono::{Duration, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, instrument};

/// Entries created longer ago than this drop out of listings.
pub const RETENTION_DAYS: i64 = 7;

// Rows per INSERT statement; 8 binds each keeps us far below SQLite's
// host parameter limit.
const INSERT_CHUNK: usize = 100;
const UPDATE_CHUNK: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFilter {
    pub marketplace: Marketplace,
    pub with_parent_complete: bool,
}

impl ListFilter {
    /// Entries still waiting to be produced.
    pub fn open(marketplace: Marketplace) -> Self {
        Self {
            marketplace,
            with_parent_complete: false,
        }
    }
}

/// Insert entries, leaving any existing `(id, article)` row untouched.
/// Returns the number of rows actually inserted.
#[instrument(skip_all, fields(count = entries.len()))]
pub async fn add_orders(pool: &Pool, entries: &[NewQueueEntry]) -> Result<u64> {
    if entries.is_empty() {
        return Ok(0);
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for chunk in entries.chunks(INSERT_CHUNK) {
        let rows = chunk
            .iter()
            .map(|e| Ok((e, encode_json("items", &e.items)?, encode_json("info", &e.info)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO orders_queue \
             (id, article, marketplace, items, order_created_at, info, created_at, updated_at) ",
        );
        qb.push_values(rows, |mut b, (entry, items, info)| {
            b.push_bind(entry.id.clone())
                .push_bind(entry.article.clone())
                .push_bind(entry.marketplace.as_str())
                .push_bind(items)
                .push_bind(entry.order_created_at)
                .push_bind(info)
                .push_bind(now)
                .push_bind(now);
        });
        qb.push(" ON CONFLICT (id, article) DO NOTHING");
        inserted += qb.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    debug!(inserted, "queue entries added");
    Ok(inserted)
}

/// List entries of one marketplace with the given completion state, within
/// the retention window.
#[instrument(skip_all, fields(marketplace = %filter.marketplace))]
pub async fn get_orders(pool: &Pool, filter: &ListFilter) -> Result<Vec<QueueEntry>> {
    let since = Utc::now() - Duration::days(RETENTION_DAYS);
    let order_by = if filter.marketplace.reports_shipment_dates() {
        "json_extract(info, '$.order_shipment_at') IS NULL, \
         json_extract(info, '$.order_shipment_at'), order_created_at, id"
    } else {
        "order_created_at, id"
    };
    let sql = format!(
        "SELECT {QUEUE_COLUMNS} FROM orders_queue \
         WHERE marketplace = ? AND is_complete = ? AND created_at > ? \
         ORDER BY {order_by}"
    );
    let rows: Vec<QueueRow> = sqlx::query_as(&sql)
        .bind(filter.marketplace.as_str())
        .bind(filter.with_parent_complete)
        .bind(since)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(QueueEntry::try_from).collect()
}

#[instrument(skip_all)]
pub async fn set_complete(pool: &Pool, id: &str, is_complete: bool) -> Result<u64> {
    let res = sqlx::query("UPDATE orders_queue SET is_complete = ?, updated_at = ? WHERE id = ?")
        .bind(is_complete)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn set_printing(pool: &Pool, id: &str, is_printing: bool) -> Result<u64> {
    let res = sqlx::query("UPDATE orders_queue SET is_printing = ?, updated_at = ? WHERE id = ?")
        .bind(is_printing)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Set the completion flag of the composite item with `item_id`. The key is
/// the item id, never the parent order id; sibling items keep their state.
/// Returns the number of queue rows rewritten.
#[instrument(skip_all)]
pub async fn set_item_complete(pool: &Pool, item_id: &str, is_complete: bool) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT id, article, items FROM orders_queue \
         WHERE EXISTS (SELECT 1 FROM json_each(orders_queue.items) \
                       WHERE json_extract(json_each.value, '$.id') = ?)",
    )
    .bind(item_id)
    .fetch_all(&mut *tx)
    .await?;

    let now = Utc::now();
    let mut updated = 0;
    for (id, article, raw) in rows {
        let mut items: Vec<CompositeItem> = decode_json("items", &raw)?;
        for item in items.iter_mut().filter(|i| i.id == item_id) {
            item.is_complete = is_complete;
        }
        updated += sqlx::query(
            "UPDATE orders_queue SET items = ?, updated_at = ? WHERE id = ? AND article = ?",
        )
        .bind(encode_json("items", &items)?)
        .bind(now)
        .bind(&id)
        .bind(&article)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;
    Ok(updated)
}

/// Mark every still-open entry of `marketplace` whose id is in `order_ids` as
/// complete. Empty input touches nothing. Returns the number of rows that
/// transitioned to complete.
#[instrument(skip_all, fields(marketplace = %marketplace, ids = order_ids.len()))]
pub async fn set_complete_by_order_ids(
    pool: &Pool,
    marketplace: Marketplace,
    order_ids: &[String],
) -> Result<u64> {
    if order_ids.is_empty() {
        return Ok(0);
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let mut completed = 0;
    for chunk in order_ids.chunks(UPDATE_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE orders_queue SET is_complete = 1, updated_at = ");
        qb.push_bind(now);
        qb.push(" WHERE is_complete = 0 AND marketplace = ");
        qb.push_bind(marketplace.as_str());
        qb.push(" AND id IN (");
        let mut ids = qb.separated(", ");
        for id in chunk {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(")");
        completed += qb.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    debug!(completed, "queue entries completed by order ids");
    Ok(completed)
}
