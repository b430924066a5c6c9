//! Read model for the production queue plus pass-through mutations.
use crate::catalog::{Catalog, Product};
use crate::db::{self, ListFilter, Pool};
use crate::model::{CompositeItem, Marketplace, OrderInfo, QueueEntry};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueQuery {
    pub marketplace: Marketplace,
    pub with_parent_complete: bool,
    /// When false, completed composite items are left out of each checklist.
    pub with_children_complete: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueItem {
    pub id: String,
    pub order_id: String,
    pub name: String,
    pub article: String,
    pub marketplace: Marketplace,
    pub photo: String,
    pub is_printing: bool,
    pub is_complete: bool,
    pub is_composite: bool,
    pub time_passed: String,
    pub shipment_date: Option<NaiveDate>,
    pub info: OrderInfo,
    pub composite_items: Vec<CompositeItem>,
}

#[derive(Clone)]
pub struct QueueService {
    pool: Pool,
    catalog: Arc<dyn Catalog>,
}

impl QueueService {
    pub fn new(pool: Pool, catalog: Arc<dyn Catalog>) -> Self {
        Self { pool, catalog }
    }

    #[instrument(skip(self))]
    pub async fn list_queue(&self, query: QueueQuery) -> Result<Vec<QueueItem>> {
        let filter = ListFilter {
            marketplace: query.marketplace,
            with_parent_complete: query.with_parent_complete,
        };
        let entries = db::get_orders(&self.pool, &filter)
            .await
            .context("failed to list queue entries")?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let articles: Vec<String> = entries
            .iter()
            .map(|e| e.article.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let products = self
            .catalog
            .get_by_articles_map(&articles)
            .await
            .context("failed to resolve queue articles")?;

        Ok(make_items(
            entries,
            &products,
            query.with_children_complete,
            Utc::now(),
        ))
    }

    pub async fn set_complete(&self, id: &str, state: bool) -> Result<u64> {
        db::set_complete(&self.pool, id, state)
            .await
            .with_context(|| format!("failed to set complete on {id}"))
    }

    pub async fn set_printing(&self, id: &str, state: bool) -> Result<u64> {
        db::set_printing(&self.pool, id, state)
            .await
            .with_context(|| format!("failed to set printing on {id}"))
    }

    /// Toggle one composite item, identified by its own id.
    pub async fn set_children_complete(&self, item_id: &str, state: bool) -> Result<u64> {
        db::set_item_complete(&self.pool, item_id, state)
            .await
            .with_context(|| format!("failed to set complete on item {item_id}"))
    }
}

/// Merge catalog details into queue entries. Entries whose product has since
/// left the catalog keep their own fields with an empty name and photo.
pub fn make_items(
    entries: Vec<QueueEntry>,
    products: &HashMap<String, Product>,
    with_children_complete: bool,
    now: DateTime<Utc>,
) -> Vec<QueueItem> {
    entries
        .into_iter()
        .map(|entry| {
            let product = products.get(&entry.article);
            let composite_items = if with_children_complete {
                entry.items
            } else {
                entry.items.into_iter().filter(|i| !i.is_complete).collect()
            };
            QueueItem {
                order_id: entry.id.clone(),
                id: entry.id,
                name: product.map(|p| p.name.clone()).unwrap_or_default(),
                article: entry.article,
                marketplace: entry.marketplace,
                photo: product.map(|p| p.photo.clone()).unwrap_or_default(),
                is_printing: entry.is_printing,
                is_complete: entry.is_complete,
                is_composite: product.map(|p| p.is_composite).unwrap_or(false),
                time_passed: time_passed(entry.order_created_at, now),
                shipment_date: entry.info.order_shipment_at.map(|d| d.date_naive()),
                info: entry.info,
                composite_items,
            }
        })
        .collect()
}

/// Elapsed time since the order was placed, as "Xh Ym". Clamped at zero for
/// clocks that disagree.
pub fn time_passed(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - since).num_minutes().max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}
