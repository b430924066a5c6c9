use super::PollingWorker;
use crate::catalog::{Catalog, Product};
use crate::db::{self, Pool};
use crate::marketplace::{OrderFeed, RawOrder};
use crate::model::{CompositeItem, Marketplace, NewQueueEntry, OrderInfo};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched: usize,
    pub unknown: usize,
    pub inserted: u64,
}

/// Pulls new orders from one marketplace into the queue.
pub struct IngestWorker {
    pool: Pool,
    catalog: Arc<dyn Catalog>,
    feed: Arc<dyn OrderFeed>,
}

impl IngestWorker {
    pub fn new(pool: Pool, catalog: Arc<dyn Catalog>, feed: Arc<dyn OrderFeed>) -> Self {
        Self {
            pool,
            catalog,
            feed,
        }
    }

    #[instrument(skip_all, fields(marketplace = %self.feed.marketplace()))]
    pub async fn run_cycle(&self) -> Result<IngestReport> {
        let marketplace = self.feed.marketplace();
        let orders = self
            .feed
            .list_new_orders()
            .await
            .with_context(|| format!("failed to list new {marketplace} orders"))?;
        if orders.is_empty() {
            return Ok(IngestReport::default());
        }

        let articles: Vec<String> = orders
            .iter()
            .map(|o| o.article.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let products = self
            .catalog
            .get_by_articles_map(&articles)
            .await
            .context("failed to resolve order articles")?;

        let mut entries = Vec::with_capacity(orders.len());
        let mut unknown = 0;
        for order in &orders {
            match products.get(&order.article) {
                Some(product) => entries.push(expand(marketplace, order, product)),
                None => {
                    unknown += 1;
                    debug!(id = %order.id, article = %order.article, "skipping order with unknown article");
                }
            }
        }

        let inserted = db::add_orders(&self.pool, &entries)
            .await
            .context("failed to store queue entries")?;
        Ok(IngestReport {
            fetched: orders.len(),
            unknown,
            inserted,
        })
    }
}

/// Build the queue entry for one resolved order line.
pub fn expand(marketplace: Marketplace, order: &RawOrder, product: &Product) -> NewQueueEntry {
    NewQueueEntry {
        id: order.id.clone(),
        article: order.article.clone(),
        marketplace,
        items: composite_items(product),
        order_created_at: order.created_at,
        info: OrderInfo {
            order_number: order.order_number.clone(),
            order_shipment_at: order.shipment_at,
            quantity: order.quantity,
        },
    }
}

/// One fresh, incomplete item per sub-article; empty for plain products.
pub fn composite_items(product: &Product) -> Vec<CompositeItem> {
    if !product.is_composite {
        return Vec::new();
    }
    product.sub_articles.iter().map(CompositeItem::new).collect()
}

#[async_trait]
impl PollingWorker for IngestWorker {
    fn name(&self) -> String {
        format!("{}-ingest", self.feed.marketplace())
    }

    async fn tick(&self) -> Result<()> {
        let report = self.run_cycle().await?;
        debug!(
            fetched = report.fetched,
            unknown = report.unknown,
            inserted = report.inserted,
            "ingest cycle finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(is_composite: bool, subs: &[&str]) -> Product {
        Product {
            article: "X".into(),
            marketplace: Marketplace::Ozon,
            name: "X".into(),
            photo: String::new(),
            is_composite,
            sub_articles: subs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn composite_expands_to_fresh_incomplete_items() {
        let items = composite_items(&product(true, &["A", "B"]));
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(items.iter().all(|i| !i.is_complete));
        assert_ne!(items[0].id, items[1].id);
    }

    #[test]
    fn plain_product_has_no_items_even_with_sub_articles() {
        assert!(composite_items(&product(false, &["A"])).is_empty());
    }

    #[test]
    fn expand_carries_order_info() {
        let order = RawOrder {
            id: "p-1".into(),
            article: "X".into(),
            created_at: Utc::now(),
            quantity: 3,
            order_number: "p-1".into(),
            shipment_at: None,
        };
        let entry = expand(Marketplace::Wb, &order, &product(false, &[]));
        assert_eq!(entry.marketplace, Marketplace::Wb);
        assert_eq!(entry.info.quantity, 3);
        assert_eq!(entry.info.order_number, "p-1");
        assert_eq!(entry.order_created_at, order.created_at);
    }
}
