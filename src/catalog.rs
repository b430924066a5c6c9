//! Product catalog: article code → manufacturable product definition.
//!
//! Ingestion and the queue listing only need the batch read in [`Catalog`];
//! [`SqliteCatalog::add_products`] exists to seed the table from an export.
use crate::db::model::{decode_json, encode_json};
use crate::db::{Pool, StoreError};
use crate::model::Marketplace;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use tracing::instrument;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub article: String,
    pub marketplace: Marketplace,
    pub name: String,
    #[serde(default)]
    pub photo: String,
    #[serde(default)]
    pub is_composite: bool,
    #[serde(default)]
    pub sub_articles: Vec<String>,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve many articles at once. Articles without a product are simply
    /// absent from the returned map.
    async fn get_by_articles_map(&self, articles: &[String]) -> Result<HashMap<String, Product>>;
}

#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: Pool,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    article: String,
    marketplace: String,
    name: String,
    photo: String,
    is_composite: bool,
    sub_articles: String,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let marketplace = Marketplace::parse(&row.marketplace)
            .ok_or_else(|| StoreError::UnknownMarketplace(row.marketplace.clone()))?;
        Ok(Product {
            article: row.article,
            marketplace,
            name: row.name,
            photo: row.photo,
            is_composite: row.is_composite,
            sub_articles: decode_json("sub_articles", &row.sub_articles)?,
        })
    }
}

impl SqliteCatalog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert or replace products keyed by `(article, marketplace)`.
    #[instrument(skip_all, fields(count = products.len()))]
    pub async fn add_products(&self, products: &[Product]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let mut written = 0;
        for product in products {
            let sub_articles = encode_json("sub_articles", &product.sub_articles)?;
            written += sqlx::query(
                "INSERT INTO products \
                 (article, marketplace, name, photo, is_composite, sub_articles, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (article, marketplace) DO UPDATE SET \
                   name = excluded.name, photo = excluded.photo, \
                   is_composite = excluded.is_composite, sub_articles = excluded.sub_articles, \
                   updated_at = excluded.updated_at",
            )
            .bind(&product.article)
            .bind(product.marketplace.as_str())
            .bind(&product.name)
            .bind(&product.photo)
            .bind(product.is_composite)
            .bind(sub_articles)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to write product {}", product.article))?
            .rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    #[instrument(skip_all, fields(articles = articles.len()))]
    async fn get_by_articles_map(&self, articles: &[String]) -> Result<HashMap<String, Product>> {
        if articles.is_empty() {
            return Ok(HashMap::new());
        }

        let mut by_article = HashMap::new();
        for chunk in articles.chunks(500) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT article, marketplace, name, photo, is_composite, sub_articles \
                 FROM products WHERE article IN (",
            );
            let mut list = qb.separated(", ");
            for article in chunk {
                list.push_bind(article.clone());
            }
            list.push_unseparated(") ORDER BY marketplace");
            let rows: Vec<ProductRow> = qb
                .build_query_as::<ProductRow>()
                .fetch_all(&self.pool)
                .await
                .context("failed to query products")?;
            for row in rows {
                let product = Product::try_from(row)?;
                by_article.insert(product.article.clone(), product);
            }
        }
        Ok(by_article)
    }
}
