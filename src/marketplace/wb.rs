//! Wildberries marketplace API.
use super::{
    ClientError, Container, ContainerPage, ContainerSource, OrderFeed, OrderStatus, PageCursor,
    RawOrder, RestClient, StatusLookup,
};
use crate::model::Marketplace;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

pub const BASE_URL: &str = "https://marketplace-api.wildberries.ru";

/// Supplier status WB reports for an order the buyer cancelled.
pub const STATUS_DECLINED_BY_CLIENT: &str = "declined_by_client";

const SUPPLIES_PAGE_LIMIT: u32 = 1000;
const STATUS_BATCH: usize = 1000;

#[derive(Debug, Clone)]
pub struct WbClient {
    rest: RestClient,
}

#[derive(Debug, Deserialize)]
struct NewOrdersResponse {
    #[serde(default)]
    orders: Vec<WbOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WbOrder {
    id: u64,
    article: String,
    created_at: DateTime<Utc>,
}

impl From<WbOrder> for RawOrder {
    fn from(order: WbOrder) -> Self {
        let id = order.id.to_string();
        RawOrder {
            order_number: id.clone(),
            id,
            article: order.article,
            created_at: order.created_at,
            quantity: 1,
            shipment_at: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SuppliesResponse {
    #[serde(default)]
    supplies: Vec<Supply>,
    #[serde(default)]
    next: i64,
}

#[derive(Debug, Deserialize)]
struct Supply {
    id: String,
    #[serde(default)]
    done: bool,
}

impl SuppliesResponse {
    fn into_page(self) -> ContainerPage {
        let next = if self.next > 0 && !self.supplies.is_empty() {
            Some(PageCursor::new(self.next.to_string()))
        } else {
            None
        };
        ContainerPage {
            containers: self
                .supplies
                .into_iter()
                .map(|s| Container { id: s.id, done: s.done })
                .collect(),
            next,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupplyOrdersResponse {
    #[serde(default)]
    orders: Vec<SupplyOrder>,
}

#[derive(Debug, Deserialize)]
struct SupplyOrder {
    id: u64,
}

#[derive(Debug, Serialize)]
struct StatusRequest<'a> {
    orders: &'a [u64],
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    orders: Vec<WbOrderStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WbOrderStatus {
    id: u64,
    #[serde(default)]
    supplier_status: String,
}

impl WbClient {
    pub fn new(token: &str, timeout: Duration) -> Result<Self, ClientError> {
        Self::with_base_url(BASE_URL, token, timeout)
    }

    pub fn with_base_url(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ClientError> {
        let rest = RestClient::new(base_url, timeout)?.with_header("authorization", token)?;
        Ok(Self { rest })
    }
}

fn parse_ids(ids: &[String]) -> Result<Vec<u64>, ClientError> {
    ids.iter()
        .map(|id| id.parse::<u64>().map_err(|_| ClientError::InvalidId(id.clone())))
        .collect()
}

#[async_trait]
impl OrderFeed for WbClient {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Wb
    }

    #[instrument(skip_all)]
    async fn list_new_orders(&self) -> Result<Vec<RawOrder>, ClientError> {
        let res: NewOrdersResponse = self.rest.get_json("/api/v3/orders/new").await?;
        Ok(res.orders.into_iter().map(RawOrder::from).collect())
    }
}

#[async_trait]
impl ContainerSource for WbClient {
    #[instrument(skip_all, fields(cursor = cursor.map(PageCursor::as_str)))]
    async fn list_open_containers(
        &self,
        cursor: Option<&PageCursor>,
    ) -> Result<ContainerPage, ClientError> {
        let next = cursor.map(PageCursor::as_str).unwrap_or("0");
        let path = format!("/api/v3/supplies?limit={SUPPLIES_PAGE_LIMIT}&next={next}");
        let res: SuppliesResponse = self.rest.get_json(&path).await?;
        Ok(res.into_page())
    }

    #[instrument(skip(self))]
    async fn orders_in_container(&self, container_id: &str) -> Result<Vec<String>, ClientError> {
        let path = format!("/api/v3/supplies/{container_id}/orders");
        let res: SupplyOrdersResponse = self.rest.get_json(&path).await?;
        Ok(res.orders.into_iter().map(|o| o.id.to_string()).collect())
    }
}

#[async_trait]
impl StatusLookup for WbClient {
    #[instrument(skip_all, fields(ids = ids.len()))]
    async fn order_statuses(&self, ids: &[String]) -> Result<Vec<OrderStatus>, ClientError> {
        let ids = parse_ids(ids)?;
        let mut statuses = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(STATUS_BATCH) {
            let res: StatusResponse = self
                .rest
                .post_json("/api/v3/orders/status", &StatusRequest { orders: chunk })
                .await?;
            statuses.extend(res.orders.into_iter().map(|o| OrderStatus {
                id: o.id.to_string(),
                status: o.supplier_status,
            }));
        }
        Ok(statuses)
    }
}
