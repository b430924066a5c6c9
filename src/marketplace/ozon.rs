//! Ozon seller API (FBS postings).
use super::{ClientError, OrderFeed, RawOrder, RestClient, StatusListing};
use crate::model::Marketplace;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

pub const BASE_URL: &str = "https://api-seller.ozon.ru";

pub const STATUS_AWAITING_DELIVER: &str = "awaiting_deliver";
pub const STATUS_DELIVERING: &str = "delivering";

const UNFULFILLED_LIST_PATH: &str = "/v3/posting/fbs/unfulfilled/list";
const PAGE_LIMIT: u32 = 1000;
const CUTOFF_WINDOW_DAYS: i64 = 30;
/// Hard stop for offset paging.
const MAX_PAGES: u32 = 50;

#[derive(Debug, Clone)]
pub struct OzonClient {
    rest: RestClient,
}

#[derive(Debug, Serialize)]
struct UnfulfilledListRequest<'a> {
    dir: &'static str,
    limit: u32,
    offset: u32,
    filter: UnfulfilledFilter<'a>,
}

#[derive(Debug, Serialize)]
struct UnfulfilledFilter<'a> {
    cutoff_from: DateTime<Utc>,
    cutoff_to: DateTime<Utc>,
    status: &'a str,
}

#[derive(Debug, Deserialize)]
struct UnfulfilledListResponse {
    result: UnfulfilledResult,
}

#[derive(Debug, Default, Deserialize)]
struct UnfulfilledResult {
    #[serde(default)]
    postings: Vec<Posting>,
}

#[derive(Debug, Deserialize)]
struct Posting {
    posting_number: String,
    in_process_at: DateTime<Utc>,
    #[serde(default)]
    shipment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    products: Vec<PostingProduct>,
}

#[derive(Debug, Deserialize)]
struct PostingProduct {
    offer_id: String,
    #[serde(default)]
    quantity: i32,
}

impl Posting {
    /// One order line per product; the posting number is the queue id.
    fn into_orders(self) -> impl Iterator<Item = RawOrder> {
        let Posting {
            posting_number,
            in_process_at,
            shipment_date,
            products,
        } = self;
        products.into_iter().map(move |product| RawOrder {
            id: posting_number.clone(),
            article: product.offer_id,
            created_at: in_process_at,
            quantity: product.quantity,
            order_number: posting_number.clone(),
            shipment_at: shipment_date,
        })
    }
}

impl OzonClient {
    pub fn new(client_id: &str, api_key: &str, timeout: Duration) -> Result<Self, ClientError> {
        Self::with_base_url(BASE_URL, client_id, api_key, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        client_id: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let rest = RestClient::new(base_url, timeout)?
            .with_header("client-id", client_id)?
            .with_header("api-key", api_key)?;
        Ok(Self { rest })
    }

    #[instrument(skip(self))]
    async fn unfulfilled(&self, status: &str) -> Result<Vec<RawOrder>, ClientError> {
        let now = Utc::now();
        let window = ChronoDuration::days(CUTOFF_WINDOW_DAYS);
        let mut orders = Vec::new();
        for page in 0..MAX_PAGES {
            let request = UnfulfilledListRequest {
                dir: "ASC",
                limit: PAGE_LIMIT,
                offset: page * PAGE_LIMIT,
                filter: UnfulfilledFilter {
                    cutoff_from: now - window,
                    cutoff_to: now + window,
                    status,
                },
            };
            let res: UnfulfilledListResponse =
                self.rest.post_json(UNFULFILLED_LIST_PATH, &request).await?;
            let fetched = res.result.postings.len();
            orders.extend(res.result.postings.into_iter().flat_map(Posting::into_orders));
            if fetched < PAGE_LIMIT as usize {
                break;
            }
            debug!(page, fetched, "requesting next postings page");
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderFeed for OzonClient {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Ozon
    }

    async fn list_new_orders(&self) -> Result<Vec<RawOrder>, ClientError> {
        self.unfulfilled(STATUS_AWAITING_DELIVER).await
    }
}

#[async_trait]
impl StatusListing for OzonClient {
    async fn list_orders_by_status(&self, status: &str) -> Result<Vec<RawOrder>, ClientError> {
        self.unfulfilled(status).await
    }
}
