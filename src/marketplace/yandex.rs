//! Yandex Market partner API.
use super::{ClientError, OrderFeed, RawOrder, RestClient, StatusListing};
use crate::model::Marketplace;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{instrument, warn};

pub const BASE_URL: &str = "https://api.partner.market.yandex.ru";

pub const STATUS_PROCESSING: &str = "PROCESSING";
pub const SUBSTATUS_SHIPPED: &str = "SHIPPED";

const CREATION_DATE_FORMAT: &str = "%d-%m-%Y %H:%M:%S";
const SHIPMENT_DATE_FORMAT: &str = "%d-%m-%Y";
/// Creation dates are reported in Moscow time.
const MSK_OFFSET_SECS: i32 = 3 * 3600;
const MAX_PAGES: u32 = 50;

#[derive(Debug, Clone)]
pub struct YandexClient {
    rest: RestClient,
    campaign_id: String,
}

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    #[serde(default)]
    pager: Pager,
    #[serde(default)]
    orders: Vec<YandexOrder>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pager {
    #[serde(default)]
    current_page: u32,
    #[serde(default)]
    pages_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YandexOrder {
    id: u64,
    #[serde(default)]
    substatus: String,
    creation_date: String,
    #[serde(default)]
    items: Vec<OrderItem>,
    #[serde(default)]
    delivery: Delivery,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderItem {
    id: u64,
    offer_id: String,
    #[serde(default)]
    count: i32,
}

#[derive(Debug, Default, Deserialize)]
struct Delivery {
    #[serde(default)]
    shipments: Vec<Shipment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Shipment {
    #[serde(default)]
    shipment_date: Option<String>,
}

fn parse_creation_date(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, CREATION_DATE_FORMAT).ok()?;
    let msk = FixedOffset::east_opt(MSK_OFFSET_SECS)?;
    msk.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_shipment_date(raw: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, SHIPMENT_DATE_FORMAT).ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

impl YandexOrder {
    /// One order line per item; the item id is the queue id.
    fn into_orders(self) -> Vec<RawOrder> {
        let created_at = parse_creation_date(&self.creation_date).unwrap_or_else(|| {
            warn!(order = self.id, raw = %self.creation_date, "unparseable creation date");
            Utc::now()
        });
        let shipment_at = self
            .delivery
            .shipments
            .first()
            .and_then(|s| s.shipment_date.as_deref())
            .and_then(parse_shipment_date);
        let order_number = self.id.to_string();
        self.items
            .into_iter()
            .map(|item| RawOrder {
                id: item.id.to_string(),
                article: item.offer_id,
                created_at,
                quantity: item.count,
                order_number: order_number.clone(),
                shipment_at,
            })
            .collect()
    }
}

impl YandexClient {
    pub fn new(token: &str, campaign_id: &str, timeout: Duration) -> Result<Self, ClientError> {
        Self::with_base_url(BASE_URL, token, campaign_id, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        token: &str,
        campaign_id: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let rest = RestClient::new(base_url, timeout)?
            .with_header("authorization", &format!("Bearer {token}"))?;
        Ok(Self {
            rest,
            campaign_id: campaign_id.to_string(),
        })
    }

    #[instrument(skip(self), fields(campaign = %self.campaign_id))]
    async fn orders(&self, status: &str) -> Result<Vec<YandexOrder>, ClientError> {
        let mut orders = Vec::new();
        let mut page = 1;
        loop {
            let path = format!(
                "/campaigns/{}/orders?status={status}&page={page}",
                self.campaign_id
            );
            let res: OrdersResponse = self.rest.get_json(&path).await?;
            let done = res.orders.is_empty() || res.pager.current_page >= res.pager.pages_count;
            orders.extend(res.orders);
            if done || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderFeed for YandexClient {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Yandex
    }

    async fn list_new_orders(&self) -> Result<Vec<RawOrder>, ClientError> {
        let orders = self.orders(STATUS_PROCESSING).await?;
        Ok(orders
            .into_iter()
            .filter(|o| o.substatus != SUBSTATUS_SHIPPED)
            .flat_map(YandexOrder::into_orders)
            .collect())
    }
}

#[async_trait]
impl StatusListing for YandexClient {
    async fn list_orders_by_status(&self, status: &str) -> Result<Vec<RawOrder>, ClientError> {
        let orders = self.orders(status).await?;
        Ok(orders.into_iter().flat_map(YandexOrder::into_orders).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn creation_date_is_moscow_time() {
        let dt = parse_creation_date("01-03-2024 13:30:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T10:30:00+00:00");
        assert!(parse_creation_date("2024-03-01").is_none());
    }

    #[test]
    fn shipment_date_is_a_calendar_day() {
        let dt = parse_shipment_date("05-03-2024").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-05T00:00:00+00:00");
        assert!(parse_shipment_date("").is_none());
    }

    #[test]
    fn items_become_order_lines() {
        let res: OrdersResponse = serde_json::from_value(json!({
            "pager": {"currentPage": 1, "pagesCount": 1, "total": 1},
            "orders": [{
                "id": 9001,
                "status": "PROCESSING",
                "substatus": "STARTED",
                "creationDate": "01-03-2024 13:30:00",
                "items": [
                    {"id": 11, "offerId": "vase", "count": 2},
                    {"id": 12, "offerId": "cup", "count": 1}
                ],
                "delivery": {"shipments": [{"id": 1, "shipmentDate": "05-03-2024"}]}
            }]
        }))
        .unwrap();
        assert_eq!(res.pager.pages_count, 1);

        let lines: Vec<RawOrder> = res.orders.into_iter().flat_map(YandexOrder::into_orders).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].id, "11");
        assert_eq!(lines[1].id, "12");
        assert_eq!(lines[0].order_number, "9001");
        assert_eq!(lines[0].quantity, 2);
        assert!(lines.iter().all(|l| l.shipment_at.is_some()));
    }

    #[test]
    fn order_without_shipments_has_no_shipment_date() {
        let order: YandexOrder = serde_json::from_value(json!({
            "id": 1,
            "creationDate": "01-03-2024 13:30:00",
            "items": [{"id": 2, "offerId": "vase", "count": 1}]
        }))
        .unwrap();
        assert!(order.into_orders()[0].shipment_at.is_none());
    }
}
