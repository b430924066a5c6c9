//! Marketplace source adapters.
//!
//! Each capability a worker needs is its own trait so that a marketplace only
//! implements what its API offers, and tests can substitute recording fakes.

use crate::model::Marketplace;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod http;
pub mod ozon;
pub mod wb;
pub mod yandex;

pub use http::RestClient;
pub use ozon::OzonClient;
pub use wb::WbClient;
pub use yandex::YandexClient;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("marketplace returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
    #[error("order id {0:?} is not numeric")]
    InvalidId(String),
}

/// One order line as reported by a marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOrder {
    pub id: String,
    pub article: String,
    pub created_at: DateTime<Utc>,
    pub quantity: i32,
    pub order_number: String,
    pub shipment_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatus {
    pub id: String,
    pub status: String,
}

/// Opaque pagination token handed back by an adapter. Only ever compared for
/// equality and passed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A shipment container (WB "supply").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerPage {
    pub containers: Vec<Container>,
    /// `None` when the adapter has no further page.
    pub next: Option<PageCursor>,
}

/// Orders waiting to be produced.
#[async_trait]
pub trait OrderFeed: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    async fn list_new_orders(&self) -> Result<Vec<RawOrder>, ClientError>;
}

#[async_trait]
pub trait StatusListing: Send + Sync {
    async fn list_orders_by_status(&self, status: &str) -> Result<Vec<RawOrder>, ClientError>;
}

#[async_trait]
pub trait ContainerSource: Send + Sync {
    async fn list_open_containers(
        &self,
        cursor: Option<&PageCursor>,
    ) -> Result<ContainerPage, ClientError>;

    async fn orders_in_container(&self, container_id: &str) -> Result<Vec<String>, ClientError>;
}

#[async_trait]
pub trait StatusLookup: Send + Sync {
    async fn order_statuses(&self, ids: &[String]) -> Result<Vec<OrderStatus>, ClientError>;
}
