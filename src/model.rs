use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Wb,
    Ozon,
    Yandex,
}

impl Marketplace {
    pub const ALL: [Marketplace; 3] = [Marketplace::Wb, Marketplace::Ozon, Marketplace::Yandex];

    pub fn as_str(&self) -> &'static str {
        match self {
            Marketplace::Wb => "wb",
            Marketplace::Ozon => "ozon",
            Marketplace::Yandex => "yandex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wb" => Some(Marketplace::Wb),
            "ozon" => Some(Marketplace::Ozon),
            "yandex" => Some(Marketplace::Yandex),
            _ => None,
        }
    }

    /// Whether orders from this marketplace carry a planned shipment date.
    /// Listings for these marketplaces sort by that date first.
    pub fn reports_shipment_dates(&self) -> bool {
        matches!(self, Marketplace::Ozon | Marketplace::Yandex)
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Marketplace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Marketplace::parse(&s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown marketplace '{s}' (expected wb, ozon or yandex)"))
    }
}

/// One sub-article of a composite product, tracked as a checklist entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompositeItem {
    pub id: String,
    pub name: String,
    pub is_complete: bool,
}

impl CompositeItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            is_complete: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderInfo {
    pub order_number: String,
    pub order_shipment_at: Option<DateTime<Utc>>,
    pub quantity: i32,
}

/// A queue entry as produced by ingestion, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueueEntry {
    pub id: String,
    pub article: String,
    pub marketplace: Marketplace,
    pub items: Vec<CompositeItem>,
    pub order_created_at: DateTime<Utc>,
    pub info: OrderInfo,
}

/// A persisted queue entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: String,
    pub article: String,
    pub marketplace: Marketplace,
    pub items: Vec<CompositeItem>,
    pub order_created_at: DateTime<Utc>,
    pub info: OrderInfo,
    pub is_complete: bool,
    pub is_printing: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marketplace_round_trips_through_str() {
        for mp in Marketplace::ALL {
            assert_eq!(Marketplace::parse(mp.as_str()), Some(mp));
        }
        assert_eq!("OZON".parse::<Marketplace>().unwrap(), Marketplace::Ozon);
        assert!("amazon".parse::<Marketplace>().is_err());
    }

    #[test]
    fn composite_items_get_distinct_ids() {
        let a = CompositeItem::new("A");
        let b = CompositeItem::new("A");
        assert_ne!(a.id, b.id);
        assert!(!a.is_complete);
    }
}
