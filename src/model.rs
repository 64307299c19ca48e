use chrono::{DateTime, Utc};
use serde::Serialize;

/// One listing card as it appears in the rendered markup.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RawItem {
    pub link: String,
    pub title: String,
    pub raw_price: String,
}

/// A listing card with its price parsed into whole currency units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedItem {
    pub link: String,
    pub title: String,
    pub price: i64,
}

/// Identity of a persisted record: the source fingerprint plus the item link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub source_hash: String,
    pub item_id: String,
}

impl SnapshotKey {
    pub fn new(source_hash: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            source_hash: source_hash.into(),
            item_id: item_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub source_hash: String,
    pub item_id: String,
    pub price: i64,
    pub updated_at: DateTime<Utc>,
}

impl SnapshotRecord {
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey::new(self.source_hash.clone(), self.item_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    NewItem {
        link: String,
        price: i64,
        title: String,
    },
    PriceChanged {
        link: String,
        old_price: i64,
        new_price: i64,
        title: String,
    },
}

impl ChangeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEvent::NewItem { .. } => "new_item",
            ChangeEvent::PriceChanged { .. } => "price_changed",
        }
    }

    pub fn link(&self) -> &str {
        match self {
            ChangeEvent::NewItem { link, .. } | ChangeEvent::PriceChanged { link, .. } => link,
        }
    }
}
