//! Trade Store Trait
//!
//! Durable mapping from trade id to [`TradeRecord`]. It is the only recovery
//! mechanism across restarts: a monitor that is restarted reads its state
//! back from here.

use async_trait::async_trait;

use crate::domain::entities::trade::{TradeField, TradeRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Trade {0} already exists")]
    DuplicateId(String),
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    /// All stored trades in insertion order. Unreadable storage yields an
    /// empty list.
    async fn list(&self) -> Vec<TradeRecord>;

    async fn add(&self, record: &TradeRecord) -> Result<(), StoreError>;

    /// Update one field of one trade. Unknown ids are ignored.
    async fn update_field(&self, id: &str, field: TradeField) -> Result<(), StoreError>;

    /// Delete one trade. Unknown ids are ignored.
    async fn remove(&self, id: &str) -> Result<(), StoreError>;
}
