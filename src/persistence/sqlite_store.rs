//! SQLite trade store
//!
//! One row per trade; field updates are single keyed `UPDATE` statements.

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::models::TradeRow;
use super::DbPool;
use crate::domain::entities::trade::{TradeField, TradeRecord};
use crate::domain::repositories::trade_store::{StoreError, TradeStore};

pub struct SqliteTradeStore {
    pool: DbPool,
}

impl SqliteTradeStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_all(&self) -> Result<Vec<TradeRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TradeRow>(
            r#"
            SELECT id, symbol, side, qty, entry_price, sl_order_id,
                   tp_order_ids, targets, monitor_trigger_level, sl_moved
            FROM trades
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to list trades: {}", e)))?;

        rows.into_iter().map(TradeRecord::try_from).collect()
    }
}

#[async_trait]
impl TradeStore for SqliteTradeStore {
    async fn list(&self) -> Vec<TradeRecord> {
        match self.fetch_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not read trades: {}", e);
                Vec::new()
            }
        }
    }

    async fn add(&self, record: &TradeRecord) -> Result<(), StoreError> {
        let row = TradeRow::try_from(record)?;
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, symbol, side, qty, entry_price, sl_order_id,
                tp_order_ids, targets, monitor_trigger_level, sl_moved
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&row.id)
        .bind(&row.symbol)
        .bind(&row.side)
        .bind(row.qty)
        .bind(row.entry_price)
        .bind(&row.sl_order_id)
        .bind(&row.tp_order_ids)
        .bind(&row.targets)
        .bind(row.monitor_trigger_level)
        .bind(row.sl_moved)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateId(record.id.clone())
            }
            other => {
                error!("Failed to insert trade {}: {}", record.id, other);
                StoreError::Database(format!("Failed to insert trade: {}", other))
            }
        })?;

        debug!("Inserted trade {} for {}", record.id, record.symbol);
        Ok(())
    }

    async fn update_field(&self, id: &str, field: TradeField) -> Result<(), StoreError> {
        let query = match &field {
            TradeField::StopLossOrderId(order_id) => {
                sqlx::query("UPDATE trades SET sl_order_id = ?1 WHERE id = ?2").bind(order_id.clone())
            }
            TradeField::StopMoved(true) => {
                sqlx::query("UPDATE trades SET sl_moved = ?1 WHERE id = ?2").bind(true)
            }
            TradeField::StopMoved(false) => {
                warn!("Refusing to reset sl_moved on trade {}", id);
                return Ok(());
            }
            TradeField::TriggerLevel(level) => {
                sqlx::query("UPDATE trades SET monitor_trigger_level = ?1 WHERE id = ?2")
                    .bind(i64::from(*level))
            }
        };

        let rows_affected = query
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to update trade {}: {}", id, e)))?
            .rows_affected();

        if rows_affected == 0 {
            debug!("Update of unknown trade {} ignored", id);
        } else {
            debug!("Trade {} field {} updated", id, field.key());
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let rows_affected = sqlx::query("DELETE FROM trades WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to delete trade {}: {}", id, e)))?
            .rows_affected();

        if rows_affected == 0 {
            debug!("Removal of unknown trade {} ignored", id);
        }
        Ok(())
    }
}
