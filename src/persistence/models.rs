//! Database Models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::entities::trade::TradeRecord;
use crate::domain::repositories::trade_store::StoreError;

/// Row of the `trades` table. Order ids and targets are JSON text columns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRow {
    pub id: String,
    pub symbol: String,
    pub side: String, // "LONG" or "SHORT"
    pub qty: f64,
    pub entry_price: f64,
    pub sl_order_id: Option<String>,
    pub tp_order_ids: String,
    pub targets: String,
    pub monitor_trigger_level: i64,
    pub sl_moved: bool,
}

impl TryFrom<TradeRow> for TradeRecord {
    type Error = StoreError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        let side = row
            .side
            .parse()
            .map_err(|e| StoreError::Database(format!("trade {}: {}", row.id, e)))?;
        let monitor_trigger_level = u32::try_from(row.monitor_trigger_level).map_err(|_| {
            StoreError::Database(format!(
                "trade {}: invalid trigger level {}",
                row.id, row.monitor_trigger_level
            ))
        })?;
        Ok(TradeRecord {
            side,
            qty: row.qty,
            entry_price: row.entry_price,
            sl_order_id: row.sl_order_id,
            tp_order_ids: serde_json::from_str(&row.tp_order_ids)?,
            targets: serde_json::from_str(&row.targets)?,
            monitor_trigger_level,
            sl_moved: row.sl_moved,
            symbol: row.symbol,
            id: row.id,
        })
    }
}

impl TryFrom<&TradeRecord> for TradeRow {
    type Error = StoreError;

    fn try_from(record: &TradeRecord) -> Result<Self, Self::Error> {
        Ok(TradeRow {
            id: record.id.clone(),
            symbol: record.symbol.clone(),
            side: record.side.as_str().to_string(),
            qty: record.qty,
            entry_price: record.entry_price,
            sl_order_id: record.sl_order_id.clone(),
            tp_order_ids: serde_json::to_string(&record.tp_order_ids)?,
            targets: serde_json::to_string(&record.targets)?,
            monitor_trigger_level: i64::from(record.monitor_trigger_level),
            sl_moved: record.sl_moved,
        })
    }
}
