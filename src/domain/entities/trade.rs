use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::entities::order::OrderSide;
use crate::domain::errors::ValidationError;

/// Trade direction. Parsed case-insensitively, always rendered `LONG` / `SHORT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "LONG", alias = "long")]
    Long,
    #[serde(rename = "SHORT", alias = "short")]
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    /// +1 in the profit direction of a long, -1 for a short
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Order side that opens a position in this direction
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side of the protective legs
    pub fn exit_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// Whether `price` has touched `target` in the profit direction
    pub fn has_reached(&self, price: f64, target: f64) -> bool {
        match self {
            Side::Long => price >= target,
            Side::Short => price <= target,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Ok(Side::Long),
            "SHORT" => Ok(Side::Short),
            _ => Err(ValidationError::InvalidSide(s.to_string())),
        }
    }
}

/// Persisted state of one open trade.
///
/// Field names are the `trades.json` keys; fields added after the first
/// layout default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub entry_price: f64,
    #[serde(default)]
    pub sl_order_id: Option<String>,
    #[serde(default)]
    pub tp_order_ids: Vec<String>,
    /// Prices of the take-profit legs in `tp_order_ids`, same order
    #[serde(default)]
    pub targets: Vec<f64>,
    /// 1-based target index that moves the stop to breakeven, 0 disables
    #[serde(default)]
    pub monitor_trigger_level: u32,
    #[serde(default)]
    pub sl_moved: bool,
}

impl TradeRecord {
    /// Price that triggers the breakeven migration, if one is configured and in range
    pub fn trigger_target(&self) -> Option<f64> {
        let index = (self.monitor_trigger_level as usize).checked_sub(1)?;
        self.targets.get(index).copied()
    }

    /// Applies a field update in memory. Returns false when the update was
    /// refused because it would revert `sl_moved`.
    pub fn apply(&mut self, field: &TradeField) -> bool {
        match field {
            TradeField::StopLossOrderId(id) => self.sl_order_id = id.clone(),
            TradeField::StopMoved(moved) => {
                if self.sl_moved && !moved {
                    return false;
                }
                self.sl_moved = *moved;
            }
            TradeField::TriggerLevel(level) => self.monitor_trigger_level = *level,
        }
        true
    }
}

/// The mutable fields of a [`TradeRecord`]. Identity, sizing and targets are
/// fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeField {
    StopLossOrderId(Option<String>),
    StopMoved(bool),
    TriggerLevel(u32),
}

impl TradeField {
    /// Storage key of the field
    pub fn key(&self) -> &'static str {
        match self {
            TradeField::StopLossOrderId(_) => "sl_order_id",
            TradeField::StopMoved(_) => "sl_moved",
            TradeField::TriggerLevel(_) => "monitor_trigger_level",
        }
    }
}
