//! Position sizing policy value object
//!
//! Serialized the way the trading config file spells it:
//! `{"type": "PERCENTAGE", "value": 10.0}`.

use serde::{Deserialize, Serialize};

/// How the entry quantity is derived from balance, price and leverage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum SizingPolicy {
    /// Fixed amount of the base asset
    #[serde(rename = "FIXED", alias = "fixed")]
    FixedQuantity(f64),
    /// Percent of balance converted at price, leverage ignored
    #[serde(rename = "PERCENTAGE", alias = "percentage")]
    PercentOfBalance(f64),
    /// Fixed margin amount in quote currency, multiplied by leverage
    #[serde(rename = "MARGIN", alias = "margin")]
    FixedMargin(f64),
    /// Percent of balance used as margin, multiplied by leverage
    #[serde(rename = "MARGIN_PERCENTAGE", alias = "margin_percentage")]
    PercentMargin(f64),
}

impl SizingPolicy {
    pub fn value(&self) -> f64 {
        match *self {
            SizingPolicy::FixedQuantity(v)
            | SizingPolicy::PercentOfBalance(v)
            | SizingPolicy::FixedMargin(v)
            | SizingPolicy::PercentMargin(v) => v,
        }
    }

    /// Whether the account balance is an input to this policy
    pub fn needs_balance(&self) -> bool {
        matches!(
            self,
            SizingPolicy::PercentOfBalance(_) | SizingPolicy::PercentMargin(_)
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        let value = self.value();
        if !value.is_finite() || value <= 0.0 {
            return Err(format!("position size value must be positive, got {}", value));
        }
        match self {
            SizingPolicy::PercentOfBalance(p) | SizingPolicy::PercentMargin(p) if *p > 100.0 => {
                Err(format!("percentage must be <= 100, got {}", p))
            }
            _ => Ok(()),
        }
    }
}

impl Default for SizingPolicy {
    fn default() -> Self {
        SizingPolicy::FixedQuantity(0.001)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_config_shape() {
        let policy: SizingPolicy =
            serde_json::from_str(r#"{"type": "MARGIN_PERCENTAGE", "value": 5.0}"#).unwrap();
        assert_eq!(policy, SizingPolicy::PercentMargin(5.0));

        let policy: SizingPolicy =
            serde_json::from_str(r#"{"type": "fixed", "value": 0.002}"#).unwrap();
        assert_eq!(policy, SizingPolicy::FixedQuantity(0.002));
    }

    #[test]
    fn test_serialize_round_trips_type_tag() {
        let json = serde_json::to_value(SizingPolicy::FixedMargin(100.0)).unwrap();
        assert_eq!(json["type"], "MARGIN");
        assert_eq!(json["value"], 100.0);
    }

    #[test]
    fn test_needs_balance() {
        assert!(SizingPolicy::PercentOfBalance(10.0).needs_balance());
        assert!(SizingPolicy::PercentMargin(10.0).needs_balance());
        assert!(!SizingPolicy::FixedMargin(100.0).needs_balance());
        assert!(!SizingPolicy::FixedQuantity(0.1).needs_balance());
    }

    #[test]
    fn test_validate() {
        assert!(SizingPolicy::FixedQuantity(0.001).validate().is_ok());
        assert!(SizingPolicy::FixedQuantity(0.0).validate().is_err());
        assert!(SizingPolicy::PercentOfBalance(150.0).validate().is_err());
        assert!(SizingPolicy::FixedMargin(f64::NAN).validate().is_err());
    }
}
