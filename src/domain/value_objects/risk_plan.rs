use crate::domain::entities::trade::Side;

/// Stop-loss and take-profit levels for one entry price. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPlan {
    pub entry_price: f64,
    pub side: Side,
    pub stop_loss: f64,
    pub targets: Vec<f64>,
}

impl RiskPlan {
    /// Distance between entry and stop
    pub fn risk_distance(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }

    /// Describes why the plan must not be traded, if it must not
    pub fn degeneracy(&self) -> Option<String> {
        if !self.stop_loss.is_finite() || self.targets.iter().any(|t| !t.is_finite()) {
            return Some("non-finite level".to_string());
        }
        if self.risk_distance() == 0.0 {
            return Some(format!("stop-loss equals entry price {}", self.entry_price));
        }
        if let Some(index) = self.targets.iter().position(|t| *t == self.entry_price) {
            return Some(format!(
                "target {} equals entry price {}",
                index + 1,
                self.entry_price
            ));
        }
        if self.targets.iter().any(|t| *t <= 0.0) || self.stop_loss <= 0.0 {
            return Some("level at or below zero".to_string());
        }
        None
    }
}
