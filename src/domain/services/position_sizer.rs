//! Position sizing service
//!
//! Converts a [`SizingPolicy`] plus balance, price and leverage into an
//! exchange-tradable quantity:
//! - the policy picks the raw quantity
//! - the raw quantity is rounded down to the lot step
//! - a quantity that rounds to zero is an error, never silently resized

use crate::domain::errors::TradeError;
use crate::domain::value_objects::sizing_policy::SizingPolicy;

/// Absorbs float noise such as 0.003 / 0.001 = 2.9999999999999996
const STEP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct PositionSizer {
    lot_step: f64,
}

impl PositionSizer {
    pub fn new(lot_step: f64) -> Self {
        Self { lot_step }
    }

    /// Quantity implied by the policy before lot-step rounding
    pub fn raw_quantity(policy: &SizingPolicy, balance: f64, price: f64, leverage: f64) -> f64 {
        match *policy {
            SizingPolicy::FixedQuantity(amount) => amount,
            SizingPolicy::PercentOfBalance(pct) => (balance * pct / 100.0) / price,
            SizingPolicy::FixedMargin(margin) => (margin * leverage) / price,
            SizingPolicy::PercentMargin(pct) => (balance * pct / 100.0 * leverage) / price,
        }
    }

    /// Size a position and round it to the lot step
    ///
    /// # Errors
    /// `TradeError::InvalidQuantity` when the rounded quantity is not positive
    pub fn size(
        &self,
        policy: &SizingPolicy,
        balance: f64,
        price: f64,
        leverage: f64,
    ) -> Result<f64, TradeError> {
        let raw = Self::raw_quantity(policy, balance, price, leverage);
        let quantity = if raw.is_finite() {
            self.round_to_step(raw)
        } else {
            raw
        };

        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(TradeError::InvalidQuantity {
                quantity,
                step: self.lot_step,
            });
        }
        Ok(quantity)
    }

    /// Round down to a multiple of the lot step, at the step's precision
    pub fn round_to_step(&self, quantity: f64) -> f64 {
        let units = (quantity / self.lot_step + STEP_EPSILON).floor();
        self.units_to_quantity(units.max(0.0) as u64)
    }

    /// Split `total` across `legs` take-profit orders in whole lot steps.
    ///
    /// The legs always sum to `total`. Steps that do not divide evenly go to
    /// the earliest legs, so a small position is taken off at the nearest
    /// targets first. Legs may be zero when there are fewer steps than legs.
    pub fn split(&self, total: f64, legs: usize) -> Vec<f64> {
        if legs == 0 {
            return Vec::new();
        }
        let units = (total / self.lot_step).round().max(0.0) as u64;
        let base = units / legs as u64;
        let extra = (units % legs as u64) as usize;

        (0..legs)
            .map(|leg| {
                let leg_units = base + u64::from(leg < extra);
                self.units_to_quantity(leg_units)
            })
            .collect()
    }

    fn units_to_quantity(&self, units: u64) -> f64 {
        let decimals = step_decimals(self.lot_step);
        let value = units as f64 * self.lot_step;
        format!("{:.*}", decimals, value).parse().unwrap_or(value)
    }
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::new(0.001)
    }
}

/// Decimal places of a lot step such as 0.001 -> 3
fn step_decimals(step: f64) -> usize {
    let text = format!("{}", step);
    text.split_once('.')
        .map(|(_, fraction)| fraction.len())
        .unwrap_or(0)
        .min(12)
}
