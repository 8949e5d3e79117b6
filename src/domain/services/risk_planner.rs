//! Stop-loss and take-profit planning
//!
//! Pure, direction-symmetric functions: a LONG subtracts risk from the entry
//! and adds reward, a SHORT mirrors both.

use crate::domain::entities::trade::Side;
use crate::domain::errors::TradeError;
use crate::domain::services::indicators::{Candle, ATR};
use crate::domain::value_objects::risk_plan::RiskPlan;

/// Reward multiples of the risk distance used by [`risk_multiple_targets`]
pub const RISK_MULTIPLES: [f64; 4] = [1.0, 2.0, 3.0, 4.0];

/// Candles always fetched at open time: current plus reference candle, with slack
const MIN_CANDLES: usize = 5;

/// Stop at `volatility * multiplier` away from entry, against the position
pub fn volatility_stop_loss(entry: f64, side: Side, volatility: f64, multiplier: f64) -> f64 {
    entry - side.sign() * volatility * multiplier
}

/// Stop at the reference candle's high-low range times `multiplier`, against the position
pub fn candle_stop_loss(entry: f64, side: Side, high: f64, low: f64, multiplier: f64) -> f64 {
    entry - side.sign() * (high - low).abs() * multiplier
}

/// Targets at 1R..4R where R is the entry-stop distance.
///
/// A zero distance yields four copies of `entry`; callers must not trade it.
pub fn risk_multiple_targets(entry: f64, side: Side, stop: f64) -> Vec<f64> {
    let risk_distance = (entry - stop).abs();
    if risk_distance == 0.0 {
        return vec![entry; RISK_MULTIPLES.len()];
    }
    RISK_MULTIPLES
        .iter()
        .map(|r| entry + side.sign() * risk_distance * r)
        .collect()
}

/// One target per point offset, in input order
pub fn fixed_point_targets(entry: f64, side: Side, points: &[f64]) -> Vec<f64> {
    points.iter().map(|p| entry + side.sign() * p).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopStrategy {
    /// Range of the previous completed candle
    CandleRange { multiplier: f64 },
    /// Average True Range over `atr_period` candles
    Volatility { multiplier: f64, atr_period: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetStrategy {
    FixedPoints(Vec<f64>),
    RiskMultiple,
}

/// Composes one stop strategy with one target strategy
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPlanner {
    pub stop: StopStrategy,
    pub targets: TargetStrategy,
}

impl RiskPlanner {
    pub fn new(stop: StopStrategy, targets: TargetStrategy) -> Self {
        Self { stop, targets }
    }

    /// How many candles the planner needs at open time
    pub fn candles_needed(&self) -> usize {
        match self.stop {
            StopStrategy::CandleRange { .. } => MIN_CANDLES,
            StopStrategy::Volatility { atr_period, .. } => MIN_CANDLES.max(atr_period + 2),
        }
    }

    /// Volatility measure over completed candles, when the stop strategy uses one.
    /// The last candle is still forming and is left out.
    pub fn volatility(&self, candles: &[Candle]) -> Option<f64> {
        match self.stop {
            StopStrategy::CandleRange { .. } => None,
            StopStrategy::Volatility { atr_period, .. } => {
                let completed = &candles[..candles.len().saturating_sub(1)];
                ATR::new(atr_period).latest(completed)
            }
        }
    }

    /// Plan stop and targets for `entry`.
    ///
    /// # Errors
    /// `DegenerateRiskPlan` when the volatility measure is missing or the
    /// resulting levels coincide with the entry.
    pub fn plan(
        &self,
        entry: f64,
        side: Side,
        reference: &Candle,
        volatility: Option<f64>,
    ) -> Result<RiskPlan, TradeError> {
        let stop_loss = match self.stop {
            StopStrategy::CandleRange { multiplier } => {
                candle_stop_loss(entry, side, reference.high, reference.low, multiplier)
            }
            StopStrategy::Volatility { multiplier, .. } => {
                let volatility = volatility.ok_or_else(|| TradeError::DegenerateRiskPlan {
                    reason: "volatility measure unavailable".to_string(),
                })?;
                volatility_stop_loss(entry, side, volatility, multiplier)
            }
        };

        let targets = match &self.targets {
            TargetStrategy::FixedPoints(points) => fixed_point_targets(entry, side, points),
            TargetStrategy::RiskMultiple => risk_multiple_targets(entry, side, stop_loss),
        };

        let plan = RiskPlan {
            entry_price: entry,
            side,
            stop_loss,
            targets,
        };
        match plan.degeneracy() {
            Some(reason) => Err(TradeError::DegenerateRiskPlan { reason }),
            None => Ok(plan),
        }
    }
}

impl Default for RiskPlanner {
    fn default() -> Self {
        Self::new(
            StopStrategy::CandleRange { multiplier: 2.0 },
            TargetStrategy::FixedPoints(vec![300.0, 500.0, 800.0, 1000.0]),
        )
    }
}
