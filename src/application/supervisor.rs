//! Trade lifecycle supervisor
//!
//! Opens a directional trade end to end: market data, sizing, risk plan,
//! operator confirmation, entry, protective orders and the persisted record.
//! Monitoring of the stored trade is handed to [`TradeMonitor`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::application::monitor::TradeMonitor;
use crate::config::TradingConfig;
use crate::domain::entities::order::Order;
use crate::domain::entities::trade::{Side, TradeRecord};
use crate::domain::errors::TradeError;
use crate::domain::repositories::exchange_client::ExecutionGateway;
use crate::domain::repositories::market_data::MarketData;
use crate::domain::repositories::trade_store::TradeStore;
use crate::domain::services::indicators::Candle;
use crate::domain::services::position_sizer::PositionSizer;
use crate::domain::services::risk_planner::RiskPlanner;
use crate::domain::value_objects::risk_plan::RiskPlan;
use crate::task_runner::retry_with_backoff;

/// Decides whether a planned trade goes ahead
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, plan: &TradePlan) -> bool;
}

/// Everything known about a trade before the entry order is sent
#[derive(Debug, Clone)]
pub struct TradePlan {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub leverage: u32,
    /// Last close at planning time
    pub price: f64,
    pub risk: RiskPlan,
    /// Previous completed candle, reused when re-planning at the fill price
    pub reference: Candle,
    pub volatility: Option<f64>,
}

impl fmt::Display for TradePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} {} at ~{}", self.side, self.quantity, self.symbol, self.price)?;
        writeln!(f, "  leverage:  {}x", self.leverage)?;
        writeln!(f, "  stop-loss: {}", self.risk.stop_loss)?;
        for (i, target) in self.risk.targets.iter().enumerate() {
            writeln!(f, "  target {}:  {}", i + 1, target)?;
        }
        write!(f, "  risk:      {} per unit", self.risk.risk_distance())
    }
}

pub struct TradeSupervisor {
    config: TradingConfig,
    gateway: Arc<dyn ExecutionGateway>,
    market_data: Arc<dyn MarketData>,
    store: Arc<dyn TradeStore>,
    sizer: PositionSizer,
    planner: RiskPlanner,
}

impl TradeSupervisor {
    pub fn new(
        config: TradingConfig,
        gateway: Arc<dyn ExecutionGateway>,
        market_data: Arc<dyn MarketData>,
        store: Arc<dyn TradeStore>,
    ) -> Self {
        let sizer = PositionSizer::new(config.lot_step);
        let planner = config.risk_planner();
        Self {
            config,
            gateway,
            market_data,
            store,
            sizer,
            planner,
        }
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    /// Plan a trade at the current price without sending anything.
    ///
    /// Leverage is set first; a failure there is logged and planning goes on
    /// with whatever leverage the exchange already has.
    pub async fn plan_trade(&self, side: Side) -> Result<TradePlan, TradeError> {
        let symbol = &self.config.symbol;

        if let Err(e) = self.gateway.set_leverage(symbol, self.config.leverage).await {
            warn!("Could not set leverage for {}: {}", symbol, e);
        }

        let candles = self
            .market_data
            .get_candles(symbol, &self.config.interval, self.planner.candles_needed())
            .await;
        if candles.len() < 2 {
            return Err(TradeError::DataUnavailable {
                symbol: symbol.clone(),
                reason: format!("need at least 2 candles, got {}", candles.len()),
            });
        }
        let price = candles[candles.len() - 1].close;
        let reference = candles[candles.len() - 2].clone();
        let volatility = self.planner.volatility(&candles);

        let policy = &self.config.position_size;
        let balance = if policy.needs_balance() {
            let balance = self.gateway.get_balance(&self.config.margin_asset).await;
            info!("{} balance: {}", self.config.margin_asset, balance);
            balance
        } else {
            0.0
        };
        let quantity = self
            .sizer
            .size(policy, balance, price, f64::from(self.config.leverage))?;

        let risk = self.planner.plan(price, side, &reference, volatility)?;
        self.check_trigger_leg(quantity, risk.targets.len())?;

        Ok(TradePlan {
            symbol: symbol.clone(),
            side,
            quantity,
            leverage: self.config.leverage,
            price,
            risk,
            reference,
            volatility,
        })
    }

    /// The take-profit that arms the breakeven move must get a non-zero leg,
    /// otherwise the recorded trade could never reach it.
    fn check_trigger_leg(&self, quantity: f64, legs: usize) -> Result<(), TradeError> {
        let level = self.config.risk.move_sl_to_entry_when_tp_hit;
        let Some(index) = (level as usize).checked_sub(1) else {
            return Ok(());
        };
        match self.sizer.split(quantity, legs).get(index) {
            Some(leg) if *leg > 0.0 => Ok(()),
            _ => Err(TradeError::TriggerLegEmpty {
                level,
                quantity,
                legs,
            }),
        }
    }

    /// Plan, confirm, then execute a trade
    pub async fn open_trade(
        &self,
        side: Side,
        gate: &dyn ConfirmationGate,
    ) -> Result<TradeRecord, TradeError> {
        let plan = self.plan_trade(side).await?;
        info!("Trade plan:\n{}", plan);

        if !gate.confirm(&plan).await {
            info!("Trade not confirmed, nothing sent");
            return Err(TradeError::NotConfirmed);
        }
        self.execute(&plan).await
    }

    /// Send the entry and protective orders for a confirmed plan and save the record.
    ///
    /// A failed entry aborts before any protective order. Protective legs
    /// that fail are left out of the record.
    pub async fn execute(&self, plan: &TradePlan) -> Result<TradeRecord, TradeError> {
        let entry_order = Order::market(&plan.symbol, plan.side.entry_order_side(), plan.quantity)?;
        let entry_ack = self
            .gateway
            .place_order(&entry_order)
            .await
            .map_err(|e| {
                error!("Entry order for {} rejected: {}", plan.symbol, e);
                TradeError::EntryRejected(e)
            })?;

        let entry_price = entry_ack.avg_price.unwrap_or(plan.price);
        info!(
            "Entered {} {} {} at {} on {} (order {})",
            plan.side,
            plan.quantity,
            plan.symbol,
            entry_price,
            self.gateway.name(),
            entry_ack.order_id
        );

        let risk = match self
            .planner
            .plan(entry_price, plan.side, &plan.reference, plan.volatility)
        {
            Ok(risk) => risk,
            Err(e) => {
                warn!("Re-planning at fill price failed ({}), keeping the pre-trade plan", e);
                plan.risk.clone()
            }
        };

        let exit_side = plan.side.exit_order_side();
        let sl_order_id = match Order::stop_market(&plan.symbol, exit_side, plan.quantity, risk.stop_loss) {
            Ok(order) => match self.gateway.place_order(&order).await {
                Ok(ack) => {
                    info!("Stop-loss {} placed at {}", ack.order_id, risk.stop_loss);
                    Some(ack.order_id)
                }
                Err(e) => {
                    error!("Stop-loss order failed: {}. Position is UNPROTECTED", e);
                    None
                }
            },
            Err(e) => {
                error!("Invalid stop-loss {}: {}. Position is UNPROTECTED", risk.stop_loss, e);
                None
            }
        };

        let legs = self.sizer.split(plan.quantity, risk.targets.len());
        let mut tp_order_ids = Vec::new();
        let mut targets = Vec::new();
        for (i, (target, leg_qty)) in risk.targets.iter().zip(legs).enumerate() {
            if leg_qty <= 0.0 {
                warn!("Target {} at {} skipped: quantity too small to split", i + 1, target);
                continue;
            }
            let placed = match Order::limit(&plan.symbol, exit_side, leg_qty, *target) {
                Ok(order) => self.gateway.place_order(&order).await,
                Err(e) => {
                    warn!("Invalid take-profit {} at {}: {}", i + 1, target, e);
                    continue;
                }
            };
            match placed {
                Ok(ack) => {
                    info!("Take-profit {} placed: {} at {} ({})", i + 1, leg_qty, target, ack.order_id);
                    tp_order_ids.push(ack.order_id);
                    targets.push(*target);
                }
                Err(e) => warn!("Take-profit {} at {} failed: {}", i + 1, target, e),
            }
        }

        let configured_level = self.config.risk.move_sl_to_entry_when_tp_hit;
        let monitor_trigger_level =
            recorded_trigger_level(configured_level, &risk.targets, &targets);
        if configured_level > 0 && monitor_trigger_level == 0 {
            error!(
                "Take-profit {} at {:?} was not placed; breakeven move is DISABLED for this trade",
                configured_level,
                risk.targets.get(configured_level as usize - 1)
            );
        } else if monitor_trigger_level != configured_level {
            info!(
                "Breakeven trigger is placed take-profit {} (configured target {})",
                monitor_trigger_level, configured_level
            );
        }

        let existing = self.store.list().await;
        let record = TradeRecord {
            id: next_trade_id(&existing, chrono::Utc::now().timestamp()),
            symbol: plan.symbol.clone(),
            side: plan.side,
            qty: plan.quantity,
            entry_price,
            sl_order_id,
            tp_order_ids,
            targets,
            monitor_trigger_level,
            sl_moved: false,
        };

        let task_name = format!("save trade {}", record.id);
        retry_with_backoff(&task_name, &self.config.monitor_settings().persist_retry, || {
            self.store.add(&record)
        })
        .await
        .map_err(|source| {
            error!("Trade {} is live but could not be saved: {}", record.id, source);
            TradeError::PersistenceFailed {
                trade_id: record.id.clone(),
                source,
            }
        })?;

        info!(
            "Trade {} recorded with {} take-profit legs",
            record.id,
            record.tp_order_ids.len()
        );
        Ok(record)
    }

    /// Most recently added trade, if any
    pub async fn latest_trade(&self) -> Option<TradeRecord> {
        self.store.list().await.pop()
    }

    pub async fn all_trades(&self) -> Vec<TradeRecord> {
        self.store.list().await
    }

    /// Monitor for one stored trade
    pub fn monitor(&self, record: TradeRecord) -> TradeMonitor {
        TradeMonitor::new(
            record,
            self.gateway.clone(),
            self.market_data.clone(),
            self.store.clone(),
            self.config.monitor_settings(),
        )
    }
}

/// Level of the configured trigger target among the placed take-profits.
///
/// `planned` holds every target of the plan, `placed` only the legs the
/// exchange accepted. Returns 0 when the move is disabled or the trigger
/// leg itself was not placed.
pub fn recorded_trigger_level(configured: u32, planned: &[f64], placed: &[f64]) -> u32 {
    let Some(price) = (configured as usize)
        .checked_sub(1)
        .and_then(|index| planned.get(index))
    else {
        return 0;
    };
    placed
        .iter()
        .position(|target| target == price)
        .map_or(0, |index| index as u32 + 1)
}

/// Trade id from the creation time in seconds, bumped past any id in use
pub fn next_trade_id(existing: &[TradeRecord], now_secs: i64) -> String {
    let mut candidate = now_secs;
    while existing.iter().any(|r| r.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}
