//! Breakeven monitor
//!
//! Polls the latest price for one trade and, once the configured target is
//! reached, moves its stop-loss to the entry price exactly once. Editing the
//! live stop order is tried first; when the exchange refuses the edit the
//! order is cancelled and replaced.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::domain::entities::order::Order;
use crate::domain::entities::trade::{TradeField, TradeRecord};
use crate::domain::errors::TradeError;
use crate::domain::repositories::exchange_client::{ExecutionGateway, OrderEdit};
use crate::domain::repositories::market_data::MarketData;
use crate::domain::repositories::trade_store::TradeStore;
use crate::task_runner::{retry_with_backoff, Backoff, RetryPolicy};

/// Candles requested per poll; only the last close is used
const PRICE_CANDLES: usize = 2;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    /// Ceiling for the wait after consecutive data failures
    pub max_backoff: Duration,
    /// Candle interval polled for the latest price
    pub price_interval: String,
    /// Pause between cancelling a stop-loss and placing its replacement
    pub replace_pause: Duration,
    /// Migration attempts before the monitor stops touching orders
    pub max_migration_attempts: u32,
    pub persist_retry: RetryPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            max_backoff: Duration::from_secs(120),
            price_interval: "1m".to_string(),
            replace_pause: Duration::from_secs(1),
            max_migration_attempts: 3,
            persist_retry: RetryPolicy::default(),
        }
    }
}

/// Result of one monitoring iteration
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No price this cycle
    NoData,
    /// Price observed, nothing to do
    Watching(f64),
    /// Stop-loss now sits at the entry price and the record says so
    StopMoved,
    /// Migration attempted and failed; the stop is still at its old level
    MigrationFailed,
    /// Target reached but the migration attempt budget is spent
    Exhausted,
}

pub struct TradeMonitor {
    record: TradeRecord,
    gateway: Arc<dyn ExecutionGateway>,
    market_data: Arc<dyn MarketData>,
    store: Arc<dyn TradeStore>,
    settings: MonitorSettings,
    migration_attempts: u32,
}

impl TradeMonitor {
    pub fn new(
        record: TradeRecord,
        gateway: Arc<dyn ExecutionGateway>,
        market_data: Arc<dyn MarketData>,
        store: Arc<dyn TradeStore>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            record,
            gateway,
            market_data,
            store,
            settings,
            migration_attempts: 0,
        }
    }

    pub fn record(&self) -> &TradeRecord {
        &self.record
    }

    pub fn migration_attempts(&self) -> u32 {
        self.migration_attempts
    }

    /// Monitor until `shutdown` resolves.
    ///
    /// Shutdown is observed while waiting between iterations. An iteration
    /// already under way finishes first, including a stop-loss migration with
    /// its replace pause and persistence retries: stopping between the cancel
    /// and the replacement would leave the position without a stop, and
    /// stopping before persistence would migrate the same trade again on
    /// resume. Returns the in-memory record on a clean stop.
    ///
    /// # Errors
    /// `NoStopLoss` immediately when the record has no stop-loss order, and
    /// `PersistenceFailed` when a state change could not be saved.
    pub async fn run<S>(mut self, shutdown: S) -> Result<TradeRecord, TradeError>
    where
        S: Future<Output = ()>,
    {
        if self.record.sl_order_id.is_none() {
            error!(
                "Trade {} has no stop-loss order; it cannot be managed",
                self.record.id
            );
            return Err(TradeError::NoStopLoss {
                trade_id: self.record.id.clone(),
            });
        }

        info!(
            "Monitoring trade {} ({} {} {} @ {}), trigger level {}, sl_moved {}",
            self.record.id,
            self.record.side,
            self.record.qty,
            self.record.symbol,
            self.record.entry_price,
            self.record.monitor_trigger_level,
            self.record.sl_moved
        );

        if self.record.monitor_trigger_level > 0
            && !self.record.sl_moved
            && self.record.trigger_target().is_none()
        {
            warn!(
                "Trade {}: trigger level {} is beyond its {} recorded targets; the stop-loss will not be moved",
                self.record.id,
                self.record.monitor_trigger_level,
                self.record.targets.len()
            );
        }

        let mut backoff = Backoff::new(self.settings.poll_interval, self.settings.max_backoff);
        tokio::pin!(shutdown);

        loop {
            let wait = if backoff.consecutive_failures() > 0 {
                backoff.delay()
            } else {
                self.settings.poll_interval
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Stopping monitor for trade {}", self.record.id);
                    return Ok(self.record);
                }
                _ = sleep(wait) => {}
            }

            match self.tick().await? {
                TickOutcome::NoData => {
                    backoff.record_failure();
                    warn!(
                        "No price for {} ({} consecutive), next check in {:?}",
                        self.record.symbol,
                        backoff.consecutive_failures(),
                        backoff.delay()
                    );
                }
                _ => backoff.reset(),
            }
        }
    }

    /// One monitoring iteration: fetch the price, migrate the stop if due
    pub async fn tick(&mut self) -> Result<TickOutcome, TradeError> {
        let candles = self
            .market_data
            .get_candles(&self.record.symbol, &self.settings.price_interval, PRICE_CANDLES)
            .await;
        let Some(price) = candles.last().map(|c| c.close) else {
            return Ok(TickOutcome::NoData);
        };
        debug!("{} price {}", self.record.symbol, price);

        if self.record.sl_moved {
            return Ok(TickOutcome::Watching(price));
        }
        let Some(target) = self.record.trigger_target() else {
            return Ok(TickOutcome::Watching(price));
        };
        if !self.record.side.has_reached(price, target) {
            return Ok(TickOutcome::Watching(price));
        }

        if self.migration_attempts >= self.settings.max_migration_attempts {
            error!(
                "Trade {}: target {} reached but stop-loss is still not at entry after {} attempts; manual action required",
                self.record.id, target, self.migration_attempts
            );
            return Ok(TickOutcome::Exhausted);
        }

        info!(
            "Trade {}: target {} reached at {}, moving stop-loss to entry {}",
            self.record.id, target, price, self.record.entry_price
        );
        self.migrate_stop().await
    }

    async fn migrate_stop(&mut self) -> Result<TickOutcome, TradeError> {
        self.migration_attempts += 1;
        let Some(sl_order_id) = self.record.sl_order_id.clone() else {
            error!("Trade {} lost its stop-loss order id", self.record.id);
            return Ok(TickOutcome::MigrationFailed);
        };
        let entry = self.record.entry_price;

        match self
            .gateway
            .edit_order(&sl_order_id, &OrderEdit::stop_price(entry))
            .await
        {
            Ok(ack) if ack.is_accepted() => {
                info!("Stop-loss {} moved to breakeven at {}", sl_order_id, entry);
                self.record.sl_moved = true;
                self.persist(TradeField::StopMoved(true)).await?;
                return Ok(TickOutcome::StopMoved);
            }
            Ok(ack) => warn!(
                "Edit of stop-loss {} refused (code {}, {}); replacing it",
                sl_order_id,
                ack.code,
                ack.message.as_deref().unwrap_or("no message")
            ),
            Err(e) => warn!(
                "Edit of stop-loss {} failed: {}; replacing it",
                sl_order_id, e
            ),
        }

        // A second full-size stop next to a live one could flip the position
        if let Err(e) = self.gateway.cancel_order(&sl_order_id).await {
            error!(
                "Trade {}: cancel of stop-loss {} failed: {}. Not placing a replacement (attempt {}/{})",
                self.record.id,
                sl_order_id,
                e,
                self.migration_attempts,
                self.settings.max_migration_attempts
            );
            return Ok(TickOutcome::MigrationFailed);
        }
        sleep(self.settings.replace_pause).await;

        let replacement = match Order::stop_market(
            &self.record.symbol,
            self.record.side.exit_order_side(),
            self.record.qty,
            entry,
        ) {
            Ok(order) => order,
            Err(e) => {
                error!("Trade {}: invalid replacement stop-loss: {}", self.record.id, e);
                return Ok(TickOutcome::MigrationFailed);
            }
        };

        match self.gateway.place_order(&replacement).await {
            Ok(ack) => {
                info!(
                    "Replacement stop-loss {} placed at breakeven {}",
                    ack.order_id, entry
                );
                self.record.sl_order_id = Some(ack.order_id.clone());
                self.record.sl_moved = true;
                self.persist(TradeField::StopLossOrderId(Some(ack.order_id)))
                    .await?;
                self.persist(TradeField::StopMoved(true)).await?;
                Ok(TickOutcome::StopMoved)
            }
            Err(e) => {
                error!(
                    "Trade {}: replacement stop-loss failed: {}. Position may be UNPROTECTED (attempt {}/{})",
                    self.record.id, e, self.migration_attempts, self.settings.max_migration_attempts
                );
                Ok(TickOutcome::MigrationFailed)
            }
        }
    }

    async fn persist(&self, field: TradeField) -> Result<(), TradeError> {
        let id = self.record.id.as_str();
        let task_name = format!("persist {} of trade {}", field.key(), id);
        retry_with_backoff(&task_name, &self.settings.persist_retry, || {
            self.store.update_field(id, field.clone())
        })
        .await
        .map_err(|source| {
            error!("Trade {}: state change could not be saved: {}", id, source);
            TradeError::PersistenceFailed {
                trade_id: id.to_string(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::trade::Side;
    use crate::domain::repositories::exchange_client::{
        EditAck, ExchangeError, ExchangeResult, OrderAck,
    };
    use crate::domain::repositories::trade_store::StoreError;
    use crate::domain::services::indicators::Candle;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedGateway {
        edit_code: u16,
        place_fails: bool,
        cancel_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExecutionGateway for ScriptedGateway {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> ExchangeResult<()> {
            Ok(())
        }

        async fn get_balance(&self, _asset: &str) -> f64 {
            0.0
        }

        async fn place_order(&self, order: &Order) -> ExchangeResult<OrderAck> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("place {:?}", order.stop_price()));
            if self.place_fails {
                Err(ExchangeError::OrderPlacementFailed("rejected".to_string()))
            } else {
                Ok(OrderAck::new("sl-new"))
            }
        }

        async fn cancel_order(&self, order_id: &str) -> ExchangeResult<()> {
            self.calls.lock().unwrap().push(format!("cancel {}", order_id));
            if self.cancel_fails {
                return Err(ExchangeError::OrderCancellationFailed("unknown order".to_string()));
            }
            Ok(())
        }

        async fn edit_order(&self, order_id: &str, edit: &OrderEdit) -> ExchangeResult<EditAck> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("edit {} {:?}", order_id, edit.stop_price));
            Ok(EditAck {
                code: self.edit_code,
                message: None,
            })
        }
    }

    struct PriceFeed {
        prices: Mutex<VecDeque<Option<f64>>>,
    }

    impl PriceFeed {
        fn new(prices: &[Option<f64>]) -> Self {
            Self {
                prices: Mutex::new(prices.iter().copied().collect()),
            }
        }
    }

    #[async_trait]
    impl MarketData for PriceFeed {
        async fn get_candles(&self, _symbol: &str, _interval: &str, _limit: usize) -> Vec<Candle> {
            match self.prices.lock().unwrap().pop_front().flatten() {
                Some(p) => vec![Candle::new(p, p, p, p, 1.0)],
                None => Vec::new(),
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        updates: Mutex<Vec<TradeField>>,
    }

    #[async_trait]
    impl TradeStore for MemoryStore {
        async fn list(&self) -> Vec<TradeRecord> {
            Vec::new()
        }

        async fn add(&self, _record: &TradeRecord) -> Result<(), StoreError> {
            Ok(())
        }

        async fn update_field(&self, _id: &str, field: TradeField) -> Result<(), StoreError> {
            self.updates.lock().unwrap().push(field);
            Ok(())
        }

        async fn remove(&self, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn record(side: Side) -> TradeRecord {
        let (entry, targets) = match side {
            Side::Long => (50000.0, vec![50300.0, 50500.0]),
            Side::Short => (50000.0, vec![49700.0, 49500.0]),
        };
        TradeRecord {
            id: "1".to_string(),
            symbol: "B-BTC_USDT".to_string(),
            side,
            qty: 0.004,
            entry_price: entry,
            sl_order_id: Some("sl-1".to_string()),
            tp_order_ids: vec!["tp-1".to_string(), "tp-2".to_string()],
            targets,
            monitor_trigger_level: 1,
            sl_moved: false,
        }
    }

    fn settings() -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            replace_pause: Duration::from_millis(1),
            persist_retry: RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
            ..MonitorSettings::default()
        }
    }

    fn monitor(
        record: TradeRecord,
        gateway: Arc<ScriptedGateway>,
        prices: &[Option<f64>],
        store: Arc<MemoryStore>,
    ) -> TradeMonitor {
        TradeMonitor::new(record, gateway, Arc::new(PriceFeed::new(prices)), store, settings())
    }

    #[tokio::test]
    async fn test_edit_success_moves_stop_once() {
        let gateway = Arc::new(ScriptedGateway {
            edit_code: 200,
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let mut monitor = monitor(
            record(Side::Long),
            gateway.clone(),
            &[Some(50100.0), Some(50300.0), Some(50600.0)],
            store.clone(),
        );

        assert_eq!(monitor.tick().await.unwrap(), TickOutcome::Watching(50100.0));
        assert_eq!(monitor.tick().await.unwrap(), TickOutcome::StopMoved);
        assert_eq!(monitor.tick().await.unwrap(), TickOutcome::Watching(50600.0));

        assert_eq!(
            *gateway.calls.lock().unwrap(),
            vec!["edit sl-1 Some(50000.0)".to_string()]
        );
        assert_eq!(
            *store.updates.lock().unwrap(),
            vec![TradeField::StopMoved(true)]
        );
        assert!(monitor.record().sl_moved);
    }

    #[tokio::test]
    async fn test_short_trigger_uses_price_at_or_below_target() {
        let gateway = Arc::new(ScriptedGateway {
            edit_code: 200,
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let mut monitor = monitor(
            record(Side::Short),
            gateway,
            &[Some(49800.0), Some(49700.0)],
            store,
        );
        assert_eq!(monitor.tick().await.unwrap(), TickOutcome::Watching(49800.0));
        assert_eq!(monitor.tick().await.unwrap(), TickOutcome::StopMoved);
    }

    #[tokio::test]
    async fn test_refused_edit_falls_back_to_cancel_and_replace() {
        let gateway = Arc::new(ScriptedGateway {
            edit_code: 400,
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let mut monitor = monitor(record(Side::Long), gateway.clone(), &[Some(50300.0)], store.clone());

        assert_eq!(monitor.tick().await.unwrap(), TickOutcome::StopMoved);
        assert_eq!(
            *gateway.calls.lock().unwrap(),
            vec![
                "edit sl-1 Some(50000.0)".to_string(),
                "cancel sl-1".to_string(),
                "place Some(50000.0)".to_string(),
            ]
        );
        assert_eq!(
            *store.updates.lock().unwrap(),
            vec![
                TradeField::StopLossOrderId(Some("sl-new".to_string())),
                TradeField::StopMoved(true),
            ]
        );
        assert_eq!(monitor.record().sl_order_id.as_deref(), Some("sl-new"));
    }

    #[tokio::test]
    async fn test_failed_replacement_keeps_flag_and_caps_attempts() {
        let gateway = Arc::new(ScriptedGateway {
            edit_code: 400,
            place_fails: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let prices = [Some(50300.0); 5];
        let mut monitor = monitor(record(Side::Long), gateway, &prices, store.clone());

        for _ in 0..3 {
            assert_eq!(monitor.tick().await.unwrap(), TickOutcome::MigrationFailed);
        }
        assert_eq!(monitor.tick().await.unwrap(), TickOutcome::Exhausted);
        assert_eq!(monitor.migration_attempts(), 3);
        assert!(!monitor.record().sl_moved);
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_cancel_skips_replacement() {
        let gateway = Arc::new(ScriptedGateway {
            edit_code: 400,
            cancel_fails: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let mut monitor = monitor(record(Side::Long), gateway.clone(), &[Some(50300.0)], store.clone());

        assert_eq!(monitor.tick().await.unwrap(), TickOutcome::MigrationFailed);
        assert_eq!(
            *gateway.calls.lock().unwrap(),
            vec!["edit sl-1 Some(50000.0)".to_string(), "cancel sl-1".to_string()]
        );
        assert_eq!(monitor.record().sl_order_id.as_deref(), Some("sl-1"));
        assert!(!monitor.record().sl_moved);
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_during_migration_lets_it_finish() {
        let gateway = Arc::new(ScriptedGateway {
            edit_code: 400,
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let slow_replace = MonitorSettings {
            replace_pause: Duration::from_millis(50),
            ..settings()
        };
        let m = TradeMonitor::new(
            record(Side::Long),
            gateway.clone(),
            Arc::new(PriceFeed::new(&[Some(50300.0)])),
            store.clone(),
            slow_replace,
        );

        let record = m
            .run(tokio::time::sleep(Duration::from_millis(10)))
            .await
            .unwrap();

        assert!(record.sl_moved);
        assert_eq!(record.sl_order_id.as_deref(), Some("sl-new"));
        assert_eq!(gateway.calls.lock().unwrap().len(), 3);
        assert_eq!(
            store.updates.lock().unwrap().last(),
            Some(&TradeField::StopMoved(true))
        );
    }

    #[tokio::test]
    async fn test_trigger_disabled_or_out_of_range() {
        let gateway = Arc::new(ScriptedGateway::default());
        let store = Arc::new(MemoryStore::default());

        let mut disabled = record(Side::Long);
        disabled.monitor_trigger_level = 0;
        let mut m = monitor(disabled, gateway.clone(), &[Some(60000.0)], store.clone());
        assert_eq!(m.tick().await.unwrap(), TickOutcome::Watching(60000.0));

        let mut out_of_range = record(Side::Long);
        out_of_range.monitor_trigger_level = 5;
        let mut m = monitor(out_of_range, gateway.clone(), &[Some(60000.0)], store);
        assert_eq!(m.tick().await.unwrap(), TickOutcome::Watching(60000.0));

        assert!(gateway.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_price_is_no_data() {
        let gateway = Arc::new(ScriptedGateway::default());
        let store = Arc::new(MemoryStore::default());
        let mut m = monitor(record(Side::Long), gateway, &[None], store);
        assert_eq!(m.tick().await.unwrap(), TickOutcome::NoData);
    }

    #[tokio::test]
    async fn test_run_without_stop_loss_returns_immediately() {
        let gateway = Arc::new(ScriptedGateway::default());
        let store = Arc::new(MemoryStore::default());
        let mut unprotected = record(Side::Long);
        unprotected.sl_order_id = None;
        let m = monitor(unprotected, gateway, &[], store);
        let result = m.run(std::future::pending()).await;
        assert!(matches!(result, Err(TradeError::NoStopLoss { .. })));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let gateway = Arc::new(ScriptedGateway::default());
        let store = Arc::new(MemoryStore::default());
        let m = monitor(record(Side::Long), gateway, &[], store);
        let record = m.run(async {}).await.unwrap();
        assert!(!record.sl_moved);
    }
}
