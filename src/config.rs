use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::monitor::MonitorSettings;
use crate::domain::services::risk_planner::{
    RiskPlanner, StopStrategy, TargetStrategy, RISK_MULTIPLES,
};
use crate::domain::value_objects::sizing_policy::SizingPolicy;
use crate::rate_limit::RateLimiterConfig;
use crate::task_runner::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Trading configuration, immutable once the supervisor is built
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbol: String,
    /// Candle interval used for planning, e.g. "15m"
    pub interval: String,
    pub leverage: u32,
    /// Wallet currency whose balance feeds percentage sizing
    pub margin_asset: String,
    pub lot_step: f64,
    pub position_size: SizingPolicy,
    pub risk: RiskConfig,
    pub monitor: MonitorConfig,
    /// `trades.json` style path or a `sqlite://` URL
    pub store_url: String,
    pub exchange: ExchangeConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Candle,
    Atr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    FixedPoints,
    RiskMultiple,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stop_strategy: StopKind,
    pub sl_candle_multiplier: f64,
    pub sl_atr_multiplier: f64,
    pub atr_period: usize,
    pub target_strategy: TargetKind,
    pub tp_fixed_points: Vec<f64>,
    /// 1-based target that moves the stop to entry; 0 disables the move
    pub move_sl_to_entry_when_tp_hit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    /// Ceiling for the wait after consecutive data failures
    pub max_backoff_secs: u64,
    /// Candle interval polled for the latest price
    pub price_interval: String,
    /// Pause between cancelling and replacing a stop-loss
    pub replace_pause_ms: u64,
    pub max_migration_attempts: u32,
    pub persist_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub api_base: String,
    pub public_base: String,
    pub request_timeout_ms: u64,
    pub requests_per_minute: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbol: "B-BTC_USDT".to_string(),
            interval: "15m".to_string(),
            leverage: 10,
            margin_asset: "USDT".to_string(),
            lot_step: 0.001,
            position_size: SizingPolicy::default(),
            risk: RiskConfig::default(),
            monitor: MonitorConfig::default(),
            store_url: "trades.json".to_string(),
            exchange: ExchangeConfig::default(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            stop_strategy: StopKind::Candle,
            sl_candle_multiplier: 2.0,
            sl_atr_multiplier: 2.0,
            atr_period: 14,
            target_strategy: TargetKind::FixedPoints,
            tp_fixed_points: vec![300.0, 500.0, 800.0, 1000.0],
            move_sl_to_entry_when_tp_hit: 0,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            poll_interval_secs: 15,
            max_backoff_secs: 120,
            price_interval: "1m".to_string(),
            replace_pause_ms: 1000,
            max_migration_attempts: 3,
            persist_max_attempts: 5,
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            api_base: "https://api.coindcx.com".to_string(),
            public_base: "https://public.coindcx.com".to_string(),
            request_timeout_ms: 10_000,
            requests_per_minute: 60,
        }
    }
}

impl TradingConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<TradingConfig, ConfigError> {
        let shown = path.display().to_string();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", shown);
                return Ok(TradingConfig::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: shown,
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: shown,
            source,
        })
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides through `lookup`. Unparseable values are logged and ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(symbol) = lookup("BREAKEVEN_SYMBOL").filter(|s| !s.trim().is_empty()) {
            self.symbol = symbol.trim().to_string();
        }
        if let Some(url) = lookup("TRADE_STORE_URL").filter(|s| !s.trim().is_empty()) {
            self.store_url = url.trim().to_string();
        }
        if let Some(leverage) = parse_override::<u32, _>(&lookup, "BREAKEVEN_LEVERAGE") {
            self.leverage = leverage;
        }
        if let Some(level) = parse_override::<u32, _>(&lookup, "BREAKEVEN_TRIGGER_LEVEL") {
            self.risk.move_sl_to_entry_when_tp_hit = level;
        }
        if let Some(secs) = parse_override::<u64, _>(&lookup, "BREAKEVEN_POLL_SECONDS") {
            self.monitor.poll_interval_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("symbol must not be empty".to_string()));
        }
        if self.leverage == 0 {
            return Err(ConfigError::Invalid("leverage must be at least 1".to_string()));
        }
        if !self.lot_step.is_finite() || self.lot_step <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "lot_step must be positive, got {}",
                self.lot_step
            )));
        }
        self.position_size.validate().map_err(ConfigError::Invalid)?;

        let risk = &self.risk;
        let multiplier = match risk.stop_strategy {
            StopKind::Candle => risk.sl_candle_multiplier,
            StopKind::Atr => risk.sl_atr_multiplier,
        };
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "stop-loss multiplier must be positive, got {}",
                multiplier
            )));
        }
        if risk.stop_strategy == StopKind::Atr && risk.atr_period == 0 {
            return Err(ConfigError::Invalid("atr_period must be at least 1".to_string()));
        }
        if risk.target_strategy == TargetKind::FixedPoints {
            if risk.tp_fixed_points.is_empty() {
                return Err(ConfigError::Invalid(
                    "tp_fixed_points must not be empty".to_string(),
                ));
            }
            if let Some(p) = risk
                .tp_fixed_points
                .iter()
                .find(|p| !p.is_finite() || **p <= 0.0)
            {
                return Err(ConfigError::Invalid(format!(
                    "tp_fixed_points must be positive, got {}",
                    p
                )));
            }
        }
        let trigger = risk.move_sl_to_entry_when_tp_hit as usize;
        if trigger > self.target_count() {
            return Err(ConfigError::Invalid(format!(
                "move_sl_to_entry_when_tp_hit {} exceeds the {} configured targets",
                trigger,
                self.target_count()
            )));
        }

        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.monitor.max_migration_attempts == 0 || self.monitor.persist_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry attempt limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with the sizing policy replaced by a fixed quantity
    pub fn with_size_override(&self, quantity: f64) -> TradingConfig {
        TradingConfig {
            position_size: SizingPolicy::FixedQuantity(quantity),
            ..self.clone()
        }
    }

    pub fn target_count(&self) -> usize {
        match self.risk.target_strategy {
            TargetKind::FixedPoints => self.risk.tp_fixed_points.len(),
            TargetKind::RiskMultiple => RISK_MULTIPLES.len(),
        }
    }

    pub fn risk_planner(&self) -> RiskPlanner {
        let stop = match self.risk.stop_strategy {
            StopKind::Candle => StopStrategy::CandleRange {
                multiplier: self.risk.sl_candle_multiplier,
            },
            StopKind::Atr => StopStrategy::Volatility {
                multiplier: self.risk.sl_atr_multiplier,
                atr_period: self.risk.atr_period,
            },
        };
        let targets = match self.risk.target_strategy {
            TargetKind::FixedPoints => TargetStrategy::FixedPoints(self.risk.tp_fixed_points.clone()),
            TargetKind::RiskMultiple => TargetStrategy::RiskMultiple,
        };
        RiskPlanner::new(stop, targets)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        let m = &self.monitor;
        MonitorSettings {
            poll_interval: Duration::from_secs(m.poll_interval_secs),
            max_backoff: Duration::from_secs(m.max_backoff_secs),
            price_interval: m.price_interval.clone(),
            replace_pause: Duration::from_millis(m.replace_pause_ms),
            max_migration_attempts: m.max_migration_attempts,
            persist_retry: RetryPolicy {
                max_attempts: m.persist_max_attempts,
                ..RetryPolicy::default()
            },
        }
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            requests_per_minute: self.exchange.requests_per_minute,
        }
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TradingConfig::default();
        assert_eq!(config.symbol, "B-BTC_USDT");
        assert_eq!(config.interval, "15m");
        assert_eq!(config.leverage, 10);
        assert_eq!(config.risk.tp_fixed_points, vec![300.0, 500.0, 800.0, 1000.0]);
        assert_eq!(config.risk.move_sl_to_entry_when_tp_hit, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parses_trading_config_file_shape() {
        let json = r#"{
            "symbol": "B-ETH_USDT",
            "leverage": 5,
            "position_size": {"type": "MARGIN", "value": 50},
            "risk": {
                "sl_candle_multiplier": 1.5,
                "tp_fixed_points": [20, 40],
                "move_sl_to_entry_when_tp_hit": 1
            }
        }"#;
        let config: TradingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.symbol, "B-ETH_USDT");
        assert_eq!(config.leverage, 5);
        assert_eq!(config.position_size, SizingPolicy::FixedMargin(50.0));
        assert_eq!(config.risk.sl_candle_multiplier, 1.5);
        assert_eq!(config.risk.move_sl_to_entry_when_tp_hit, 1);
        // Unspecified keys keep their defaults
        assert_eq!(config.interval, "15m");
        assert_eq!(config.risk.stop_strategy, StopKind::Candle);
        assert_eq!(config.monitor.poll_interval_secs, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TradingConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.symbol, "B-BTC_USDT");
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            TradingConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"leverage": "ten"}"#).unwrap();
        let error = TradingConfig::load(file.path()).unwrap_err();
        assert!(error.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BREAKEVEN_SYMBOL", "B-SOL_USDT"),
            ("BREAKEVEN_LEVERAGE", "20"),
            ("BREAKEVEN_TRIGGER_LEVEL", "2"),
            ("BREAKEVEN_POLL_SECONDS", "not-a-number"),
            ("TRADE_STORE_URL", "sqlite://trades.db"),
        ]
        .into_iter()
        .collect();

        let mut config = TradingConfig::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.symbol, "B-SOL_USDT");
        assert_eq!(config.leverage, 20);
        assert_eq!(config.risk.move_sl_to_entry_when_tp_hit, 2);
        assert_eq!(config.store_url, "sqlite://trades.db");
        // Invalid value is ignored
        assert_eq!(config.monitor.poll_interval_secs, 15);
    }

    #[test]
    fn test_validate_rejects_bad_sizing() {
        let mut config = TradingConfig::default();
        config.position_size = SizingPolicy::PercentOfBalance(150.0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.position_size = SizingPolicy::FixedQuantity(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_trigger_beyond_targets() {
        let mut config = TradingConfig::default();
        config.risk.move_sl_to_entry_when_tp_hit = 5;
        assert!(config.validate().is_err());

        config.risk.target_strategy = TargetKind::RiskMultiple;
        config.risk.move_sl_to_entry_when_tp_hit = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_leverage() {
        let mut config = TradingConfig::default();
        config.leverage = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_size_override() {
        let config = TradingConfig::default().with_size_override(0.25);
        assert_eq!(config.position_size, SizingPolicy::FixedQuantity(0.25));
    }

    #[test]
    fn test_risk_planner_from_config() {
        let mut config = TradingConfig::default();
        config.risk.stop_strategy = StopKind::Atr;
        config.risk.target_strategy = TargetKind::RiskMultiple;
        let planner = config.risk_planner();
        assert_eq!(
            planner.stop,
            StopStrategy::Volatility {
                multiplier: 2.0,
                atr_period: 14
            }
        );
        assert_eq!(planner.targets, TargetStrategy::RiskMultiple);
    }

    #[test]
    fn test_monitor_settings_from_config() {
        let settings = TradingConfig::default().monitor_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(15));
        assert_eq!(settings.max_backoff, Duration::from_secs(120));
        assert_eq!(settings.replace_pause, Duration::from_secs(1));
        assert_eq!(settings.max_migration_attempts, 3);
        assert_eq!(settings.persist_retry.max_attempts, 5);
    }
}
