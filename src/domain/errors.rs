use std::fmt;
use thiserror::Error;

use crate::domain::repositories::exchange_client::ExchangeError;
use crate::domain::repositories::trade_store::StoreError;

/// Errors raised while opening or supervising a trade
#[derive(Debug, Error)]
pub enum TradeError {
    /// No usable market data; opening is blocked until a price is known
    #[error("Market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Sized quantity rounded to zero (or was not a number)
    #[error("Invalid quantity {quantity} for lot step {step}")]
    InvalidQuantity { quantity: f64, step: f64 },

    /// Stop or a target coincides with the entry price
    #[error("Degenerate risk plan: {reason}")]
    DegenerateRiskPlan { reason: String },

    /// The take-profit leg that arms the breakeven move would get no quantity
    #[error("Breakeven trigger target {level} gets no quantity when {quantity} is split across {legs} targets")]
    TriggerLegEmpty { level: u32, quantity: f64, legs: usize },

    /// Operator declined the confirmation gate
    #[error("Trade not confirmed by operator")]
    NotConfirmed,

    /// Entry order was not acknowledged with an order id
    #[error("Entry order rejected: {0}")]
    EntryRejected(#[source] ExchangeError),

    /// Record carries no stop-loss order, nothing to migrate
    #[error("Trade {trade_id} has no stop-loss order id")]
    NoStopLoss { trade_id: String },

    /// Trade store write failed after exhausting retries
    #[error("Failed to persist trade {trade_id}: {source}")]
    PersistenceFailed {
        trade_id: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl TradeError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TradeError::NotConfirmed => ErrorSeverity::Minor,
            TradeError::DataUnavailable { .. } => ErrorSeverity::Moderate,
            TradeError::InvalidQuantity { .. } => ErrorSeverity::Moderate,
            TradeError::DegenerateRiskPlan { .. } => ErrorSeverity::Moderate,
            TradeError::TriggerLegEmpty { .. } => ErrorSeverity::Moderate,
            TradeError::Validation(_) => ErrorSeverity::Moderate,
            TradeError::EntryRejected(_) => ErrorSeverity::Critical,
            TradeError::NoStopLoss { .. } => ErrorSeverity::Critical,
            TradeError::PersistenceFailed { .. } => ErrorSeverity::Critical,
        }
    }

    /// Short error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            TradeError::DataUnavailable { .. } => "ERR_DATA_UNAVAILABLE",
            TradeError::InvalidQuantity { .. } => "ERR_INVALID_QUANTITY",
            TradeError::DegenerateRiskPlan { .. } => "ERR_DEGENERATE_PLAN",
            TradeError::TriggerLegEmpty { .. } => "ERR_TRIGGER_LEG_EMPTY",
            TradeError::NotConfirmed => "ERR_NOT_CONFIRMED",
            TradeError::EntryRejected(_) => "ERR_ENTRY_REJECTED",
            TradeError::NoStopLoss { .. } => "ERR_NO_STOP_LOSS",
            TradeError::PersistenceFailed { .. } => "ERR_PERSISTENCE",
            TradeError::Validation(_) => "ERR_VALIDATION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected, operator-driven
    Minor,
    /// Trade attempt aborted, nothing placed or nothing at risk
    Moderate,
    /// Exposure exists and needs operator attention
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Minor => write!(f, "Minor"),
            ErrorSeverity::Moderate => write!(f, "Moderate"),
            ErrorSeverity::Critical => write!(f, "Critical"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid side: {0} (expected LONG or SHORT)")]
    InvalidSide(String),

    #[error("Value must be finite")]
    MustBeFinite,
}
