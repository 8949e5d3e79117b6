//! Execution Gateway Trait
//!
//! The order-execution surface the trade supervisor needs from an exchange:
//! leverage, balance, and placing, cancelling and editing orders. Request
//! signing and wire encoding belong to the implementation.

use crate::domain::entities::order::Order;
use async_trait::async_trait;

/// Common result type for exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Errors that can occur during exchange operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    #[error("Order placement failed: {0}")]
    OrderPlacementFailed(String),

    #[error("Order cancellation failed: {0}")]
    OrderCancellationFailed(String),

    #[error("Order edit failed: {0}")]
    OrderEditFailed(String),

    #[error("Leverage update failed: {0}")]
    LeverageUpdateFailed(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Exchange error: {0}")]
    ExchangeSpecific(String),
}

/// Acknowledgement of an accepted order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    /// Average fill price, when the exchange reports one
    pub avg_price: Option<f64>,
}

impl OrderAck {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            avg_price: None,
        }
    }
}

/// Amendments to a live order; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderEdit {
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub quantity: Option<f64>,
}

impl OrderEdit {
    pub fn stop_price(stop_price: f64) -> Self {
        Self {
            stop_price: Some(stop_price),
            ..Self::default()
        }
    }
}

/// Exchange reply to an edit request
#[derive(Debug, Clone, PartialEq)]
pub struct EditAck {
    pub code: u16,
    pub message: Option<String>,
}

impl EditAck {
    pub fn is_accepted(&self) -> bool {
        self.code == 200
    }
}

/// Execution gateway providing the order surface of one exchange account
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Get the name of this exchange
    fn name(&self) -> &str;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()>;

    /// Wallet balance of `asset`. 0.0 when the asset is absent or the query fails.
    async fn get_balance(&self, asset: &str) -> f64;

    /// Place an order, returning the exchange-assigned id
    async fn place_order(&self, order: &Order) -> ExchangeResult<OrderAck>;

    async fn cancel_order(&self, order_id: &str) -> ExchangeResult<()>;

    async fn edit_order(&self, order_id: &str, edit: &OrderEdit) -> ExchangeResult<EditAck>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_error_display() {
        let error = ExchangeError::OrderPlacementFailed("Test error".to_string());
        assert_eq!(error.to_string(), "Order placement failed: Test error");
    }

    #[test]
    fn test_edit_ack_acceptance() {
        assert!(EditAck { code: 200, message: None }.is_accepted());
        assert!(!EditAck {
            code: 422,
            message: Some("invalid stop".to_string())
        }
        .is_accepted());
    }

    #[test]
    fn test_order_edit_stop_price_only() {
        let edit = OrderEdit::stop_price(50000.0);
        assert_eq!(edit.stop_price, Some(50000.0));
        assert!(edit.price.is_none());
        assert!(edit.quantity.is_none());
    }
}
