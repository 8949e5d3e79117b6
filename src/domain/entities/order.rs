use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{price::Price, quantity::Quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderType {
    Market,
    Limit { price: Price },
    /// Market order armed when the mark crosses `stop_price`
    StopMarket { stop_price: Price },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
}

impl Order {
    pub fn market(symbol: &str, side: OrderSide, quantity: f64) -> Result<Self, ValidationError> {
        Ok(Order {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity: Quantity::new(quantity)?,
        })
    }

    pub fn limit(
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<Self, ValidationError> {
        Ok(Order {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit {
                price: Price::new(price)?,
            },
            quantity: Quantity::new(quantity)?,
        })
    }

    pub fn stop_market(
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> Result<Self, ValidationError> {
        Ok(Order {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::StopMarket {
                stop_price: Price::new(stop_price)?,
            },
            quantity: Quantity::new(quantity)?,
        })
    }

    pub fn limit_price(&self) -> Option<f64> {
        match self.order_type {
            OrderType::Limit { price } => Some(price.value()),
            _ => None,
        }
    }

    pub fn stop_price(&self) -> Option<f64> {
        match self.order_type {
            OrderType::StopMarket { stop_price } => Some(stop_price.value()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_order() {
        let order = Order::market("B-BTC_USDT", OrderSide::Buy, 0.004).unwrap();
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.quantity.value(), 0.004);
        assert!(order.limit_price().is_none());
        assert!(order.stop_price().is_none());
    }

    #[test]
    fn test_limit_order_carries_price() {
        let order = Order::limit("B-BTC_USDT", OrderSide::Sell, 0.001, 50300.0).unwrap();
        assert_eq!(order.limit_price(), Some(50300.0));
    }

    #[test]
    fn test_stop_market_carries_trigger() {
        let order = Order::stop_market("B-BTC_USDT", OrderSide::Sell, 0.004, 49800.0).unwrap();
        assert_eq!(order.stop_price(), Some(49800.0));
        assert_eq!(order.side.as_str(), "sell");
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let order = Order::market("B-BTC_USDT", OrderSide::Buy, 0.0);
        assert!(matches!(order, Err(ValidationError::InvalidQuantity(_))));
    }

    #[test]
    fn test_negative_stop_rejected() {
        let order = Order::stop_market("B-BTC_USDT", OrderSide::Buy, 1.0, -5.0);
        assert!(matches!(order, Err(ValidationError::InvalidPrice(_))));
    }
}
