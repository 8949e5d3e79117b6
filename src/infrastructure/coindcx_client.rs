use crate::domain::entities::order::{Order, OrderType};
use crate::domain::repositories::exchange_client::{
    EditAck, ExchangeError, ExchangeResult, ExecutionGateway, OrderAck, OrderEdit,
};
use crate::rate_limit::ApiRateLimiter;
use crate::secrets::ApiCredentials;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

const CREATE_ORDER_PATH: &str = "/exchange/v1/derivatives/futures/orders/create";
const CANCEL_ORDER_PATH: &str = "/exchange/v1/derivatives/futures/orders/cancel";
const EDIT_ORDER_PATH: &str = "/exchange/v1/derivatives/futures/orders/edit";
const UPDATE_LEVERAGE_PATH: &str = "/exchange/v1/derivatives/futures/positions/update_leverage";
const WALLETS_PATH: &str = "/exchange/v1/derivatives/futures/wallets";

#[derive(Debug, Clone)]
pub struct CoinDcxConfig {
    pub api_base: String,
    pub credentials: ApiCredentials,
    pub request_timeout: Duration,
}

/// Signed client for the CoinDCX futures API
pub struct CoinDcxClient {
    client: Client,
    config: CoinDcxConfig,
    limiter: ApiRateLimiter,
}

impl CoinDcxClient {
    pub fn new(config: CoinDcxConfig, limiter: ApiRateLimiter) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("breakeven/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExchangeError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    /// Send a signed request and return the raw status and JSON body.
    ///
    /// The timestamp is added to `body`, and the compact JSON text that is
    /// signed is exactly the text sent.
    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        body: Value,
    ) -> ExchangeResult<(StatusCode, Value)> {
        let payload = with_timestamp(body, chrono::Utc::now().timestamp_millis());
        let payload = serde_json::to_string(&payload)
            .map_err(|e| ExchangeError::InvalidOrder(format!("Failed to serialize body: {}", e)))?;
        let signature = sign_payload(&self.config.credentials.api_secret, &payload)?;

        self.limiter.until_ready().await;

        let url = format!("{}{}", self.config.api_base, path);
        debug!("{} {}", method, path);
        let response = self
            .client
            .request(method, &url)
            .header("Content-Type", "application/json")
            .header("X-AUTH-APIKEY", self.config.credentials.api_key.as_str())
            .header("X-AUTH-SIGNATURE", signature)
            .body(payload)
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("{} failed: {}", path, e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, value))
    }

    /// Signed request that treats any non-2xx status as an error
    async fn send_checked(&self, method: Method, path: &str, body: Value) -> Result<Value, String> {
        let (status, value) = self
            .send_signed(method, path, body)
            .await
            .map_err(|e| e.to_string())?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(format!("authentication rejected: {} - {}", status, value));
        }
        if !status.is_success() {
            return Err(format!("{} - {}", status, value));
        }
        Ok(value)
    }
}

#[async_trait]
impl ExecutionGateway for CoinDcxClient {
    fn name(&self) -> &str {
        "CoinDCX Futures"
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        let body = json!({ "pair": symbol, "leverage": leverage.to_string() });
        self.send_checked(Method::POST, UPDATE_LEVERAGE_PATH, body)
            .await
            .map_err(ExchangeError::LeverageUpdateFailed)?;
        info!("Leverage for {} set to {}x", symbol, leverage);
        Ok(())
    }

    async fn get_balance(&self, asset: &str) -> f64 {
        match self.send_checked(Method::GET, WALLETS_PATH, json!({})).await {
            Ok(wallets) => extract_balance(&wallets, asset),
            Err(e) => {
                warn!("Balance query failed: {}", e);
                0.0
            }
        }
    }

    async fn place_order(&self, order: &Order) -> ExchangeResult<OrderAck> {
        let body = order_body(order);
        let response = self
            .send_checked(Method::POST, CREATE_ORDER_PATH, body)
            .await
            .map_err(ExchangeError::OrderPlacementFailed)?;

        let ack = extract_order_ack(&response).ok_or_else(|| {
            ExchangeError::OrderPlacementFailed(format!("No order id in response: {}", response))
        })?;
        info!(
            "Order placed: {} {} {} {} (id {})",
            order.side,
            order.quantity.value(),
            order.symbol,
            order_type_name(&order.order_type),
            ack.order_id
        );
        Ok(ack)
    }

    async fn cancel_order(&self, order_id: &str) -> ExchangeResult<()> {
        self.send_checked(Method::POST, CANCEL_ORDER_PATH, json!({ "id": order_id }))
            .await
            .map_err(ExchangeError::OrderCancellationFailed)?;
        info!("Order cancelled: {}", order_id);
        Ok(())
    }

    async fn edit_order(&self, order_id: &str, edit: &OrderEdit) -> ExchangeResult<EditAck> {
        let (status, value) = self
            .send_signed(Method::POST, EDIT_ORDER_PATH, edit_body(order_id, edit))
            .await?;
        Ok(extract_edit_ack(status.as_u16(), &value))
    }
}

/// Hex HMAC-SHA256 of the request body
pub fn sign_payload(secret: &str, payload: &str) -> ExchangeResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::AuthenticationError(format!("HMAC error: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn with_timestamp(body: Value, timestamp_ms: i64) -> Value {
    let mut map = match body {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.insert("timestamp".to_string(), json!(timestamp_ms));
    Value::Object(map)
}

fn order_type_name(order_type: &OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "market_order",
        OrderType::Limit { .. } => "limit_order",
        OrderType::StopMarket { .. } => "stop_market",
    }
}

/// `{"order": {...}}` body for the create endpoint
pub fn order_body(order: &Order) -> Value {
    let mut payload = json!({
        "side": order.side.as_str(),
        "pair": order.symbol,
        "order_type": order_type_name(&order.order_type),
        "total_quantity": order.quantity.value(),
    });
    if let Some(price) = order.limit_price() {
        payload["price"] = json!(price);
    }
    if let Some(stop_price) = order.stop_price() {
        payload["stop_price"] = json!(stop_price);
    }
    json!({ "order": payload })
}

/// Edit body. A stop price is sent under both keys the endpoint accepts.
pub fn edit_body(order_id: &str, edit: &OrderEdit) -> Value {
    let mut body = json!({ "id": order_id });
    if let Some(price) = edit.price {
        body["price"] = json!(price);
    }
    if let Some(stop_price) = edit.stop_price {
        body["stop_loss_price"] = json!(stop_price);
        body["stop_price"] = json!(stop_price);
    }
    if let Some(quantity) = edit.quantity {
        body["total_quantity"] = json!(quantity);
    }
    body
}

/// Order id and average price from a create response. The endpoint answers
/// with either one order object or an array of them.
pub fn extract_order_ack(response: &Value) -> Option<OrderAck> {
    let order = match response {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let order_id = match order.get("id")? {
        Value::String(id) if !id.is_empty() => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let avg_price = order
        .get("avg_price")
        .and_then(lenient_f64)
        .filter(|p| *p > 0.0);
    Some(OrderAck {
        order_id,
        avg_price,
    })
}

/// Balance of `asset` in a wallets response, 0.0 when absent
pub fn extract_balance(wallets: &Value, asset: &str) -> f64 {
    wallets
        .as_array()
        .and_then(|items| {
            items
                .iter()
                .find(|w| w.get("currency_short_name").and_then(Value::as_str) == Some(asset))
        })
        .and_then(|w| w.get("balance"))
        .and_then(lenient_f64)
        .unwrap_or(0.0)
}

/// Edit outcome: the body's `code` when present, otherwise the HTTP status
pub fn extract_edit_ack(http_status: u16, response: &Value) -> EditAck {
    let code = response
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(http_status);
    let message = response
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);
    EditAck { code, message }
}

/// Numbers arrive either as JSON numbers or as numeric strings
pub(crate) fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::order::OrderSide;

    #[test]
    fn test_sign_payload_matches_known_digest() {
        // RFC 4231 test case 2
        let signature = sign_payload("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_with_timestamp_adds_field() {
        let body = with_timestamp(json!({ "id": "abc" }), 1700000000000);
        assert_eq!(body["timestamp"], json!(1700000000000i64));
        assert_eq!(body["id"], json!("abc"));
    }

    #[test]
    fn test_market_order_body() {
        let order = Order::market("B-BTC_USDT", OrderSide::Buy, 0.004).unwrap();
        let body = order_body(&order);
        assert_eq!(body["order"]["side"], "buy");
        assert_eq!(body["order"]["pair"], "B-BTC_USDT");
        assert_eq!(body["order"]["order_type"], "market_order");
        assert_eq!(body["order"]["total_quantity"], json!(0.004));
        assert!(body["order"].get("price").is_none());
    }

    #[test]
    fn test_limit_order_body() {
        let order = Order::limit("B-BTC_USDT", OrderSide::Sell, 0.001, 50300.0).unwrap();
        let body = order_body(&order);
        assert_eq!(body["order"]["order_type"], "limit_order");
        assert_eq!(body["order"]["price"], json!(50300.0));
    }

    #[test]
    fn test_stop_market_order_body() {
        let order = Order::stop_market("B-BTC_USDT", OrderSide::Sell, 0.004, 49800.0).unwrap();
        let body = order_body(&order);
        assert_eq!(body["order"]["order_type"], "stop_market");
        assert_eq!(body["order"]["stop_price"], json!(49800.0));
        assert!(body["order"].get("price").is_none());
    }

    #[test]
    fn test_edit_body_sets_both_stop_keys() {
        let body = edit_body("sl-1", &OrderEdit::stop_price(50000.0));
        assert_eq!(body["id"], "sl-1");
        assert_eq!(body["stop_loss_price"], json!(50000.0));
        assert_eq!(body["stop_price"], json!(50000.0));
        assert!(body.get("total_quantity").is_none());
    }

    #[test]
    fn test_extract_order_ack_object_and_array() {
        let ack = extract_order_ack(&json!({ "id": "ord-1", "avg_price": "50012.5" })).unwrap();
        assert_eq!(ack.order_id, "ord-1");
        assert_eq!(ack.avg_price, Some(50012.5));

        let ack = extract_order_ack(&json!([{ "id": "ord-2", "avg_price": 0 }])).unwrap();
        assert_eq!(ack.order_id, "ord-2");
        assert_eq!(ack.avg_price, None);

        assert!(extract_order_ack(&json!({ "status": "error" })).is_none());
        assert!(extract_order_ack(&json!([])).is_none());
    }

    #[test]
    fn test_extract_balance() {
        let wallets = json!([
            { "currency_short_name": "INR", "balance": "100" },
            { "currency_short_name": "USDT", "balance": "250.75" }
        ]);
        assert_eq!(extract_balance(&wallets, "USDT"), 250.75);
        assert_eq!(extract_balance(&wallets, "BTC"), 0.0);
        assert_eq!(extract_balance(&json!({ "error": "x" }), "USDT"), 0.0);
    }

    #[test]
    fn test_extract_edit_ack() {
        assert!(extract_edit_ack(200, &json!({ "code": 200 })).is_accepted());

        let ack = extract_edit_ack(200, &json!({ "code": 422, "message": "bad stop" }));
        assert_eq!(ack.code, 422);
        assert_eq!(ack.message.as_deref(), Some("bad stop"));
        assert!(!ack.is_accepted());

        // Without a body code the HTTP status decides
        assert_eq!(extract_edit_ack(400, &Value::Null).code, 400);
    }
}
