use crate::domain::repositories::market_data::MarketData;
use crate::domain::services::indicators::Candle;
use crate::infrastructure::coindcx_client::lenient_f64;
use crate::rate_limit::ApiRateLimiter;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

const CANDLES_PATH: &str = "/market_data/candlesticks";

/// Public futures candle feed. No credentials needed.
pub struct CoinDcxMarketData {
    client: Client,
    public_base: String,
    limiter: ApiRateLimiter,
}

impl CoinDcxMarketData {
    pub fn new(
        public_base: &str,
        request_timeout: Duration,
        limiter: ApiRateLimiter,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            public_base: public_base.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    async fn fetch(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>, String> {
        let to = chrono::Utc::now().timestamp();
        // One extra candle of slack for the one still forming
        let from = to - (limit as i64 + 1) * interval_seconds(interval);
        let url = format!("{}{}", self.public_base, CANDLES_PATH);

        self.limiter.until_ready().await;

        let response = self
            .client
            .get(&url)
            .query(&[
                ("pair", symbol.to_string()),
                ("from", from.to_string()),
                ("to", to.to_string()),
                ("resolution", resolution(interval).to_string()),
                ("pcode", "f".to_string()),
            ])
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("invalid JSON: {}", e))?;

        let mut candles = parse_candles(&body)?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        Ok(candles)
    }
}

#[async_trait]
impl MarketData for CoinDcxMarketData {
    async fn get_candles(&self, symbol: &str, interval: &str, limit: usize) -> Vec<Candle> {
        match self.fetch(symbol, interval, limit).await {
            Ok(candles) => candles,
            Err(e) => {
                warn!("Candle fetch for {} {} failed: {}", symbol, interval, e);
                Vec::new()
            }
        }
    }
}

/// Exchange resolution code for an interval such as "15m"
pub fn resolution(interval: &str) -> &'static str {
    match interval {
        "1m" => "1",
        "5m" => "5",
        "15m" => "15",
        "1h" => "60",
        "1d" => "1D",
        _ => "15",
    }
}

/// Interval length in seconds, used to size the requested time window
pub fn interval_seconds(interval: &str) -> i64 {
    match interval {
        "1m" => 60,
        "5m" => 300,
        "15m" => 900,
        "1h" => 3_600,
        "1d" => 86_400,
        _ => 900,
    }
}

/// Candles from a `{"s": "ok", "data": [...]}` response, ascending by time.
/// Rows with a missing or non-numeric OHLC field are skipped.
pub fn parse_candles(body: &Value) -> Result<Vec<Candle>, String> {
    if body.get("s").and_then(Value::as_str) != Some("ok") {
        return Err(format!("unexpected response: {}", body));
    }
    let rows = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing data array".to_string())?;

    let mut candles: Vec<Candle> = rows
        .iter()
        .filter_map(|row| {
            let field = |name: &str| row.get(name).and_then(lenient_f64);
            let candle = Candle::new(
                field("open")?,
                field("high")?,
                field("low")?,
                field("close")?,
                field("volume").unwrap_or(0.0),
            );
            let time = row.get("time").and_then(Value::as_i64).unwrap_or(0);
            Some(candle.with_timestamp(time))
        })
        .collect();
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}
