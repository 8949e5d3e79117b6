use async_trait::async_trait;

use crate::domain::services::indicators::Candle;

/// Read-only source of OHLCV candles
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Up to `limit` candles ascending by time. Failures are logged by the
    /// implementation and surface as an empty vector, which callers treat as
    /// "retry later".
    async fn get_candles(&self, symbol: &str, interval: &str, limit: usize) -> Vec<Candle>;
}
