pub mod exchange_client;
pub mod market_data;
pub mod trade_store;
