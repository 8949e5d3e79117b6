pub mod coindcx_client;
pub mod coindcx_market_data;
