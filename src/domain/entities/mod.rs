pub mod order;
pub mod trade;
