pub mod price;
pub mod quantity;
pub mod risk_plan;
pub mod sizing_policy;
