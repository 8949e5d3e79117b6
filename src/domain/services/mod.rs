pub mod indicators;
pub mod position_sizer;
pub mod risk_planner;
