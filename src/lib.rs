//! Breakeven trade supervisor
//!
//! Opens a directional futures trade with a stop-loss and laddered
//! take-profits, then watches it and moves the stop-loss to the entry price
//! once a chosen target is reached.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod secrets;
pub mod task_runner;
