pub mod monitor;
pub mod supervisor;
