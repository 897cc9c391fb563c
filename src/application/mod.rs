//! Application layer - monitoring loops and statistics

pub mod monitor;

pub use monitor::{MonitorHandle, MonitorStats, RiskMonitor};
