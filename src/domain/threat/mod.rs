//! MEV threat detection - mempool pattern analysis and typed threat records

pub mod detector;
pub mod types;

pub use detector::{DetectorConfig, ThreatDetector};
pub use types::{MevAnalysisResult, MevThreat, SeverityCounts, ThreatSeverity, ThreatType};
