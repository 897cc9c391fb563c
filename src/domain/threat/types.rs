//! Typed MEV threat records emitted by the detector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::protection::StrategyType;

/// Kind of extractive behavior observed in the mempool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatType {
    Frontrun,
    Sandwich,
    Arbitrage,
    Liquidation,
}

/// Threat severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Detected MEV threat. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MevThreat {
    pub threat_type: ThreatType,
    pub severity: ThreatSeverity,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    /// Hash of the implicated pending/recent transaction, when one exists
    pub tx_hash: Option<String>,
    pub target_function: String,
    /// Estimated extractable value in native-asset units
    pub estimated_value: f64,
    /// Priority-ordered mitigations for this threat type
    pub recommended_protections: Vec<StrategyType>,
    pub automated_protection: bool,
}

impl MevThreat {
    /// Priority-ordered protections per threat type
    pub fn protections_for(threat_type: ThreatType) -> Vec<StrategyType> {
        match threat_type {
            ThreatType::Sandwich => vec![StrategyType::PrivatePool, StrategyType::GasAuction],
            ThreatType::Frontrun => vec![StrategyType::TimeDelay, StrategyType::CommitReveal],
            ThreatType::Arbitrage => vec![StrategyType::GasAuction, StrategyType::PrivatePool],
            ThreatType::Liquidation => vec![StrategyType::PrivatePool, StrategyType::TimeDelay],
        }
    }
}

/// Threat counts bucketed by severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl SeverityCounts {
    pub fn tally(threats: &[MevThreat]) -> Self {
        let mut counts = Self::default();
        for threat in threats {
            match threat.severity {
                ThreatSeverity::Low => counts.low += 1,
                ThreatSeverity::Medium => counts.medium += 1,
                ThreatSeverity::High => counts.high += 1,
                ThreatSeverity::Critical => counts.critical += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.critical
    }
}

/// Per-cycle detection output, persisted to the report sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MevAnalysisResult {
    pub timestamp: DateTime<Utc>,
    pub threats: Vec<MevThreat>,
    pub severity_counts: SeverityCounts,
    pub total_estimated_value: f64,
    pub active_protections: Vec<StrategyType>,
    pub recommendations: Vec<String>,
}
