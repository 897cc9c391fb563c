//! Mempool threat detection over pending/recent transaction windows

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::protection::StrategyType;
use crate::domain::threat::types::{
    MevAnalysisResult, MevThreat, SeverityCounts, ThreatSeverity, ThreatType,
};
use crate::shared::types::PendingTransaction;

/// Rough native-unit proxy: gas premium in gwei scaled down. Placeholder
/// until a calibrated value model is available.
const GAS_PREMIUM_VALUE_FACTOR: f64 = 0.001;

/// Detector tuning. Confidence constants match the observed base rates of
/// each pattern; calibrate by backtesting before changing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Pending gas price must exceed this multiple of the trailing average
    pub frontrun_gas_multiplier: f64,
    pub sandwich_confidence: f64,
    pub frontrun_confidence: f64,
    pub contention_confidence: f64,
    /// Known profitable call selectors (swap-like functions)
    pub profitable_selectors: Vec<String>,
    /// Merge threats referencing the same tx hash across passes.
    /// Off by default: passes are additive and duplicates compound.
    pub merge_duplicates: bool,
    pub threat_log_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            frontrun_gas_multiplier: 1.5,
            sandwich_confidence: 0.8,
            frontrun_confidence: 0.6,
            contention_confidence: 0.9,
            profitable_selectors: vec![
                "0x38ed1739".to_string(), // swapExactTokensForTokens
                "0x7ff36ab5".to_string(), // swapExactETHForTokens
                "0x18cbafe5".to_string(), // swapExactTokensForETH
                "0x5c11d795".to_string(), // swapExactTokensForTokensSupportingFee
                "0x414bf389".to_string(), // exactInputSingle
            ],
            merge_duplicates: false,
            threat_log_capacity: 1000,
        }
    }
}

/// Consumes pending/recent transaction windows and emits typed threats.
///
/// The three passes (sandwich, front-run, arbitrage contention) are
/// independent and additive.
pub struct ThreatDetector {
    config: DetectorConfig,
    threat_log: RwLock<VecDeque<MevThreat>>,
}

impl ThreatDetector {
    pub fn new(config: DetectorConfig) -> Self {
        let capacity = config.threat_log_capacity;
        Self {
            config,
            threat_log: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Run all detection passes and append results to the threat log.
    pub async fn detect(
        &self,
        pending_window: &[PendingTransaction],
        recent_window: &[PendingTransaction],
    ) -> Vec<MevThreat> {
        let mut threats = Vec::new();
        threats.extend(self.detect_sandwiches(recent_window));
        threats.extend(self.detect_frontruns(pending_window, recent_window));
        threats.extend(self.detect_contention(pending_window));

        if self.config.merge_duplicates {
            threats = Self::merge_by_hash(threats);
        }

        if !threats.is_empty() {
            info!(
                "🔍 Detected {} MEV threat(s) over {} pending / {} recent txs",
                threats.len(),
                pending_window.len(),
                recent_window.len()
            );
        }

        let mut log = self.threat_log.write().await;
        for threat in &threats {
            if log.len() >= self.config.threat_log_capacity {
                log.pop_front();
            }
            log.push_back(threat.clone());
        }

        threats
    }

    /// Sandwich pass: a recent transaction bracketed by two higher-gas
    /// transactions targeting the same pool is flagged as the victim.
    fn detect_sandwiches(&self, recent: &[PendingTransaction]) -> Vec<MevThreat> {
        let mut threats = Vec::new();
        for window in recent.windows(3) {
            let (prev, curr, next) = (&window[0], &window[1], &window[2]);
            if prev.gas_price > curr.gas_price
                && next.gas_price > curr.gas_price
                && prev.to == curr.to
                && curr.to == next.to
            {
                let premium = (prev.gas_price + next.gas_price) / 2.0 - curr.gas_price;
                debug!(
                    "Sandwich pattern around {} (gas {}/{}/{})",
                    curr.hash, prev.gas_price, curr.gas_price, next.gas_price
                );
                threats.push(self.build_threat(
                    ThreatType::Sandwich,
                    ThreatSeverity::High,
                    self.config.sandwich_confidence,
                    Some(curr.hash.clone()),
                    "swap".to_string(),
                    premium * GAS_PREMIUM_VALUE_FACTOR,
                ));
            }
        }
        threats
    }

    /// Front-run pass: pending transaction paying well above the trailing
    /// average gas price and calling a known profitable selector.
    fn detect_frontruns(
        &self,
        pending: &[PendingTransaction],
        recent: &[PendingTransaction],
    ) -> Vec<MevThreat> {
        if recent.is_empty() {
            return Vec::new();
        }
        let avg_gas: f64 =
            recent.iter().map(|tx| tx.gas_price).sum::<f64>() / recent.len() as f64;
        let cutoff = avg_gas * self.config.frontrun_gas_multiplier;

        pending
            .iter()
            .filter_map(|tx| {
                let selector = tx.selector()?;
                if tx.gas_price > cutoff
                    && self
                        .config
                        .profitable_selectors
                        .iter()
                        .any(|s| s == selector)
                {
                    Some(self.build_threat(
                        ThreatType::Frontrun,
                        ThreatSeverity::Medium,
                        self.config.frontrun_confidence,
                        Some(tx.hash.clone()),
                        selector.to_string(),
                        (tx.gas_price - cutoff).max(0.0) * GAS_PREMIUM_VALUE_FACTOR,
                    ))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Contention pass: arbitrage-shaped pending transactions grouped by
    /// target address; any group with more than one member is contested.
    fn detect_contention(&self, pending: &[PendingTransaction]) -> Vec<MevThreat> {
        let mut groups: HashMap<&str, usize> = HashMap::new();
        for tx in pending {
            if let Some(selector) = tx.selector() {
                if self
                    .config
                    .profitable_selectors
                    .iter()
                    .any(|s| s == selector)
                {
                    *groups.entry(tx.to.as_str()).or_insert(0) += 1;
                }
            }
        }

        groups
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(target, count)| {
                debug!("Contested arbitrage target {} ({} competitors)", target, count);
                self.build_threat(
                    ThreatType::Arbitrage,
                    ThreatSeverity::Low,
                    self.config.contention_confidence,
                    None,
                    format!("arbitrage:{}", target),
                    0.0,
                )
            })
            .collect()
    }

    fn build_threat(
        &self,
        threat_type: ThreatType,
        severity: ThreatSeverity,
        confidence: f64,
        tx_hash: Option<String>,
        target_function: String,
        estimated_value: f64,
    ) -> MevThreat {
        MevThreat {
            threat_type,
            severity,
            confidence,
            detected_at: Utc::now(),
            tx_hash,
            target_function,
            estimated_value,
            recommended_protections: MevThreat::protections_for(threat_type),
            automated_protection: severity >= ThreatSeverity::High,
        }
    }

    /// Collapse threats sharing a tx hash, keeping the highest severity and
    /// confidence and summing estimated value. Hashless threats pass through.
    fn merge_by_hash(threats: Vec<MevThreat>) -> Vec<MevThreat> {
        let mut merged: Vec<MevThreat> = Vec::new();
        let mut by_hash: HashMap<String, usize> = HashMap::new();

        for threat in threats {
            match &threat.tx_hash {
                Some(hash) => {
                    if let Some(&idx) = by_hash.get(hash) {
                        let existing: &mut MevThreat = &mut merged[idx];
                        existing.estimated_value += threat.estimated_value;
                        if threat.severity > existing.severity {
                            existing.severity = threat.severity;
                            existing.threat_type = threat.threat_type;
                            existing.recommended_protections =
                                threat.recommended_protections.clone();
                        }
                        existing.confidence = existing.confidence.max(threat.confidence);
                        existing.automated_protection |= threat.automated_protection;
                    } else {
                        by_hash.insert(hash.clone(), merged.len());
                        merged.push(threat);
                    }
                }
                None => merged.push(threat),
            }
        }
        merged
    }

    /// Most recent threats from the bounded log, newest last
    pub async fn recent_threats(&self, limit: usize) -> Vec<MevThreat> {
        let log = self.threat_log.read().await;
        log.iter()
            .skip(log.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    pub async fn log_len(&self) -> usize {
        self.threat_log.read().await.len()
    }

    /// Build the per-cycle analysis record for the report sink
    pub fn analyze(
        &self,
        threats: Vec<MevThreat>,
        active_protections: Vec<StrategyType>,
    ) -> MevAnalysisResult {
        let severity_counts = SeverityCounts::tally(&threats);
        let total_estimated_value: f64 = threats.iter().map(|t| t.estimated_value).sum();

        let mut recommendations = Vec::new();
        if severity_counts.high + severity_counts.critical > 0 {
            recommendations
                .push("High-severity MEV activity: route orders through a private pool".to_string());
        }
        if threats
            .iter()
            .any(|t| t.threat_type == ThreatType::Sandwich)
        {
            recommendations
                .push("Sandwich pattern observed: tighten slippage and use commit-reveal".to_string());
        }
        if threats
            .iter()
            .filter(|t| t.threat_type == ThreatType::Arbitrage)
            .count()
            > 1
        {
            recommendations
                .push("Multiple contested arbitrage targets: expect gas auctions".to_string());
        }

        MevAnalysisResult {
            timestamp: Utc::now(),
            threats,
            severity_counts,
            total_estimated_value,
            active_protections,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tx(hash: &str, gas: f64, to: &str, input: &str) -> PendingTransaction {
        PendingTransaction {
            hash: hash.to_string(),
            gas_price: gas,
            to: to.to_string(),
            input_data: input.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn swap_tx(hash: &str, gas: f64, to: &str) -> PendingTransaction {
        tx(hash, gas, to, "0x38ed173900000000")
    }

    #[tokio::test]
    async fn test_sandwich_detected_on_bracketing_gas() {
        let detector = ThreatDetector::new(DetectorConfig::default());
        let recent = vec![
            swap_tx("0xaa", 50.0, "poolX"),
            swap_tx("0xbb", 30.0, "poolX"),
            swap_tx("0xcc", 55.0, "poolX"),
        ];

        let threats = detector.detect(&[], &recent).await;
        assert_eq!(threats.len(), 1);
        let threat = &threats[0];
        assert_eq!(threat.threat_type, ThreatType::Sandwich);
        assert_eq!(threat.severity, ThreatSeverity::High);
        assert_eq!(threat.confidence, 0.8);
        assert_eq!(threat.tx_hash.as_deref(), Some("0xbb"));
        assert_eq!(
            threat.recommended_protections,
            vec![StrategyType::PrivatePool, StrategyType::GasAuction]
        );
    }

    #[tokio::test]
    async fn test_no_sandwich_across_different_pools() {
        let detector = ThreatDetector::new(DetectorConfig::default());
        let recent = vec![
            swap_tx("0xaa", 50.0, "poolX"),
            swap_tx("0xbb", 30.0, "poolY"),
            swap_tx("0xcc", 55.0, "poolX"),
        ];
        let threats = detector.detect(&[], &recent).await;
        assert!(threats.is_empty());
    }

    #[tokio::test]
    async fn test_no_sandwich_without_bracketing() {
        let detector = ThreatDetector::new(DetectorConfig::default());
        let recent = vec![
            swap_tx("0xaa", 20.0, "poolX"),
            swap_tx("0xbb", 30.0, "poolX"),
            swap_tx("0xcc", 55.0, "poolX"),
        ];
        let threats = detector.detect(&[], &recent).await;
        assert!(threats.is_empty());
    }

    #[tokio::test]
    async fn test_frontrun_requires_gas_premium_and_known_selector() {
        let detector = ThreatDetector::new(DetectorConfig::default());
        // Trailing average 20 gwei, cutoff 30
        let recent = vec![
            swap_tx("0xr1", 20.0, "poolX"),
            swap_tx("0xr2", 20.0, "poolX"),
        ];
        let pending = vec![
            swap_tx("0xhot", 45.0, "poolX"),             // flagged
            swap_tx("0xcold", 25.0, "poolY"),            // below cutoff
            tx("0xother", 60.0, "poolX", "0xdeadbeef00"), // unknown selector
        ];

        let threats = detector.detect(&pending, &recent).await;
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].threat_type, ThreatType::Frontrun);
        assert_eq!(threats[0].severity, ThreatSeverity::Medium);
        assert_eq!(threats[0].confidence, 0.6);
        assert_eq!(threats[0].tx_hash.as_deref(), Some("0xhot"));
    }

    #[tokio::test]
    async fn test_frontrun_pass_skipped_without_recent_window() {
        let detector = ThreatDetector::new(DetectorConfig::default());
        let pending = vec![swap_tx("0xhot", 500.0, "poolX")];
        let threats = detector.detect(&pending, &[]).await;
        assert!(threats.is_empty());
    }

    #[tokio::test]
    async fn test_contention_flags_groups_larger_than_one() {
        let detector = ThreatDetector::new(DetectorConfig::default());
        let pending = vec![
            swap_tx("0xa1", 10.0, "targetA"),
            swap_tx("0xa2", 11.0, "targetA"),
            swap_tx("0xb1", 12.0, "targetB"),
        ];

        let threats = detector.detect(&pending, &[]).await;
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].threat_type, ThreatType::Arbitrage);
        assert_eq!(threats[0].severity, ThreatSeverity::Low);
        assert_eq!(threats[0].confidence, 0.9);
        assert!(threats[0].target_function.contains("targetA"));
    }

    #[tokio::test]
    async fn test_passes_are_additive_without_dedup() {
        // The same hot tx can show up in both frontrun (pending) and be part
        // of contention grouping; duplicates are kept by default.
        let detector = ThreatDetector::new(DetectorConfig::default());
        let recent = vec![
            swap_tx("0xr1", 20.0, "poolX"),
            swap_tx("0xr2", 20.0, "poolX"),
        ];
        let pending = vec![
            swap_tx("0xhot1", 45.0, "poolX"),
            swap_tx("0xhot2", 46.0, "poolX"),
        ];

        let threats = detector.detect(&pending, &recent).await;
        // Two frontruns plus one contention group
        assert_eq!(threats.len(), 3);
    }

    #[tokio::test]
    async fn test_merge_duplicates_keeps_max_severity() {
        let config = DetectorConfig {
            merge_duplicates: true,
            ..Default::default()
        };
        let detector = ThreatDetector::new(config);
        // Sandwich victim that is also an outsized-gas pending swap
        let recent = vec![
            swap_tx("0xaa", 50.0, "poolX"),
            swap_tx("0xbb", 30.0, "poolX"),
            swap_tx("0xcc", 55.0, "poolX"),
        ];
        let pending = vec![swap_tx("0xbb", 500.0, "poolX")];

        let threats = detector.detect(&pending, &recent).await;
        let merged: Vec<_> = threats
            .iter()
            .filter(|t| t.tx_hash.as_deref() == Some("0xbb"))
            .collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].severity, ThreatSeverity::High);
    }

    #[tokio::test]
    async fn test_threat_log_bounded() {
        let config = DetectorConfig {
            threat_log_capacity: 5,
            ..Default::default()
        };
        let detector = ThreatDetector::new(config);
        for i in 0..10 {
            let recent = vec![
                swap_tx(&format!("0xa{}", i), 50.0, "poolX"),
                swap_tx(&format!("0xb{}", i), 30.0, "poolX"),
                swap_tx(&format!("0xc{}", i), 55.0, "poolX"),
            ];
            detector.detect(&[], &recent).await;
        }
        assert_eq!(detector.log_len().await, 5);
        let recent = detector.recent_threats(100).await;
        assert_eq!(recent.len(), 5);
        assert_eq!(recent.last().unwrap().tx_hash.as_deref(), Some("0xb9"));
    }
}
