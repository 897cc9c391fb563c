//! Maps detected threats to a ranked set of mitigation strategies

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::threat::types::{MevThreat, ThreatType};

/// Available mitigation channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    PrivatePool,
    CommitReveal,
    TimeDelay,
    GasAuction,
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyType::PrivatePool => "private_pool",
            StrategyType::CommitReveal => "commit_reveal",
            StrategyType::TimeDelay => "time_delay",
            StrategyType::GasAuction => "gas_auction",
        };
        write!(f, "{}", name)
    }
}

/// Mitigation strategy with its effectiveness/cost tradeoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionStrategy {
    pub strategy_type: StrategyType,
    pub enabled: bool,
    /// Opaque key/value configuration handed to the execution venue
    pub configuration: HashMap<String, String>,
    /// Expected mitigation effectiveness in [0, 1]
    pub effectiveness_score: f64,
    /// Overhead in gas units (0 = paid via priority fee at auction time)
    pub overhead_cost: f64,
}

impl ProtectionStrategy {
    pub fn new(strategy_type: StrategyType, effectiveness_score: f64, overhead_cost: f64) -> Self {
        Self {
            strategy_type,
            enabled: false,
            configuration: HashMap::new(),
            effectiveness_score,
            overhead_cost,
        }
    }
}

/// Selector tuning and catalog overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Total estimated MEV value (native units) above which private
    /// submission is forced on
    pub value_override_threshold: f64,
    /// Fraction of total threat value offered as the private-pool bid
    pub max_bid_fraction: f64,
    /// Hard cap on the private-pool bid (native units)
    pub max_bid_cap: f64,
    /// Front-run threat count above which a gas auction is forced on
    pub frontrun_auction_threshold: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            value_override_threshold: 0.5,
            max_bid_fraction: 0.1,
            max_bid_cap: 0.05,
            frontrun_auction_threshold: 2,
        }
    }
}

/// Decides which mitigations to enable for the current threat picture.
///
/// Selection itself is a stateless recomputation; the set of currently
/// active strategies is process-wide state with logged transitions.
pub struct ProtectionSelector {
    config: SelectorConfig,
    catalog: Vec<ProtectionStrategy>,
    active: RwLock<HashSet<StrategyType>>,
}

impl ProtectionSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            catalog: Self::default_catalog(),
            active: RwLock::new(HashSet::new()),
        }
    }

    pub fn with_catalog(config: SelectorConfig, catalog: Vec<ProtectionStrategy>) -> Self {
        Self {
            config,
            catalog,
            active: RwLock::new(HashSet::new()),
        }
    }

    /// Fixed 4-strategy catalog with effectiveness/overhead defaults
    pub fn default_catalog() -> Vec<ProtectionStrategy> {
        vec![
            ProtectionStrategy::new(StrategyType::PrivatePool, 0.9, 5000.0),
            ProtectionStrategy::new(StrategyType::CommitReveal, 0.8, 10000.0),
            ProtectionStrategy::new(StrategyType::TimeDelay, 0.6, 2000.0),
            ProtectionStrategy::new(StrategyType::GasAuction, 0.7, 0.0),
        ]
    }

    /// Select strategies for the given threats.
    ///
    /// Enables whatever any threat recommends, then applies value-based
    /// overrides. Returns the full catalog with `enabled` flags set; wiring
    /// a strategy to the submission path is the execution venue's job.
    pub fn select(&self, threats: &[MevThreat]) -> Vec<ProtectionStrategy> {
        let mut catalog: Vec<ProtectionStrategy> = self
            .catalog
            .iter()
            .map(|s| {
                let mut s = s.clone();
                s.enabled = false;
                s.configuration.clear();
                s
            })
            .collect();

        let recommended: HashSet<StrategyType> = threats
            .iter()
            .flat_map(|t| t.recommended_protections.iter().copied())
            .collect();
        for strategy in catalog.iter_mut() {
            if recommended.contains(&strategy.strategy_type) {
                strategy.enabled = true;
            }
        }

        let total_value: f64 = threats.iter().map(|t| t.estimated_value).sum();
        let sandwich_count = threats
            .iter()
            .filter(|t| t.threat_type == ThreatType::Sandwich)
            .count();
        let frontrun_count = threats
            .iter()
            .filter(|t| t.threat_type == ThreatType::Frontrun)
            .count();

        for strategy in catalog.iter_mut() {
            match strategy.strategy_type {
                StrategyType::PrivatePool => {
                    if total_value > self.config.value_override_threshold {
                        strategy.enabled = true;
                        let max_bid = (total_value * self.config.max_bid_fraction)
                            .min(self.config.max_bid_cap);
                        strategy
                            .configuration
                            .insert("max_bid".to_string(), format!("{}", max_bid));
                    }
                }
                StrategyType::CommitReveal => {
                    if sandwich_count > 0 {
                        strategy.enabled = true;
                    }
                }
                StrategyType::GasAuction => {
                    if frontrun_count > self.config.frontrun_auction_threshold {
                        strategy.enabled = true;
                    }
                }
                StrategyType::TimeDelay => {}
            }
        }

        catalog
    }

    /// Reconcile the process-wide active set against a fresh selection,
    /// logging every enable/disable transition. Returns (activated,
    /// deactivated) strategy types for the caller to dispatch.
    pub async fn reconcile(
        &self,
        selection: &[ProtectionStrategy],
    ) -> (Vec<ProtectionStrategy>, Vec<StrategyType>) {
        let mut active = self.active.write().await;
        let mut activated = Vec::new();
        let mut deactivated = Vec::new();

        for strategy in selection {
            if strategy.enabled && !active.contains(&strategy.strategy_type) {
                active.insert(strategy.strategy_type);
                info!(
                    "🛡️  Protection enabled: {} (effectiveness {:.2}, overhead {})",
                    strategy.strategy_type, strategy.effectiveness_score, strategy.overhead_cost
                );
                activated.push(strategy.clone());
            } else if !strategy.enabled && active.contains(&strategy.strategy_type) {
                active.remove(&strategy.strategy_type);
                info!("Protection disabled: {}", strategy.strategy_type);
                deactivated.push(strategy.strategy_type);
            }
        }

        (activated, deactivated)
    }

    pub async fn active(&self) -> Vec<StrategyType> {
        self.active.read().await.iter().copied().collect()
    }

    pub fn catalog(&self) -> &[ProtectionStrategy] {
        &self.catalog
    }
}

impl Default for ProtectionSelector {
    fn default() -> Self {
        Self::new(SelectorConfig::default())
    }
}
