use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::domain::breakers::{
    BreakerAction, CircuitBreaker, Comparator, RecoveryCondition,
};
use crate::domain::protection::{ProtectionStrategy, SelectorConfig, StrategyType};
use crate::domain::risk::{MetricThresholds, RiskLimits};
use crate::domain::threat::DetectorConfig;
use crate::shared::errors::AppError;

/// Monitoring loop intervals (seconds unless noted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorCfg {
    pub metrics_interval_secs: u64,
    pub breaker_interval_secs: u64,
    pub emergency_interval_secs: u64,
    /// Threat detection is feed-driven; this floors the time between runs
    pub detection_debounce_ms: u64,
    /// Timeout applied to every external feed/action call
    pub feed_timeout_secs: u64,
    pub auto_mitigate: bool,
    pub include_stress_test: bool,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            metrics_interval_secs: 30,
            breaker_interval_secs: 10,
            emergency_interval_secs: 60,
            detection_debounce_ms: 1000,
            feed_timeout_secs: 10,
            auto_mitigate: true,
            include_stress_test: true,
        }
    }
}

/// Circuit breaker definition as written in Config.toml.
///
/// Recovery accepts either the structured form (`recovery_metric` /
/// `recovery_comparator` / `recovery_threshold`) or the deprecated
/// free-text `recovery` string, parsed once here and never evaluated as
/// code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerCfg {
    pub name: String,
    pub metric: String,
    pub threshold: f64,
    /// "above" (default) or "below"
    #[serde(default = "default_trigger_when")]
    pub trigger_when: String,
    pub action: String,
    #[serde(default)]
    pub recovery: Option<String>,
    #[serde(default)]
    pub recovery_metric: Option<String>,
    #[serde(default)]
    pub recovery_comparator: Option<String>,
    #[serde(default)]
    pub recovery_threshold: Option<f64>,
}

fn default_trigger_when() -> String {
    "above".to_string()
}

impl BreakerCfg {
    /// Validate and build the runtime breaker. Invalid definitions are
    /// fatal at startup.
    pub fn into_breaker(self) -> Result<CircuitBreaker, AppError> {
        let action = BreakerAction::parse(&self.action)?;
        let trigger_when = match self.trigger_when.as_str() {
            "above" => Comparator::Ge,
            "below" => Comparator::Le,
            other => {
                return Err(AppError::ConfigError(format!(
                    "breaker '{}': trigger_when must be 'above' or 'below', got '{}'",
                    self.name, other
                )))
            }
        };

        let recovery = match (&self.recovery_metric, &self.recovery) {
            (Some(metric), _) => {
                let comparator = Comparator::parse(
                    self.recovery_comparator.as_deref().unwrap_or(">"),
                )?;
                let threshold = self.recovery_threshold.ok_or_else(|| {
                    AppError::ConfigError(format!(
                        "breaker '{}': recovery_threshold missing",
                        self.name
                    ))
                })?;
                RecoveryCondition::new(metric.clone(), comparator, threshold)
            }
            (None, Some(text)) => RecoveryCondition::parse(text)?,
            (None, None) => {
                return Err(AppError::ConfigError(format!(
                    "breaker '{}': no recovery condition configured",
                    self.name
                )))
            }
        };

        Ok(CircuitBreaker::new(
            self.name,
            self.metric,
            self.threshold,
            trigger_when,
            action,
            recovery,
        ))
    }
}

/// Protection catalog override entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionCfg {
    pub strategy: StrategyType,
    pub effectiveness_score: f64,
    pub overhead_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsCfg {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for ReportsCfg {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "reports".to_string()
}

/// Top-level engine configuration, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub limits: RiskLimits,
    #[serde(default)]
    pub monitor: MonitorCfg,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub metrics: MetricThresholds,
    #[serde(default)]
    pub breakers: Vec<BreakerCfg>,
    #[serde(default)]
    pub protections: Vec<ProtectionCfg>,
    #[serde(default)]
    pub reports: ReportsCfg,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read {}", path.as_ref().display()))?;
        let cfg: Self = toml::from_str(&s).context("parse Config.toml")?;
        Ok(cfg)
    }

    /// Breaker definitions validated into runtime breakers. Any invalid
    /// definition is fatal here, before the loops start.
    pub fn build_breakers(&self) -> Result<Vec<CircuitBreaker>, AppError> {
        self.breakers
            .iter()
            .cloned()
            .map(BreakerCfg::into_breaker)
            .collect()
    }

    /// Protection catalog with config overrides applied over the defaults
    pub fn build_catalog(&self) -> Vec<ProtectionStrategy> {
        let mut catalog = crate::domain::protection::ProtectionSelector::default_catalog();
        for override_cfg in &self.protections {
            if let Some(entry) = catalog
                .iter_mut()
                .find(|s| s.strategy_type == override_cfg.strategy)
            {
                entry.effectiveness_score = override_cfg.effectiveness_score;
                entry.overhead_cost = override_cfg.overhead_cost;
            }
        }
        catalog
    }
}
