// src/app.rs
use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::application::monitor::RiskMonitor;
use crate::config::Config;
use crate::domain::breakers::CircuitBreakerRegistry;
use crate::domain::metrics::MetricStore;
use crate::domain::protection::ProtectionSelector;
use crate::domain::risk::{RiskAssessmentEngine, RiskWeights, StaticRiskEstimator};
use crate::domain::threat::ThreatDetector;
use crate::infrastructure::execution::{ExecutionControl, LoggingExecutionControl};
use crate::infrastructure::feeds::SimulatedFeed;
use crate::report::{FileReportSink, Report, ReportSink};
use crate::shared::types::PendingTransaction;

/// Wired engine components, built once from config
pub struct App {
    config: Config,
    metrics: Arc<MetricStore>,
    breakers: Arc<CircuitBreakerRegistry>,
    engine: Arc<RiskAssessmentEngine>,
    detector: Arc<ThreatDetector>,
    selector: Arc<ProtectionSelector>,
    execution: Arc<dyn ExecutionControl>,
    sink: Arc<dyn ReportSink>,
}

impl App {
    /// Build and validate all components. Invalid breaker definitions are
    /// fatal here, before anything starts.
    pub async fn build(config: Config) -> Result<Self> {
        let metrics = Arc::new(MetricStore::new());
        let breakers = Arc::new(CircuitBreakerRegistry::new());
        for breaker in config.build_breakers()? {
            breakers.register(breaker).await;
        }

        let execution: Arc<dyn ExecutionControl> = Arc::new(LoggingExecutionControl);
        let sink: Arc<dyn ReportSink> =
            Arc::new(FileReportSink::new(&config.reports.output_dir));

        let engine = Arc::new(RiskAssessmentEngine::new(
            config.limits.clone(),
            RiskWeights::default(),
            config.metrics.clone(),
            config.monitor.auto_mitigate,
            Arc::clone(&metrics),
            Arc::clone(&breakers),
            Arc::new(StaticRiskEstimator::default()),
            Arc::clone(&execution),
            Arc::new(AtomicBool::new(false)),
        ));
        let detector = Arc::new(ThreatDetector::new(config.detector.clone()));
        let selector = Arc::new(ProtectionSelector::with_catalog(
            config.selector.clone(),
            config.build_catalog(),
        ));

        Ok(Self {
            config,
            metrics,
            breakers,
            engine,
            detector,
            selector,
            execution,
            sink,
        })
    }

    /// Run the monitoring loops until Ctrl-C (or for `duration` seconds)
    pub async fn run_monitor(self, duration: Option<u64>) -> Result<()> {
        info!("🚀 Starting riskguard monitor");
        let feed = Arc::new(SimulatedFeed::new());
        let monitor = Arc::new(RiskMonitor::new(
            self.config.monitor.clone(),
            Arc::clone(&self.engine),
            Arc::clone(&self.detector),
            Arc::clone(&self.selector),
            Arc::clone(&self.metrics),
            Arc::clone(&self.breakers),
            Arc::clone(&self.execution),
            Arc::clone(&self.sink),
            feed.clone(),
            feed.clone(),
            feed,
        ));

        let handle = Arc::clone(&monitor).spawn();

        let stats_monitor = Arc::clone(&monitor);
        let stats_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                stats_monitor.print_stats().await;
            }
        });

        match duration {
            Some(secs) => {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                info!("Configured duration of {}s elapsed", secs);
            }
            None => {
                tokio::signal::ctrl_c().await?;
                info!("Received Ctrl-C");
            }
        }

        stats_task.abort();
        monitor.print_stats().await;
        handle.shutdown().await;
        Ok(())
    }

    /// One-shot assessment against the position ledger, printed and
    /// persisted
    pub async fn run_assess(self, include_stress_test: bool) -> Result<()> {
        use crate::infrastructure::feeds::PositionLedger;

        let feed = SimulatedFeed::new();
        let positions = feed.positions().await.ok();
        let inputs = feed.portfolio().await.ok();

        let result = self
            .engine
            .assess(positions, inputs, include_stress_test)
            .await;

        println!("Risk level: {:?}", result.risk_level);
        println!(
            "Portfolio score: {:.1} (adjusted {:.1})",
            result.overall_risk_score, result.adjusted_score
        );
        for recommendation in &result.recommendations {
            println!("  - {}", recommendation);
        }
        for action in &result.emergency_actions {
            println!("  ! {}", action);
        }

        let id = self.sink.persist(&Report::Risk(result)).await?;
        println!("Report: {}", id);
        Ok(())
    }

    /// One-shot detection over a JSON file of pending transactions (falls
    /// back to the simulated feed when no file is given)
    pub async fn run_detect(self, input: Option<PathBuf>) -> Result<()> {
        use crate::infrastructure::feeds::PendingTxSource;

        let (pending, recent) = match input {
            Some(path) => {
                let body = tokio::fs::read_to_string(&path).await?;
                let txs: Vec<PendingTransaction> = serde_json::from_str(&body)?;
                (txs.clone(), txs)
            }
            None => {
                warn!("No input file, detecting over simulated mempool data");
                let feed = SimulatedFeed::new();
                (
                    feed.pending_window().await.unwrap_or_default(),
                    feed.recent_window().await.unwrap_or_default(),
                )
            }
        };

        let threats = self.detector.detect(&pending, &recent).await;
        let selection = self.selector.select(&threats);
        println!("Detected {} threat(s)", threats.len());
        for threat in &threats {
            println!(
                "  {:?} [{:?}] confidence {:.2} target {} value {:.4}",
                threat.threat_type,
                threat.severity,
                threat.confidence,
                threat.target_function,
                threat.estimated_value
            );
        }
        println!("Protections:");
        for strategy in &selection {
            println!(
                "  {} enabled={} effectiveness={:.2} overhead={}",
                strategy.strategy_type,
                strategy.enabled,
                strategy.effectiveness_score,
                strategy.overhead_cost
            );
        }

        let enabled: Vec<_> = selection
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.strategy_type)
            .collect();
        let analysis = self.detector.analyze(threats, enabled);
        let id = self.sink.persist(&Report::Mev(analysis)).await?;
        println!("Report: {}", id);
        Ok(())
    }

    /// Print the effective configuration and component state
    pub async fn status(self) -> Result<()> {
        println!("Limits: {:?}", self.config.limits);
        println!("Monitor: {:?}", self.config.monitor);
        println!("Registered breakers: {}", self.breakers.len().await);
        for breaker in self.breakers.snapshot().await {
            println!(
                "  {} on {} ({:?} {}) action={:?} triggered={}",
                breaker.name,
                breaker.metric_name,
                breaker.trigger_when,
                breaker.threshold,
                breaker.action,
                breaker.triggered
            );
        }
        println!("Protection catalog:");
        for strategy in self.selector.catalog() {
            println!(
                "  {} effectiveness={:.2} overhead={}",
                strategy.strategy_type, strategy.effectiveness_score, strategy.overhead_cost
            );
        }
        println!("Tracked metrics: {}", self.metrics.len().await);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_builds_from_default_config() {
        let app = App::build(Config::default()).await.unwrap();
        assert!(app.breakers.is_empty().await);
        assert_eq!(app.selector.catalog().len(), 4);
    }

    #[tokio::test]
    async fn test_app_build_rejects_invalid_breaker() {
        let toml_src = r#"
            [[breakers]]
            name = "bad"
            metric = "daily_pnl"
            threshold = -1000.0
            action = "pause"
            recovery = "not a predicate at all"
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert!(App::build(config).await.is_err());
    }
}
