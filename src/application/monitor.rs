//! Supervised monitoring loops sharing the engine's state stores

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::MonitorCfg;
use crate::domain::breakers::{BreakerTransition, CircuitBreakerRegistry};
use crate::domain::metrics::MetricStore;
use crate::domain::protection::ProtectionSelector;
use crate::domain::risk::RiskAssessmentEngine;
use crate::domain::threat::ThreatDetector;
use crate::infrastructure::execution::{with_retry, ExecutionControl};
use crate::infrastructure::feeds::{PendingTxSource, PositionLedger, PriceFeed};
use crate::report::{Report, ReportSink};
use crate::shared::errors::{AppError, FeedError};
use crate::shared::utils::calculate_percentage_change;

/// Monitoring statistics
#[derive(Debug, Clone)]
pub struct MonitorStats {
    pub start_time: Instant,
    pub metric_cycles: u64,
    pub breaker_cycles: u64,
    pub assessment_cycles: u64,
    pub detection_cycles: u64,
    pub threats_detected: u64,
    pub breakers_triggered: u64,
    pub reports_persisted: u64,
    pub report_failures: u64,
    pub last_update: Instant,
}

impl MonitorStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            metric_cycles: 0,
            breaker_cycles: 0,
            assessment_cycles: 0,
            detection_cycles: 0,
            threats_detected: 0,
            breakers_triggered: 0,
            reports_persisted: 0,
            report_failures: 0,
            last_update: Instant::now(),
        }
    }

    pub fn get_uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn get_threats_per_minute(&self) -> f64 {
        let uptime_minutes = self.get_uptime().as_secs_f64() / 60.0;
        if uptime_minutes > 0.0 {
            self.threats_detected as f64 / uptime_minutes
        } else {
            0.0
        }
    }
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle over the spawned loops; dropping it does not stop them, call
/// [`MonitorHandle::shutdown`] for an orderly stop.
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stop scheduling new iterations and join all loops. In-flight
    /// iterations (and their time-bounded external calls) finish first.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down monitoring loops...");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Loop task panicked during shutdown: {}", e);
            }
        }
        info!("All monitoring loops stopped");
    }
}

/// Owns the periodic loops: metrics refresh, breaker evaluation, full
/// emergency assessment, and feed-driven threat detection.
pub struct RiskMonitor {
    config: MonitorCfg,
    engine: Arc<RiskAssessmentEngine>,
    detector: Arc<ThreatDetector>,
    selector: Arc<ProtectionSelector>,
    metrics: Arc<MetricStore>,
    breakers: Arc<CircuitBreakerRegistry>,
    execution: Arc<dyn ExecutionControl>,
    sink: Arc<dyn ReportSink>,
    price_feed: Arc<dyn PriceFeed>,
    tx_source: Arc<dyn PendingTxSource>,
    ledger: Arc<dyn PositionLedger>,
    stats: Arc<RwLock<MonitorStats>>,
}

impl RiskMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: MonitorCfg,
        engine: Arc<RiskAssessmentEngine>,
        detector: Arc<ThreatDetector>,
        selector: Arc<ProtectionSelector>,
        metrics: Arc<MetricStore>,
        breakers: Arc<CircuitBreakerRegistry>,
        execution: Arc<dyn ExecutionControl>,
        sink: Arc<dyn ReportSink>,
        price_feed: Arc<dyn PriceFeed>,
        tx_source: Arc<dyn PendingTxSource>,
        ledger: Arc<dyn PositionLedger>,
    ) -> Self {
        Self {
            config,
            engine,
            detector,
            selector,
            metrics,
            breakers,
            execution,
            sink,
            price_feed,
            tx_source,
            ledger,
            stats: Arc::new(RwLock::new(MonitorStats::new())),
        }
    }

    pub fn stats_handle(&self) -> Arc<RwLock<MonitorStats>> {
        Arc::clone(&self.stats)
    }

    /// Spawn all loops. Every iteration body is wrapped so that errors are
    /// logged and the loop continues on its next tick; nothing escapes a
    /// loop as an unhandled fault.
    pub fn spawn(self: Arc<Self>) -> MonitorHandle {
        info!(
            "🚀 Starting monitoring loops (metrics {}s, breakers {}s, emergency {}s, detection ≥{}ms)",
            self.config.metrics_interval_secs,
            self.config.breaker_interval_secs,
            self.config.emergency_interval_secs,
            self.config.detection_debounce_ms
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        tasks.push(self.clone().spawn_loop(
            "metrics",
            Duration::from_secs(self.config.metrics_interval_secs),
            shutdown_rx.clone(),
            |monitor| async move { monitor.metrics_iteration().await },
        ));
        tasks.push(self.clone().spawn_loop(
            "breakers",
            Duration::from_secs(self.config.breaker_interval_secs),
            shutdown_rx.clone(),
            |monitor| async move { monitor.breaker_iteration().await },
        ));
        tasks.push(self.clone().spawn_loop(
            "emergency",
            Duration::from_secs(self.config.emergency_interval_secs),
            shutdown_rx.clone(),
            |monitor| async move { monitor.assessment_iteration().await },
        ));
        tasks.push(self.clone().spawn_loop(
            "detection",
            Duration::from_millis(self.config.detection_debounce_ms),
            shutdown_rx,
            |monitor| async move { monitor.detection_iteration().await },
        ));

        MonitorHandle { shutdown_tx, tasks }
    }

    fn spawn_loop<F, Fut>(
        self: Arc<Self>,
        name: &'static str,
        period: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
        iteration: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), AppError>> + Send,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = iteration(Arc::clone(&self)).await {
                            error!("{} loop iteration failed: {}", name, e);
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("{} loop stopping", name);
                            break;
                        }
                    }
                }
            }
        })
    }

    fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.config.feed_timeout_secs)
    }

    /// Time-bound an external feed call; expiry is DataUnavailable, never a
    /// stall.
    async fn bounded<T>(
        &self,
        label: &str,
        fut: impl std::future::Future<Output = Result<T, FeedError>>,
    ) -> Option<T> {
        match timeout(self.feed_timeout(), fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("{} unavailable: {}", label, e);
                None
            }
            Err(_) => {
                warn!(
                    "{} timed out after {}s",
                    label,
                    self.config.feed_timeout_secs
                );
                None
            }
        }
    }

    /// Refresh market metrics from the price and position feeds
    async fn metrics_iteration(self: Arc<Self>) -> Result<(), AppError> {
        if let Some(snapshots) = self.bounded("price feed", self.price_feed.latest()).await {
            if !snapshots.is_empty() {
                let total_liquidity: f64 = snapshots.iter().map(|s| s.liquidity).sum();
                let max = snapshots.iter().map(|s| s.price).fold(f64::MIN, f64::max);
                let min = snapshots.iter().map(|s| s.price).fold(f64::MAX, f64::min);
                // Cross-venue spread in percent, a cheap volatility proxy
                let dispersion = calculate_percentage_change(min, max);
                self.metrics
                    .update("feed_liquidity", total_liquidity, 1e5, 1e4)
                    .await;
                self.metrics
                    .update("price_dispersion", dispersion, 1.0, 5.0)
                    .await;
            }
        }

        if let Some(inputs) = self.bounded("position ledger", self.ledger.portfolio()).await {
            self.metrics
                .update("gas_price_gwei", inputs.gas_price_gwei, 150.0, 300.0)
                .await;
            self.metrics
                .update("network_congestion", inputs.network_congestion, 0.7, 0.9)
                .await;
            self.metrics
                .update("market_volatility", inputs.market_volatility, 0.5, 0.8)
                .await;
        }

        let mut stats = self.stats.write().await;
        stats.metric_cycles += 1;
        stats.last_update = Instant::now();
        Ok(())
    }

    /// Evaluate breakers and dispatch actions for fresh triggers
    async fn breaker_iteration(self: Arc<Self>) -> Result<(), AppError> {
        let events = self.breakers.evaluate(self.metrics.as_ref()).await;
        let mut triggered = 0u64;
        for event in &events {
            if event.transition != BreakerTransition::Triggered {
                continue;
            }
            triggered += 1;
            let outcome = match event.action {
                crate::domain::breakers::BreakerAction::Pause => {
                    with_retry("pause_trading", || self.execution.pause_trading()).await
                }
                crate::domain::breakers::BreakerAction::Reduce => {
                    let book = self
                        .bounded("position ledger", self.ledger.positions())
                        .await
                        .unwrap_or_default();
                    match book
                        .iter()
                        .max_by(|a, b| a.size.abs().total_cmp(&b.size.abs()))
                    {
                        Some(worst) => {
                            let id = worst.position_id.clone();
                            with_retry("reduce_position", || {
                                self.execution.reduce_position(&id, 0.5)
                            })
                            .await
                        }
                        // No rankable book available; pause conservatively
                        None => {
                            with_retry("pause_trading", || self.execution.pause_trading()).await
                        }
                    }
                }
                crate::domain::breakers::BreakerAction::Shutdown => {
                    with_retry("emergency_shutdown", || self.execution.emergency_shutdown())
                        .await
                }
            };
            if let Err(e) = outcome {
                error!("Breaker '{}' action failed after retry: {}", event.breaker, e);
                self.engine
                    .escalate(format!(
                        "ACTION FAILED for breaker '{}': {} - operator intervention required",
                        event.breaker, e
                    ))
                    .await;
            }
        }

        let mut stats = self.stats.write().await;
        stats.breaker_cycles += 1;
        stats.breakers_triggered += triggered;
        Ok(())
    }

    /// Full assessment cycle: fetch the book, assess, persist the report
    async fn assessment_iteration(self: Arc<Self>) -> Result<(), AppError> {
        let positions = self.bounded("position ledger", self.ledger.positions()).await;
        let inputs = self.bounded("portfolio inputs", self.ledger.portfolio()).await;

        let result = self
            .engine
            .assess(positions, inputs, self.config.include_stress_test)
            .await;

        let persisted = self.sink.persist(&Report::Risk(result)).await;
        if let Err(e) = &persisted {
            error!("Risk report persist failed: {}", e);
            self.engine
                .escalate(format!(
                    "REPORT PERSIST FAILED (risk assessment): {} - operator intervention required",
                    e
                ))
                .await;
        }
        let mut stats = self.stats.write().await;
        stats.assessment_cycles += 1;
        match persisted {
            Ok(_) => stats.reports_persisted += 1,
            Err(_) => stats.report_failures += 1,
        }
        Ok(())
    }

    /// Feed-driven detection pass: detect, select protections, reconcile
    /// the active set, persist the analysis
    async fn detection_iteration(self: Arc<Self>) -> Result<(), AppError> {
        let pending = self
            .bounded("pending txs", self.tx_source.pending_window())
            .await
            .unwrap_or_default();
        let recent = self
            .bounded("recent txs", self.tx_source.recent_window())
            .await
            .unwrap_or_default();
        if pending.is_empty() && recent.is_empty() {
            return Ok(());
        }

        let threats = self.detector.detect(&pending, &recent).await;
        let selection = self.selector.select(&threats);
        let (activated, deactivated) = self.selector.reconcile(&selection).await;

        for strategy in &activated {
            let strategy_type = strategy.strategy_type;
            let configuration = strategy.configuration.clone();
            if let Err(e) = with_retry("activate_protection", || {
                self.execution.activate_protection(strategy_type, &configuration)
            })
            .await
            {
                error!("Failed to activate {}: {}", strategy_type, e);
                self.engine
                    .escalate(format!(
                        "ACTION FAILED: activate_protection({}): {} - operator intervention required",
                        strategy_type, e
                    ))
                    .await;
            }
        }
        for strategy_type in deactivated {
            if let Err(e) = with_retry("deactivate_protection", || {
                self.execution.deactivate_protection(strategy_type)
            })
            .await
            {
                error!("Failed to deactivate {}: {}", strategy_type, e);
                self.engine
                    .escalate(format!(
                        "ACTION FAILED: deactivate_protection({}): {} - operator intervention required",
                        strategy_type, e
                    ))
                    .await;
            }
        }

        let threat_count = threats.len() as u64;
        if threat_count > 0 {
            let analysis = self
                .detector
                .analyze(threats, self.selector.active().await);
            if let Err(e) = self.sink.persist(&Report::Mev(analysis)).await {
                error!("MEV report persist failed: {}", e);
                self.engine
                    .escalate(format!(
                        "REPORT PERSIST FAILED (mev analysis): {} - operator intervention required",
                        e
                    ))
                    .await;
                self.stats.write().await.report_failures += 1;
            } else {
                self.stats.write().await.reports_persisted += 1;
            }
        }

        let mut stats = self.stats.write().await;
        stats.detection_cycles += 1;
        stats.threats_detected += threat_count;
        Ok(())
    }

    pub async fn print_stats(&self) {
        let stats = self.stats.read().await;
        info!(
            "📊 Uptime {:?} | metric cycles {} | breaker cycles {} | assessments {} | detections {} | threats {} ({:.1}/min) | reports {} ({} failed)",
            stats.get_uptime(),
            stats.metric_cycles,
            stats.breaker_cycles,
            stats.assessment_cycles,
            stats.detection_cycles,
            stats.threats_detected,
            stats.get_threats_per_minute(),
            stats.reports_persisted,
            stats.report_failures,
        );
    }
}
