//! Risk assessment engine - orchestrates metrics, breakers and portfolio
//! scoring into a single per-cycle verdict

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::breakers::{BreakerAction, BreakerEvent, BreakerTransition, CircuitBreakerRegistry};
use crate::domain::metrics::MetricStore;
use crate::domain::risk::estimators::RiskEstimator;
use crate::domain::risk::position::{PortfolioRisk, PositionRisk, RiskWeights};
use crate::infrastructure::execution::{with_retry, ExecutionControl};
use crate::shared::types::{PortfolioInputs, PositionSnapshot};
use crate::shared::utils::clamp;

/// Severity added to the adjusted score per currently triggered breaker
const BREAKER_SCORE_PENALTY: f64 = 20.0;
/// Severity added per position whose loss estimate is outsized
const POSITION_LOSS_PENALTY: f64 = 5.0;
/// A position is outsized when its loss estimate exceeds this fraction of
/// the daily loss limit
const POSITION_LOSS_FRACTION: f64 = 0.1;

/// Hard limits loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position_size: f64,
    pub max_daily_loss: f64,
    pub max_leverage: f64,
    pub min_liquidity_ratio: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: 50_000.0,
            max_daily_loss: 5_000.0,
            max_leverage: 3.0,
            min_liquidity_ratio: 0.2,
        }
    }
}

/// Warning/critical thresholds for the tracked metrics. For pairs where
/// critical < warning the metric is loss-denominated and breaches downward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricThresholds {
    pub portfolio_value: (f64, f64),
    pub daily_pnl: (f64, f64),
    pub open_positions: (f64, f64),
    pub liquidity_ratio: (f64, f64),
    pub gas_price_gwei: (f64, f64),
    pub network_congestion: (f64, f64),
    pub market_volatility: (f64, f64),
    pub correlation_risk: (f64, f64),
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            portfolio_value: (25_000.0, 10_000.0),
            daily_pnl: (-500.0, -1000.0),
            open_positions: (10.0, 20.0),
            liquidity_ratio: (0.3, 0.2),
            gas_price_gwei: (150.0, 300.0),
            network_congestion: (0.7, 0.9),
            market_volatility: (0.5, 0.8),
            correlation_risk: (0.6, 0.85),
        }
    }
}

/// Overall risk verdict for one assessment cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn classify(adjusted_score: f64) -> Self {
        if adjusted_score >= 80.0 {
            RiskLevel::Critical
        } else if adjusted_score >= 60.0 {
            RiskLevel::High
        } else if adjusted_score >= 40.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Immutable per-cycle output, persisted to the report sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessmentResult {
    pub assessment_id: String,
    pub timestamp: DateTime<Utc>,
    pub risk_level: RiskLevel,
    /// Weighted portfolio score in [0, 100]
    pub overall_risk_score: f64,
    /// Portfolio score plus breaker/position penalties, in [0, 100]
    pub adjusted_score: f64,
    pub positions: Vec<PositionRisk>,
    pub portfolio: PortfolioRisk,
    pub triggered_breakers: Vec<String>,
    pub breaker_events: Vec<BreakerEvent>,
    pub recommendations: Vec<String>,
    pub emergency_actions: Vec<String>,
    /// Set when any external input was missing and a zeroed default was
    /// substituted
    pub partial_data: bool,
    pub emergency_mode: bool,
}

/// Orchestrates one assessment cycle. Steps run strictly in order because
/// later steps read state written by earlier ones.
pub struct RiskAssessmentEngine {
    limits: RiskLimits,
    weights: RiskWeights,
    thresholds: MetricThresholds,
    auto_mitigate: bool,
    metrics: Arc<MetricStore>,
    breakers: Arc<CircuitBreakerRegistry>,
    estimator: Arc<dyn RiskEstimator>,
    execution: Arc<dyn ExecutionControl>,
    emergency_mode: Arc<AtomicBool>,
    /// Operator notes queued between cycles (failed external actions,
    /// persist failures), drained into the next result's recommendations
    pending_escalations: Mutex<Vec<String>>,
}

impl RiskAssessmentEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        limits: RiskLimits,
        weights: RiskWeights,
        thresholds: MetricThresholds,
        auto_mitigate: bool,
        metrics: Arc<MetricStore>,
        breakers: Arc<CircuitBreakerRegistry>,
        estimator: Arc<dyn RiskEstimator>,
        execution: Arc<dyn ExecutionControl>,
        emergency_mode: Arc<AtomicBool>,
    ) -> Self {
        Self {
            limits,
            weights,
            thresholds,
            auto_mitigate,
            metrics,
            breakers,
            estimator,
            execution,
            emergency_mode,
            pending_escalations: Mutex::new(Vec::new()),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency_mode.load(Ordering::SeqCst)
    }

    /// Queue an operator note for the next assessment cycle. The monitoring
    /// loops use this to surface external actions or report persists that
    /// still failed after their retry, so the failure reaches the
    /// recommendations list instead of only the log.
    pub async fn escalate(&self, note: String) {
        self.pending_escalations.lock().await.push(note);
    }

    /// Run one full assessment cycle.
    ///
    /// Never fails: missing inputs are substituted with zeroed defaults and
    /// flagged via `partial_data`, failed external actions are escalated
    /// into the recommendations list.
    pub async fn assess(
        &self,
        positions: Option<Vec<PositionSnapshot>>,
        portfolio_inputs: Option<PortfolioInputs>,
        include_stress_test: bool,
    ) -> RiskAssessmentResult {
        let mut partial_data = false;
        let positions = positions.unwrap_or_else(|| {
            warn!("Position snapshot unavailable, assessing with empty book");
            partial_data = true;
            Vec::new()
        });
        let inputs = portfolio_inputs.unwrap_or_else(|| {
            warn!("Portfolio inputs unavailable, substituting zeroed defaults");
            partial_data = true;
            PortfolioInputs::default()
        });

        let mut recommendations = Vec::new();
        let mut emergency_actions = Vec::new();

        // 1. Refresh all tracked metrics
        self.update_metrics(&positions, &inputs).await;

        // 2. Per-position risk
        let total_exposure: f64 = positions.iter().map(|p| p.size.abs()).sum();
        let position_risks: Vec<PositionRisk> = positions
            .iter()
            .map(|p| PositionRisk::compute(self.estimator.as_ref(), p, total_exposure))
            .collect();

        // 3. Portfolio risk
        let portfolio = PortfolioRisk::compute(
            &position_risks,
            &inputs,
            &self.limits,
            &self.weights,
            include_stress_test,
        );

        // 4. Circuit breakers; every currently triggered breaker raises the
        //    adjusted score
        let breaker_events = self.breakers.evaluate(self.metrics.as_ref()).await;
        self.dispatch_breaker_actions(&breaker_events, &position_risks, &mut emergency_actions)
            .await;
        let triggered_breakers = self.breakers.triggered().await;
        let mut adjusted_score =
            portfolio.overall_risk_score + BREAKER_SCORE_PENALTY * triggered_breakers.len() as f64;

        // 5. Outsized position losses
        let loss_cutoff = POSITION_LOSS_FRACTION * self.limits.max_daily_loss;
        for position in &position_risks {
            if position.max_loss_estimate > loss_cutoff {
                adjusted_score += POSITION_LOSS_PENALTY;
            }
        }
        adjusted_score = clamp(adjusted_score, 0.0, 100.0);

        // 6. Classify
        let risk_level = RiskLevel::classify(adjusted_score);

        // 7. Auto-mitigation at high severity
        if self.auto_mitigate {
            match risk_level {
                RiskLevel::Critical => {
                    self.trigger_emergency_shutdown(&mut emergency_actions).await;
                }
                RiskLevel::High => {
                    self.reduce_top_positions(&position_risks, &mut emergency_actions)
                        .await;
                }
                _ => {}
            }
        }

        // 8. Recommendations, leading with escalations queued by the
        //    monitoring loops since the previous cycle
        recommendations.append(&mut *self.pending_escalations.lock().await);
        self.build_recommendations(
            &inputs,
            &triggered_breakers,
            risk_level,
            &mut recommendations,
        );

        if risk_level >= RiskLevel::High {
            warn!(
                "Risk level {:?} (portfolio {:.1}, adjusted {:.1}, {} breaker(s) triggered)",
                risk_level,
                portfolio.overall_risk_score,
                adjusted_score,
                triggered_breakers.len()
            );
        } else {
            info!(
                "Risk level {:?} (portfolio {:.1}, adjusted {:.1})",
                risk_level, portfolio.overall_risk_score, adjusted_score
            );
        }

        RiskAssessmentResult {
            assessment_id: crate::shared::utils::generate_id(),
            timestamp: Utc::now(),
            risk_level,
            overall_risk_score: portfolio.overall_risk_score,
            adjusted_score,
            positions: position_risks,
            portfolio,
            triggered_breakers,
            breaker_events,
            recommendations,
            emergency_actions,
            partial_data,
            emergency_mode: self.emergency_mode.load(Ordering::SeqCst),
        }
    }

    async fn update_metrics(&self, positions: &[PositionSnapshot], inputs: &PortfolioInputs) {
        let t = &self.thresholds;
        self.metrics
            .update("portfolio_value", inputs.portfolio_value, t.portfolio_value.0, t.portfolio_value.1)
            .await;
        self.metrics
            .update("daily_pnl", inputs.daily_pnl, t.daily_pnl.0, t.daily_pnl.1)
            .await;
        self.metrics
            .update("open_positions", positions.len() as f64, t.open_positions.0, t.open_positions.1)
            .await;
        self.metrics
            .update("liquidity_ratio", inputs.liquidity_ratio, t.liquidity_ratio.0, t.liquidity_ratio.1)
            .await;
        self.metrics
            .update("gas_price_gwei", inputs.gas_price_gwei, t.gas_price_gwei.0, t.gas_price_gwei.1)
            .await;
        self.metrics
            .update("network_congestion", inputs.network_congestion, t.network_congestion.0, t.network_congestion.1)
            .await;
        self.metrics
            .update("market_volatility", inputs.market_volatility, t.market_volatility.0, t.market_volatility.1)
            .await;
        self.metrics
            .update("correlation_risk", inputs.correlation_risk, t.correlation_risk.0, t.correlation_risk.1)
            .await;
    }

    /// Execute the action bound to each freshly triggered breaker
    async fn dispatch_breaker_actions(
        &self,
        events: &[BreakerEvent],
        positions: &[PositionRisk],
        emergency_actions: &mut Vec<String>,
    ) {
        for event in events {
            if event.transition != BreakerTransition::Triggered {
                continue;
            }
            let outcome = match event.action {
                BreakerAction::Pause => {
                    emergency_actions.push(format!("breaker '{}': trading paused", event.breaker));
                    with_retry("pause_trading", || self.execution.pause_trading()).await
                }
                BreakerAction::Reduce => {
                    // Shed the riskiest position first
                    if let Some(worst) = positions.iter().max_by(|a, b| {
                        a.max_loss_estimate.total_cmp(&b.max_loss_estimate)
                    }) {
                        emergency_actions.push(format!(
                            "breaker '{}': reducing position {}",
                            event.breaker, worst.position_id
                        ));
                        let id = worst.position_id.clone();
                        with_retry("reduce_position", || {
                            self.execution.reduce_position(&id, 0.5)
                        })
                        .await
                    } else {
                        Ok(())
                    }
                }
                BreakerAction::Shutdown => {
                    emergency_actions
                        .push(format!("breaker '{}': emergency shutdown", event.breaker));
                    self.trigger_emergency_shutdown(emergency_actions).await;
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                error!("Breaker '{}' action failed: {}", event.breaker, e);
                emergency_actions.push(format!(
                    "ACTION FAILED for breaker '{}': {} - operator intervention required",
                    event.breaker, e
                ));
            }
        }
    }

    /// Fire the venue-side shutdown at most once per emergency episode.
    /// Compare-and-swap on the shared flag keeps concurrent cycles from
    /// double-triggering.
    async fn trigger_emergency_shutdown(&self, emergency_actions: &mut Vec<String>) {
        if self
            .emergency_mode
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            error!("🛑 Critical risk: initiating emergency shutdown");
            emergency_actions.push("emergency_shutdown initiated".to_string());
            if let Err(e) = with_retry("emergency_shutdown", || self.execution.emergency_shutdown()).await
            {
                emergency_actions.push(format!(
                    "ACTION FAILED: emergency_shutdown ({}) - operator intervention required",
                    e
                ));
            }
        }
    }

    /// Halve the three positions with the largest estimated loss
    async fn reduce_top_positions(
        &self,
        positions: &[PositionRisk],
        emergency_actions: &mut Vec<String>,
    ) {
        let mut ranked: Vec<&PositionRisk> = positions.iter().collect();
        ranked.sort_by(|a, b| b.max_loss_estimate.total_cmp(&a.max_loss_estimate));

        for position in ranked.into_iter().take(3) {
            emergency_actions.push(format!("reducing position {} by 50%", position.position_id));
            let id = position.position_id.clone();
            if let Err(e) =
                with_retry("reduce_position", || self.execution.reduce_position(&id, 0.5)).await
            {
                emergency_actions.push(format!(
                    "ACTION FAILED: reduce_position({}) ({}) - operator intervention required",
                    position.position_id, e
                ));
            }
        }
    }

    fn build_recommendations(
        &self,
        inputs: &PortfolioInputs,
        triggered_breakers: &[String],
        risk_level: RiskLevel,
        recommendations: &mut Vec<String>,
    ) {
        if inputs.diversification_score < 0.3 {
            recommendations.push(format!(
                "Low diversification ({:.2}): spread exposure across more pools and pairs",
                inputs.diversification_score
            ));
        }
        if inputs.liquidity_ratio < self.limits.min_liquidity_ratio {
            recommendations.push(format!(
                "Liquidity ratio {:.2} below minimum {:.2}: unwind illiquid positions",
                inputs.liquidity_ratio, self.limits.min_liquidity_ratio
            ));
        }
        if inputs.leverage_ratio > self.limits.max_leverage {
            recommendations.push(format!(
                "Leverage {:.1}x exceeds maximum {:.1}x: deleverage",
                inputs.leverage_ratio, self.limits.max_leverage
            ));
        }
        for breaker in triggered_breakers {
            recommendations.push(format!(
                "Circuit breaker '{}' is triggered: review before resuming",
                breaker
            ));
        }
        if risk_level == RiskLevel::Critical && !self.auto_mitigate {
            recommendations
                .push("Critical risk with auto-mitigation disabled: manual shutdown advised".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::breakers::{
        CircuitBreaker, Comparator, RecoveryCondition,
    };
    use crate::domain::risk::estimators::StaticRiskEstimator;
    use crate::infrastructure::execution::{ActionRecord, RecordingExecutionControl};

    struct Harness {
        engine: RiskAssessmentEngine,
        control: Arc<RecordingExecutionControl>,
        breakers: Arc<CircuitBreakerRegistry>,
    }

    fn harness(auto_mitigate: bool) -> Harness {
        let metrics = Arc::new(MetricStore::new());
        let breakers = Arc::new(CircuitBreakerRegistry::new());
        let control = Arc::new(RecordingExecutionControl::new());
        let execution: Arc<dyn ExecutionControl> = control.clone();
        let engine = RiskAssessmentEngine::new(
            RiskLimits::default(),
            RiskWeights::default(),
            MetricThresholds::default(),
            auto_mitigate,
            metrics,
            Arc::clone(&breakers),
            Arc::new(StaticRiskEstimator::default()),
            execution,
            Arc::new(AtomicBool::new(false)),
        );
        Harness {
            engine,
            control,
            breakers,
        }
    }

    fn healthy_inputs() -> PortfolioInputs {
        PortfolioInputs {
            portfolio_value: 100_000.0,
            daily_pnl: 200.0,
            leverage_ratio: 1.2,
            liquidity_ratio: 0.5,
            diversification_score: 0.8,
            correlation_risk: 0.2,
            gas_price_gwei: 40.0,
            network_congestion: 0.3,
            market_volatility: 0.2,
        }
    }

    fn position(id: &str, size: f64) -> PositionSnapshot {
        PositionSnapshot {
            position_id: id.to_string(),
            asset_pair: "WETH/USDC".to_string(),
            size,
            pnl: 0.0,
        }
    }

    #[tokio::test]
    async fn test_assess_completes_with_all_inputs_missing() {
        let h = harness(true);
        let result = h.engine.assess(None, None, true).await;
        assert!(result.partial_data);
        assert!(result.positions.is_empty());
        assert!(result.overall_risk_score.is_finite());
        assert!(result.adjusted_score >= 0.0 && result.adjusted_score <= 100.0);
    }

    #[tokio::test]
    async fn test_healthy_portfolio_scores_low() {
        let h = harness(true);
        let result = h
            .engine
            .assess(
                Some(vec![position("pos-1", 100.0)]),
                Some(healthy_inputs()),
                false,
            )
            .await;
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.emergency_actions.is_empty());
        assert!(h.control.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_daily_pnl_breach_pauses_trading_exactly_once() {
        let h = harness(false);
        h.breakers
            .register(CircuitBreaker::new(
                "daily_loss",
                "daily_pnl",
                -1000.0,
                Comparator::Le,
                crate::domain::breakers::BreakerAction::Pause,
                RecoveryCondition::new("daily_pnl", Comparator::Gt, -500.0),
            ))
            .await;

        let inputs = PortfolioInputs {
            daily_pnl: -1200.0,
            ..healthy_inputs()
        };
        let result = h.engine.assess(Some(vec![]), Some(inputs.clone()), false).await;

        assert_eq!(result.triggered_breakers, vec!["daily_loss".to_string()]);
        assert_eq!(result.breaker_events.len(), 1);
        let records = h.control.records().await;
        assert_eq!(records, vec![ActionRecord::PauseTrading]);

        // Same data again: breaker stays triggered, no second pause
        h.engine.assess(Some(vec![]), Some(inputs), false).await;
        assert_eq!(h.control.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_triggered_breaker_raises_adjusted_score() {
        let h = harness(false);
        h.breakers
            .register(CircuitBreaker::new(
                "daily_loss",
                "daily_pnl",
                -1000.0,
                Comparator::Le,
                crate::domain::breakers::BreakerAction::Pause,
                RecoveryCondition::new("daily_pnl", Comparator::Gt, -500.0),
            ))
            .await;

        let inputs = PortfolioInputs {
            daily_pnl: -1200.0,
            ..healthy_inputs()
        };
        let result = h.engine.assess(Some(vec![]), Some(inputs), false).await;
        assert!(
            (result.adjusted_score - result.overall_risk_score - 20.0).abs() < 1e-9
        );
    }

    #[tokio::test]
    async fn test_degenerate_portfolio_goes_critical_with_recommendations() {
        let h = harness(true);
        let inputs = PortfolioInputs {
            diversification_score: 0.1,
            correlation_risk: 0.8,
            leverage_ratio: 5.0,
            liquidity_ratio: 0.05,
            ..healthy_inputs()
        };
        let result = h.engine.assess(Some(vec![]), Some(inputs), false).await;

        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert!(result.overall_risk_score >= 80.0);
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.to_lowercase().contains("diversification")));
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.to_lowercase().contains("leverage")));
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.to_lowercase().contains("liquidity")));

        // Auto-mitigation fired the venue-side shutdown
        let records = h.control.records().await;
        assert!(records.contains(&ActionRecord::EmergencyShutdown));
        assert!(result.emergency_mode);
    }

    #[tokio::test]
    async fn test_emergency_shutdown_fires_at_most_once() {
        let h = harness(true);
        let inputs = PortfolioInputs {
            diversification_score: 0.0,
            correlation_risk: 1.0,
            leverage_ratio: 10.0,
            liquidity_ratio: 0.0,
            ..healthy_inputs()
        };
        h.engine.assess(Some(vec![]), Some(inputs.clone()), false).await;
        h.engine.assess(Some(vec![]), Some(inputs), false).await;

        let shutdowns = h
            .control
            .records()
            .await
            .into_iter()
            .filter(|r| *r == ActionRecord::EmergencyShutdown)
            .count();
        assert_eq!(shutdowns, 1);
    }

    #[tokio::test]
    async fn test_high_risk_reduces_top_three_positions() {
        let h = harness(true);
        // Sub-risks: div 0.5, corr 0.6, leverage (4-1)/3 -> 1.0, liquidity
        // (0.2-0.1)/0.2 -> 0.5 => 100*(0.125+0.15+0.3+0.1) = 67.5 (high band)
        let inputs = PortfolioInputs {
            diversification_score: 0.5,
            correlation_risk: 0.6,
            leverage_ratio: 4.0,
            liquidity_ratio: 0.1,
            ..healthy_inputs()
        };
        // Small positions so no outsized-loss penalties push into critical
        let positions = vec![
            position("pos-a", 100.0),
            position("pos-b", 400.0),
            position("pos-c", 200.0),
            position("pos-d", 300.0),
        ];
        let result = h.engine.assess(Some(positions), Some(inputs), false).await;
        assert_eq!(result.risk_level, RiskLevel::High);

        let records = h.control.records().await;
        let reduced: Vec<String> = records
            .iter()
            .filter_map(|r| match r {
                ActionRecord::ReducePosition { position_id, fraction } => {
                    assert_eq!(*fraction, 0.5);
                    Some(position_id.clone())
                }
                _ => None,
            })
            .collect();
        // Top 3 by estimated loss: pos-b, pos-d, pos-c
        assert_eq!(reduced, vec!["pos-b", "pos-d", "pos-c"]);
    }

    #[tokio::test]
    async fn test_queued_escalations_surface_in_next_assessment_only() {
        let h = harness(false);
        h.engine
            .escalate("ACTION FAILED for breaker 'daily_loss': action timed out".to_string())
            .await;

        let result = h
            .engine
            .assess(Some(vec![]), Some(healthy_inputs()), false)
            .await;
        assert!(result
            .recommendations
            .iter()
            .any(|r| r.contains("ACTION FAILED for breaker 'daily_loss'")));

        // Drained: the note must not repeat on the following cycle
        let result = h
            .engine
            .assess(Some(vec![]), Some(healthy_inputs()), false)
            .await;
        assert!(!result
            .recommendations
            .iter()
            .any(|r| r.contains("ACTION FAILED")));
    }

    #[tokio::test]
    async fn test_outsized_positions_add_penalties() {
        let h = harness(false);
        // max_daily_loss 5000 -> cutoff 500; static estimator loss is 8% of
        // size, so a 10k position estimates 800
        let positions = vec![position("pos-big", 10_000.0)];
        let result = h
            .engine
            .assess(Some(positions), Some(healthy_inputs()), false)
            .await;
        assert!((result.adjusted_score - result.overall_risk_score - 5.0).abs() < 1e-9);
    }
}
