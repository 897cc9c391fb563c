//! Position and portfolio risk records, recomputed every assessment cycle

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::risk::engine::RiskLimits;
use crate::domain::risk::estimators::RiskEstimator;
use crate::shared::types::{PortfolioInputs, PositionSnapshot};
use crate::shared::utils::clamp;

/// Derived per-position risk. Not persisted as mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRisk {
    pub position_id: String,
    pub asset_pair: String,
    pub size: f64,
    pub max_loss_estimate: f64,
    pub current_pnl: f64,
    pub var_95: f64,
    pub expected_shortfall: f64,
    pub liquidity_score: f64,
    pub concentration_score: f64,
}

impl PositionRisk {
    pub fn compute(
        estimator: &dyn RiskEstimator,
        snapshot: &PositionSnapshot,
        total_exposure: f64,
    ) -> Self {
        Self {
            position_id: snapshot.position_id.clone(),
            asset_pair: snapshot.asset_pair.clone(),
            size: snapshot.size,
            max_loss_estimate: estimator.max_loss_estimate(snapshot),
            current_pnl: snapshot.pnl,
            var_95: estimator.value_at_risk(snapshot, 0.95),
            expected_shortfall: estimator.expected_shortfall(snapshot, 0.95),
            liquidity_score: estimator.liquidity_score(snapshot),
            concentration_score: estimator.concentration_score(snapshot, total_exposure),
        }
    }
}

/// Weights of the portfolio sub-risk scores
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskWeights {
    pub diversification: f64,
    pub correlation: f64,
    pub leverage: f64,
    pub liquidity: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            diversification: 0.25,
            correlation: 0.25,
            leverage: 0.3,
            liquidity: 0.2,
        }
    }
}

/// Stress scenarios applied as fixed fractions of total exposure
const STRESS_SCENARIOS: [(&str, f64); 4] = [
    ("market_crash_30pct", -0.30),
    ("liquidity_crunch", -0.15),
    ("depeg_event", -0.20),
    ("gas_spike", -0.05),
];

/// Portfolio-level risk, recomputed every assessment cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRisk {
    pub total_exposure: f64,
    pub diversification_score: f64,
    pub correlation_risk: f64,
    pub leverage_ratio: f64,
    pub liquidity_ratio: f64,
    pub stress_test_results: HashMap<String, f64>,
    /// Weighted deficiency score in [0, 100]
    pub overall_risk_score: f64,
}

impl PortfolioRisk {
    pub fn compute(
        positions: &[PositionRisk],
        inputs: &PortfolioInputs,
        limits: &RiskLimits,
        weights: &RiskWeights,
        include_stress_test: bool,
    ) -> Self {
        let total_exposure: f64 = positions.iter().map(|p| p.size.abs()).sum();

        // Each sub-risk is a normalized deficiency in [0, 1]
        let diversification_risk = clamp(1.0 - inputs.diversification_score, 0.0, 1.0);
        let correlation_risk = clamp(inputs.correlation_risk, 0.0, 1.0);
        let leverage_risk = if limits.max_leverage > 0.0 {
            clamp((inputs.leverage_ratio - 1.0) / limits.max_leverage, 0.0, 1.0)
        } else {
            0.0
        };
        let liquidity_risk = if limits.min_liquidity_ratio > 0.0 {
            clamp(
                (limits.min_liquidity_ratio - inputs.liquidity_ratio)
                    / limits.min_liquidity_ratio,
                0.0,
                1.0,
            )
        } else {
            0.0
        };

        let overall_risk_score = clamp(
            100.0
                * (weights.diversification * diversification_risk
                    + weights.correlation * correlation_risk
                    + weights.leverage * leverage_risk
                    + weights.liquidity * liquidity_risk),
            0.0,
            100.0,
        );

        let stress_test_results = if include_stress_test {
            STRESS_SCENARIOS
                .iter()
                .map(|(scenario, impact)| (scenario.to_string(), total_exposure * impact))
                .collect()
        } else {
            HashMap::new()
        };

        Self {
            total_exposure,
            diversification_score: inputs.diversification_score,
            correlation_risk: inputs.correlation_risk,
            leverage_ratio: inputs.leverage_ratio,
            liquidity_ratio: inputs.liquidity_ratio,
            stress_test_results,
            overall_risk_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::risk::estimators::StaticRiskEstimator;

    fn limits() -> RiskLimits {
        RiskLimits::default()
    }

    fn inputs(div: f64, corr: f64, lev: f64, liq: f64) -> PortfolioInputs {
        PortfolioInputs {
            diversification_score: div,
            correlation_risk: corr,
            leverage_ratio: lev,
            liquidity_ratio: liq,
            ..Default::default()
        }
    }

    #[test]
    fn test_overall_score_bounded() {
        let weights = RiskWeights::default();
        // Absurd inputs must still land in [0, 100]
        let worst = PortfolioRisk::compute(
            &[],
            &inputs(-5.0, 50.0, 1000.0, -3.0),
            &limits(),
            &weights,
            false,
        );
        assert!(worst.overall_risk_score <= 100.0);
        assert!(worst.overall_risk_score >= 0.0);

        let best = PortfolioRisk::compute(
            &[],
            &inputs(1.0, 0.0, 1.0, 1.0),
            &limits(),
            &weights,
            false,
        );
        assert_eq!(best.overall_risk_score, 0.0);
    }

    #[test]
    fn test_degenerate_portfolio_scores_critical_band() {
        // diversification 0.1, correlation 0.8, leverage 5.0 (max 3.0),
        // liquidity 0.05 (min 0.2) -> 87.5
        let weights = RiskWeights::default();
        let risk = PortfolioRisk::compute(
            &[],
            &inputs(0.1, 0.8, 5.0, 0.05),
            &limits(),
            &weights,
            false,
        );
        assert!((risk.overall_risk_score - 87.5).abs() < 1e-9);
        assert!(risk.overall_risk_score >= 80.0);
    }

    #[test]
    fn test_stress_results_scale_with_exposure() {
        let estimator = StaticRiskEstimator::default();
        let snapshot = crate::shared::types::PositionSnapshot {
            position_id: "pos-1".to_string(),
            asset_pair: "WETH/USDC".to_string(),
            size: 10_000.0,
            pnl: 0.0,
        };
        let positions = vec![PositionRisk::compute(&estimator, &snapshot, 10_000.0)];
        let weights = RiskWeights::default();

        let risk = PortfolioRisk::compute(
            &positions,
            &inputs(0.5, 0.5, 1.0, 0.5),
            &limits(),
            &weights,
            true,
        );
        assert_eq!(risk.stress_test_results.len(), 4);
        assert_eq!(risk.stress_test_results["market_crash_30pct"], -3_000.0);
        assert_eq!(risk.stress_test_results["gas_spike"], -500.0);
    }

    #[test]
    fn test_stress_skipped_when_disabled() {
        let weights = RiskWeights::default();
        let risk = PortfolioRisk::compute(
            &[],
            &inputs(0.5, 0.5, 1.0, 0.5),
            &limits(),
            &weights,
            false,
        );
        assert!(risk.stress_test_results.is_empty());
    }
}
