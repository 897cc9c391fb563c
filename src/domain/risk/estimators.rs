//! Pluggable risk estimators.
//!
//! The engine only depends on the [`RiskEstimator`] trait so a real
//! statistical model can be substituted without touching the assessment
//! flow. [`StaticRiskEstimator`] ships placeholder fractions and must not
//! be treated as production-correct.

use crate::shared::types::PositionSnapshot;

/// Per-position risk model seam
pub trait RiskEstimator: Send + Sync {
    /// Value at Risk at the given confidence level, in position units
    fn value_at_risk(&self, position: &PositionSnapshot, confidence: f64) -> f64;

    /// Expected shortfall beyond the VaR cutoff
    fn expected_shortfall(&self, position: &PositionSnapshot, confidence: f64) -> f64;

    /// How easily the position unwinds, in [0, 1] (1 = fully liquid)
    fn liquidity_score(&self, position: &PositionSnapshot) -> f64;

    /// Share of total exposure concentrated in this position, in [0, 1]
    fn concentration_score(&self, position: &PositionSnapshot, total_exposure: f64) -> f64;

    /// Worst plausible loss for the position, in position units
    fn max_loss_estimate(&self, position: &PositionSnapshot) -> f64;
}

/// Placeholder estimator: fixed fractions of position size.
///
/// Stands in until a calibrated VaR/ES model is available; tests against
/// it exercise the engine, not the estimates.
pub struct StaticRiskEstimator {
    pub var_fraction: f64,
    pub shortfall_fraction: f64,
    pub default_liquidity: f64,
}

impl Default for StaticRiskEstimator {
    fn default() -> Self {
        Self {
            var_fraction: 0.05,
            shortfall_fraction: 0.08,
            default_liquidity: 0.7,
        }
    }
}

impl RiskEstimator for StaticRiskEstimator {
    fn value_at_risk(&self, position: &PositionSnapshot, _confidence: f64) -> f64 {
        position.size.abs() * self.var_fraction
    }

    fn expected_shortfall(&self, position: &PositionSnapshot, _confidence: f64) -> f64 {
        position.size.abs() * self.shortfall_fraction
    }

    fn liquidity_score(&self, _position: &PositionSnapshot) -> f64 {
        self.default_liquidity
    }

    fn concentration_score(&self, position: &PositionSnapshot, total_exposure: f64) -> f64 {
        if total_exposure > 0.0 {
            (position.size.abs() / total_exposure).min(1.0)
        } else {
            0.0
        }
    }

    fn max_loss_estimate(&self, position: &PositionSnapshot) -> f64 {
        // Worst case proxied by the shortfall estimate net of current pnl
        self.expected_shortfall(position, 0.95) - position.pnl.min(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(size: f64, pnl: f64) -> PositionSnapshot {
        PositionSnapshot {
            position_id: "pos-1".to_string(),
            asset_pair: "WETH/USDC".to_string(),
            size,
            pnl,
        }
    }

    #[test]
    fn test_static_estimator_scales_with_size() {
        let estimator = StaticRiskEstimator::default();
        let small = position(1_000.0, 0.0);
        let large = position(10_000.0, 0.0);
        assert!(
            estimator.value_at_risk(&large, 0.95) > estimator.value_at_risk(&small, 0.95)
        );
        assert_eq!(estimator.value_at_risk(&small, 0.95), 50.0);
    }

    #[test]
    fn test_concentration_bounded() {
        let estimator = StaticRiskEstimator::default();
        let pos = position(50_000.0, 0.0);
        assert_eq!(estimator.concentration_score(&pos, 25_000.0), 1.0);
        assert_eq!(estimator.concentration_score(&pos, 0.0), 0.0);
        assert_eq!(estimator.concentration_score(&pos, 100_000.0), 0.5);
    }

    #[test]
    fn test_max_loss_includes_unrealized_loss() {
        let estimator = StaticRiskEstimator::default();
        let flat = position(10_000.0, 0.0);
        let losing = position(10_000.0, -500.0);
        assert_eq!(
            estimator.max_loss_estimate(&losing),
            estimator.max_loss_estimate(&flat) + 500.0
        );
    }
}
