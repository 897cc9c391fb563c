//! Risk assessment - position/portfolio scoring and the assessment engine

pub mod engine;
pub mod estimators;
pub mod position;

pub use engine::{
    MetricThresholds, RiskAssessmentEngine, RiskAssessmentResult, RiskLevel, RiskLimits,
};
pub use estimators::{RiskEstimator, StaticRiskEstimator};
pub use position::{PortfolioRisk, PositionRisk, RiskWeights};
