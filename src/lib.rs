//! Riskguard - Risk & MEV Threat Monitoring Engine
//! Built with Domain-Driven Design principles

pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod report;
pub mod shared;

// Re-export main types for convenience
pub use domain::breakers::CircuitBreakerRegistry;
pub use domain::metrics::MetricStore;
pub use domain::protection::ProtectionSelector;
pub use domain::risk::RiskAssessmentEngine;
pub use domain::threat::ThreatDetector;
pub use report::FileReportSink;
