//! Named circuit breakers bound to metrics, with ARMED -> TRIGGERED -> ARMED
//! state transitions evaluated against the metric store

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::metrics::MetricStore;
use crate::shared::errors::BreakerError;

/// Mitigation action bound to a breaker, executed by the external venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerAction {
    Pause,
    Reduce,
    Shutdown,
}

impl BreakerAction {
    pub fn parse(s: &str) -> Result<Self, BreakerError> {
        match s.trim().to_lowercase().as_str() {
            "pause" => Ok(BreakerAction::Pause),
            "reduce" => Ok(BreakerAction::Reduce),
            "shutdown" => Ok(BreakerAction::Shutdown),
            other => Err(BreakerError::InvalidAction(other.to_string())),
        }
    }
}

/// Comparison operator used in trigger and recovery predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparator {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparator::Gt => lhs > rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Le => lhs <= rhs,
        }
    }

    pub fn parse(s: &str) -> Result<Self, BreakerError> {
        match s.trim() {
            ">" | "gt" => Ok(Comparator::Gt),
            ">=" | "ge" => Ok(Comparator::Ge),
            "<" | "lt" => Ok(Comparator::Lt),
            "<=" | "le" => Ok(Comparator::Le),
            other => Err(BreakerError::InvalidRecovery(format!(
                "unknown comparator '{}'",
                other
            ))),
        }
    }
}

/// Structured recovery predicate over current metric values.
///
/// The legacy free-text form ("daily_pnl > -500") is parsed once at config
/// load via [`RecoveryCondition::parse`] and never interpreted at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryCondition {
    pub metric: String,
    pub comparator: Comparator,
    pub threshold: f64,
}

impl RecoveryCondition {
    pub fn new(metric: impl Into<String>, comparator: Comparator, threshold: f64) -> Self {
        Self {
            metric: metric.into(),
            comparator,
            threshold,
        }
    }

    /// Parse the deprecated free-text form: `<metric> <op> <threshold>`
    pub fn parse(text: &str) -> Result<Self, BreakerError> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(BreakerError::InvalidRecovery(format!(
                "expected '<metric> <op> <threshold>', got '{}'",
                text
            )));
        }
        let comparator = Comparator::parse(parts[1])?;
        let threshold: f64 = parts[2]
            .parse()
            .map_err(|_| BreakerError::InvalidRecovery(format!("bad threshold in '{}'", text)))?;
        Ok(Self {
            metric: parts[0].to_string(),
            comparator,
            threshold,
        })
    }

    pub fn holds(&self, value: f64) -> bool {
        self.comparator.holds(value, self.threshold)
    }
}

/// Circuit breaker bound to a metric.
///
/// `triggered == false` is the ARMED state. Statically configured at
/// startup; state mutated only by the monitoring loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub name: String,
    pub metric_name: String,
    pub threshold: f64,
    /// Trigger predicate direction; `Ge` for higher-is-worse metrics,
    /// `Le` for loss-denominated ones
    pub trigger_when: Comparator,
    pub action: BreakerAction,
    pub enabled: bool,
    pub triggered: bool,
    pub trigger_time: Option<DateTime<Utc>>,
    pub recovery: RecoveryCondition,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        metric_name: impl Into<String>,
        threshold: f64,
        trigger_when: Comparator,
        action: BreakerAction,
        recovery: RecoveryCondition,
    ) -> Self {
        Self {
            name: name.into(),
            metric_name: metric_name.into(),
            threshold,
            trigger_when,
            action,
            enabled: true,
            triggered: false,
            trigger_time: None,
            recovery,
        }
    }
}

/// Breaker state transition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerTransition {
    Triggered,
    Recovered,
}

/// Emitted for every breaker state change during an evaluation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerEvent {
    pub breaker: String,
    pub transition: BreakerTransition,
    pub action: BreakerAction,
    pub metric_value: f64,
    pub at: DateTime<Utc>,
}

/// Registry of named breakers sharing one exclusive-write lock.
///
/// Breakers are independent; multiple may be triggered in the same pass.
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, breaker: CircuitBreaker) {
        info!(
            "Registered circuit breaker '{}' on metric '{}' (threshold {}, action {:?})",
            breaker.name, breaker.metric_name, breaker.threshold, breaker.action
        );
        self.breakers
            .write()
            .await
            .insert(breaker.name.clone(), breaker);
    }

    /// Evaluate all breakers against current metric state.
    ///
    /// ARMED breakers whose trigger predicate holds transition to TRIGGERED
    /// exactly once; TRIGGERED breakers whose recovery predicate holds
    /// transition back to ARMED. A breaker whose bound metric is absent is
    /// skipped, never an error. Action dispatch is left to the caller so the
    /// registry stays free of external side effects.
    pub async fn evaluate(&self, metrics: &MetricStore) -> Vec<BreakerEvent> {
        let mut events = Vec::new();
        let now = Utc::now();
        let mut breakers = self.breakers.write().await;

        for breaker in breakers.values_mut() {
            if !breaker.enabled {
                continue;
            }

            let Some(value) = metrics.value(&breaker.metric_name).await else {
                warn!(
                    "Breaker '{}' skipped: metric '{}' not tracked",
                    breaker.name, breaker.metric_name
                );
                continue;
            };

            if !breaker.triggered {
                if breaker.trigger_when.holds(value, breaker.threshold) {
                    breaker.triggered = true;
                    breaker.trigger_time = Some(now);
                    warn!(
                        "🚨 Circuit breaker '{}' TRIGGERED: {} = {} breached threshold {}",
                        breaker.name, breaker.metric_name, value, breaker.threshold
                    );
                    events.push(BreakerEvent {
                        breaker: breaker.name.clone(),
                        transition: BreakerTransition::Triggered,
                        action: breaker.action,
                        metric_value: value,
                        at: now,
                    });
                }
            } else {
                let recovery_value = if breaker.recovery.metric == breaker.metric_name {
                    Some(value)
                } else {
                    metrics.value(&breaker.recovery.metric).await
                };
                if let Some(rv) = recovery_value {
                    if breaker.recovery.holds(rv) {
                        breaker.triggered = false;
                        breaker.trigger_time = None;
                        info!(
                            "✅ Circuit breaker '{}' recovered: {} = {}",
                            breaker.name, breaker.recovery.metric, rv
                        );
                        events.push(BreakerEvent {
                            breaker: breaker.name.clone(),
                            transition: BreakerTransition::Recovered,
                            action: breaker.action,
                            metric_value: rv,
                            at: now,
                        });
                    }
                }
            }
        }

        events
    }

    /// Names of currently triggered breakers
    pub async fn triggered(&self) -> Vec<String> {
        self.breakers
            .read()
            .await
            .values()
            .filter(|b| b.triggered)
            .map(|b| b.name.clone())
            .collect()
    }

    pub async fn triggered_count(&self) -> usize {
        self.breakers
            .read()
            .await
            .values()
            .filter(|b| b.triggered)
            .count()
    }

    pub async fn snapshot(&self) -> Vec<CircuitBreaker> {
        self.breakers.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.breakers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.breakers.read().await.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pnl_breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "daily_loss",
            "daily_pnl",
            -1000.0,
            Comparator::Le,
            BreakerAction::Pause,
            RecoveryCondition::new("daily_pnl", Comparator::Gt, -500.0),
        )
    }

    #[tokio::test]
    async fn test_breaker_triggers_exactly_once() {
        let metrics = MetricStore::new();
        let registry = CircuitBreakerRegistry::new();
        registry.register(pnl_breaker()).await;

        metrics.update("daily_pnl", -1200.0, -500.0, -1000.0).await;

        let events = registry.evaluate(&metrics).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, BreakerTransition::Triggered);
        assert_eq!(events[0].action, BreakerAction::Pause);

        // Re-evaluating on the same data must not re-trigger
        let events = registry.evaluate(&metrics).await;
        assert!(events.is_empty());
        assert_eq!(registry.triggered_count().await, 1);
    }

    #[tokio::test]
    async fn test_breaker_recovery_round_trip() {
        let metrics = MetricStore::new();
        let registry = CircuitBreakerRegistry::new();
        registry.register(pnl_breaker()).await;

        metrics.update("daily_pnl", -1500.0, -500.0, -1000.0).await;
        let events = registry.evaluate(&metrics).await;
        assert_eq!(events.len(), 1);

        metrics.update("daily_pnl", -200.0, -500.0, -1000.0).await;
        let events = registry.evaluate(&metrics).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, BreakerTransition::Recovered);

        // Same data point must not re-trigger
        let events = registry.evaluate(&metrics).await;
        assert!(events.is_empty());
        assert_eq!(registry.triggered_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_metric_is_skipped() {
        let metrics = MetricStore::new();
        let registry = CircuitBreakerRegistry::new();
        registry.register(pnl_breaker()).await;

        let events = registry.evaluate(&metrics).await;
        assert!(events.is_empty());
        assert_eq!(registry.triggered_count().await, 0);
    }

    #[tokio::test]
    async fn test_independent_breakers_trigger_together() {
        let metrics = MetricStore::new();
        let registry = CircuitBreakerRegistry::new();
        registry.register(pnl_breaker()).await;
        registry
            .register(CircuitBreaker::new(
                "gas_spike",
                "gas_price_gwei",
                300.0,
                Comparator::Ge,
                BreakerAction::Reduce,
                RecoveryCondition::new("gas_price_gwei", Comparator::Lt, 150.0),
            ))
            .await;

        metrics.update("daily_pnl", -2000.0, -500.0, -1000.0).await;
        metrics.update("gas_price_gwei", 450.0, 150.0, 300.0).await;

        let events = registry.evaluate(&metrics).await;
        assert_eq!(events.len(), 2);
        assert_eq!(registry.triggered_count().await, 2);
    }

    #[test]
    fn test_recovery_condition_parse_legacy_form() {
        let cond = RecoveryCondition::parse("daily_pnl > -500").unwrap();
        assert_eq!(cond.metric, "daily_pnl");
        assert_eq!(cond.comparator, Comparator::Gt);
        assert_eq!(cond.threshold, -500.0);
        assert!(cond.holds(-100.0));
        assert!(!cond.holds(-600.0));
    }

    #[test]
    fn test_recovery_condition_parse_rejects_garbage() {
        assert!(RecoveryCondition::parse("daily_pnl >").is_err());
        assert!(RecoveryCondition::parse("daily_pnl ?? -500").is_err());
        assert!(RecoveryCondition::parse("daily_pnl > not_a_number").is_err());
    }
}
