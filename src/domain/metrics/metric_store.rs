//! Time-series storage for named risk metrics with threshold classification

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Samples retained per metric (oldest evicted first)
pub const METRIC_HISTORY_CAP: usize = 1000;

/// Threshold classification of a metric value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Normal,
    Warning,
    Critical,
}

/// Single recorded observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Tracked metric with rolling history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub current_value: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub status: MetricStatus,
    pub last_updated: DateTime<Utc>,
    #[serde(skip)]
    pub history: VecDeque<MetricSample>,
}

impl Metric {
    /// Classify a value against its thresholds.
    ///
    /// When `critical < warning` the metric is loss-denominated (lower is
    /// worse, e.g. daily PnL with warning -500 / critical -1000) and the
    /// comparison direction inverts.
    pub fn classify(value: f64, warning: f64, critical: f64) -> MetricStatus {
        if critical < warning {
            if value <= critical {
                MetricStatus::Critical
            } else if value <= warning {
                MetricStatus::Warning
            } else {
                MetricStatus::Normal
            }
        } else if value >= critical {
            MetricStatus::Critical
        } else if value >= warning {
            MetricStatus::Warning
        } else {
            MetricStatus::Normal
        }
    }
}

/// Thread-safe store of named metrics.
///
/// Updates and reads happen concurrently from different monitoring loops,
/// so all state sits behind a single exclusive-write, shared-read lock.
pub struct MetricStore {
    metrics: RwLock<HashMap<String, Metric>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Update a metric, creating it on first observation.
    ///
    /// Status is recomputed as a pure function of the new value and the
    /// supplied thresholds; the previous status is never consulted.
    pub async fn update(
        &self,
        name: &str,
        value: f64,
        warning_threshold: f64,
        critical_threshold: f64,
    ) -> Metric {
        let now = Utc::now();
        let status = Metric::classify(value, warning_threshold, critical_threshold);

        let mut metrics = self.metrics.write().await;
        let metric = metrics.entry(name.to_string()).or_insert_with(|| Metric {
            name: name.to_string(),
            current_value: value,
            warning_threshold,
            critical_threshold,
            status,
            last_updated: now,
            history: VecDeque::with_capacity(METRIC_HISTORY_CAP),
        });

        metric.current_value = value;
        metric.warning_threshold = warning_threshold;
        metric.critical_threshold = critical_threshold;
        metric.status = status;
        metric.last_updated = now;
        if metric.history.len() >= METRIC_HISTORY_CAP {
            metric.history.pop_front();
        }
        metric.history.push_back(MetricSample {
            value,
            recorded_at: now,
        });

        metric.clone()
    }

    pub async fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.read().await.get(name).cloned()
    }

    /// Current value of a metric, if tracked
    pub async fn value(&self, name: &str) -> Option<f64> {
        self.metrics.read().await.get(name).map(|m| m.current_value)
    }

    /// Snapshot of all tracked metrics
    pub async fn snapshot(&self) -> HashMap<String, Metric> {
        self.metrics.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.metrics.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.metrics.read().await.is_empty()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_creates_metric_on_first_observation() {
        let store = MetricStore::new();
        assert!(store.get("gas_price_gwei").await.is_none());

        let metric = store.update("gas_price_gwei", 42.0, 150.0, 300.0).await;
        assert_eq!(metric.current_value, 42.0);
        assert_eq!(metric.status, MetricStatus::Normal);
        assert_eq!(metric.history.len(), 1);
        assert!(store.get("gas_price_gwei").await.is_some());
    }

    #[tokio::test]
    async fn test_status_recomputed_every_update() {
        let store = MetricStore::new();
        store.update("market_volatility", 0.2, 0.5, 0.8).await;

        let metric = store.update("market_volatility", 0.6, 0.5, 0.8).await;
        assert_eq!(metric.status, MetricStatus::Warning);

        let metric = store.update("market_volatility", 0.9, 0.5, 0.8).await;
        assert_eq!(metric.status, MetricStatus::Critical);

        let metric = store.update("market_volatility", 0.1, 0.5, 0.8).await;
        assert_eq!(metric.status, MetricStatus::Normal);
    }

    #[test]
    fn test_status_monotone_in_value() {
        // For fixed thresholds, increasing value never decreases severity
        let mut last = MetricStatus::Normal;
        for i in 0..200 {
            let value = i as f64;
            let status = Metric::classify(value, 100.0, 150.0);
            assert!(status >= last, "severity dropped at value {}", value);
            last = status;
        }
    }

    #[test]
    fn test_loss_metric_classifies_downward() {
        // daily_pnl: warning -500, critical -1000
        assert_eq!(Metric::classify(-100.0, -500.0, -1000.0), MetricStatus::Normal);
        assert_eq!(Metric::classify(-600.0, -500.0, -1000.0), MetricStatus::Warning);
        assert_eq!(Metric::classify(-1200.0, -500.0, -1000.0), MetricStatus::Critical);
    }

    #[tokio::test]
    async fn test_history_capped_fifo() {
        let store = MetricStore::new();
        for i in 0..(METRIC_HISTORY_CAP + 10) {
            store.update("portfolio_value", i as f64, 1e9, 2e9).await;
        }
        let metric = store.get("portfolio_value").await.unwrap();
        assert_eq!(metric.history.len(), METRIC_HISTORY_CAP);
        // Oldest samples were evicted first
        assert_eq!(metric.history.front().unwrap().value, 10.0);
        assert_eq!(
            metric.history.back().unwrap().value,
            (METRIC_HISTORY_CAP + 9) as f64
        );
    }
}
