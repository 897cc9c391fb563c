//! Metric tracking - named risk/market metrics with rolling history

pub mod metric_store;

pub use metric_store::{Metric, MetricSample, MetricStatus, MetricStore, METRIC_HISTORY_CAP};
