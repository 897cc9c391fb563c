//! Execution-control collaborator - mitigation actions delegated to the
//! trading venue

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::protection::StrategyType;
use crate::shared::errors::ExecutionError;

/// Outbound mitigation actions. The engine never performs these itself;
/// implementations bridge to the actual trading/submission stack.
#[async_trait]
pub trait ExecutionControl: Send + Sync {
    async fn pause_trading(&self) -> Result<(), ExecutionError>;

    async fn reduce_position(&self, position_id: &str, fraction: f64)
        -> Result<(), ExecutionError>;

    async fn emergency_shutdown(&self) -> Result<(), ExecutionError>;

    async fn activate_protection(
        &self,
        strategy: StrategyType,
        configuration: &HashMap<String, String>,
    ) -> Result<(), ExecutionError>;

    async fn deactivate_protection(&self, strategy: StrategyType) -> Result<(), ExecutionError>;
}

/// Retry an external action once with backoff. Still-failing actions are
/// surfaced to the caller for escalation into the recommendations list.
pub async fn with_retry<F, Fut>(label: &str, action: F) -> Result<(), ExecutionError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<(), ExecutionError>>,
{
    match action().await {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!("Action '{}' failed ({}), retrying once", label, first);
            tokio::time::sleep(Duration::from_millis(500)).await;
            match action().await {
                Ok(()) => Ok(()),
                Err(second) => {
                    error!("Action '{}' failed after retry: {}", label, second);
                    Err(second)
                }
            }
        }
    }
}

/// Stand-in venue that logs every action. Used when no real execution
/// stack is wired in (dry runs, local development).
pub struct LoggingExecutionControl;

#[async_trait]
impl ExecutionControl for LoggingExecutionControl {
    async fn pause_trading(&self) -> Result<(), ExecutionError> {
        warn!("⏸️  pause_trading() requested");
        Ok(())
    }

    async fn reduce_position(
        &self,
        position_id: &str,
        fraction: f64,
    ) -> Result<(), ExecutionError> {
        warn!(
            "📉 reduce_position({}, {:.0}%) requested",
            position_id,
            fraction * 100.0
        );
        Ok(())
    }

    async fn emergency_shutdown(&self) -> Result<(), ExecutionError> {
        error!("🛑 emergency_shutdown() requested");
        Ok(())
    }

    async fn activate_protection(
        &self,
        strategy: StrategyType,
        configuration: &HashMap<String, String>,
    ) -> Result<(), ExecutionError> {
        info!("🛡️  activate_protection({}) {:?}", strategy, configuration);
        Ok(())
    }

    async fn deactivate_protection(&self, strategy: StrategyType) -> Result<(), ExecutionError> {
        info!("deactivate_protection({})", strategy);
        Ok(())
    }
}

/// Recorded outbound action, for dry runs and assertions
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRecord {
    PauseTrading,
    ReducePosition { position_id: String, fraction: f64 },
    EmergencyShutdown,
    ActivateProtection(StrategyType),
    DeactivateProtection(StrategyType),
}

/// Venue that records every action instead of executing it
pub struct RecordingExecutionControl {
    records: Mutex<Vec<ActionRecord>>,
}

impl RecordingExecutionControl {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub async fn records(&self) -> Vec<ActionRecord> {
        self.records.lock().await.clone()
    }
}

impl Default for RecordingExecutionControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionControl for RecordingExecutionControl {
    async fn pause_trading(&self) -> Result<(), ExecutionError> {
        self.records.lock().await.push(ActionRecord::PauseTrading);
        Ok(())
    }

    async fn reduce_position(
        &self,
        position_id: &str,
        fraction: f64,
    ) -> Result<(), ExecutionError> {
        self.records.lock().await.push(ActionRecord::ReducePosition {
            position_id: position_id.to_string(),
            fraction,
        });
        Ok(())
    }

    async fn emergency_shutdown(&self) -> Result<(), ExecutionError> {
        self.records
            .lock()
            .await
            .push(ActionRecord::EmergencyShutdown);
        Ok(())
    }

    async fn activate_protection(
        &self,
        strategy: StrategyType,
        _configuration: &HashMap<String, String>,
    ) -> Result<(), ExecutionError> {
        self.records
            .lock()
            .await
            .push(ActionRecord::ActivateProtection(strategy));
        Ok(())
    }

    async fn deactivate_protection(&self, strategy: StrategyType) -> Result<(), ExecutionError> {
        self.records
            .lock()
            .await
            .push(ActionRecord::DeactivateProtection(strategy));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_with_retry_recovers_on_second_attempt() {
        let attempts = AtomicUsize::new(0);
        let result = with_retry("flaky", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ExecutionError::Timeout)
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_two_attempts() {
        let attempts = AtomicUsize::new(0);
        let result = with_retry("dead", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ExecutionError::Timeout) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_recording_control_captures_actions() {
        let control = RecordingExecutionControl::new();
        control.pause_trading().await.unwrap();
        control.reduce_position("pos-1", 0.5).await.unwrap();

        let records = control.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], ActionRecord::PauseTrading);
    }
}
