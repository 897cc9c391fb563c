//! Error handling for the application

use thiserror::Error;

/// Circuit-breaker configuration errors
#[derive(Error, Debug, Clone)]
pub enum BreakerError {
    #[error("Invalid recovery condition: {0}")]
    InvalidRecovery(String),

    #[error("Invalid breaker action: {0}")]
    InvalidAction(String),
}

/// External feed errors
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("Feed unavailable: {0}")]
    Unavailable(String),

    #[error("Feed data stale: {0}")]
    Stale(String),

    #[error("Feed request timed out after {0}s")]
    Timeout(u64),
}

/// Execution-control errors (mitigation actions delegated to the venue)
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Action timed out")]
    Timeout,

    #[error("Execution venue rejected request: {0}")]
    Rejected(String),
}

/// Report persistence errors
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Feed error: {0}")]
    FeedError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Report error: {0}")]
    ReportError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<BreakerError> for AppError {
    fn from(err: BreakerError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        AppError::FeedError(err.to_string())
    }
}

impl From<ExecutionError> for AppError {
    fn from(err: ExecutionError) -> Self {
        AppError::ExecutionError(err.to_string())
    }
}

impl From<ReportError> for AppError {
    fn from(err: ReportError) -> Self {
        AppError::ReportError(err.to_string())
    }
}
