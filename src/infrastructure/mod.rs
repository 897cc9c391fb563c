//! Infrastructure layer - external collaborator seams

pub mod execution;
pub mod feeds;

pub use execution::{ExecutionControl, LoggingExecutionControl, RecordingExecutionControl};
pub use feeds::{PendingTxSource, PositionLedger, PriceFeed, SimulatedFeed};
