//! Circuit breakers - automatic cutoffs bound to tracked metrics

pub mod registry;

pub use registry::{
    BreakerAction, BreakerEvent, BreakerTransition, CircuitBreaker, CircuitBreakerRegistry,
    Comparator, RecoveryCondition,
};
