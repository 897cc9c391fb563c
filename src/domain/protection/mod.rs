//! Protection strategies - mitigations mapped to detected threats

pub mod selector;

pub use selector::{ProtectionSelector, ProtectionStrategy, SelectorConfig, StrategyType};
