//! Domain layer - core business logic and entities

pub mod breakers;
pub mod metrics;
pub mod protection;
pub mod risk;
pub mod threat;
