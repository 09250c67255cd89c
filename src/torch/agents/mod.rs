//! Torch-based agents
mod dqn;
mod policy;
pub mod schedules;

pub use dqn::{DqnAgent, DqnConfig};
pub use policy::{PolicyError, QPolicy};
pub use schedules::ExplorationRateSchedule;
