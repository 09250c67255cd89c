//! Torch components
pub mod agents;
pub mod modules;
pub mod optimizers;
pub mod serialize;

pub use modules::{Activation, Mlp, MlpConfig};
pub use optimizers::{AdamConfig, Optimizer};
