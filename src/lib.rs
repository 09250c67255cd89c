//! Deep Q-learning for a simulated highway-driving task.
//!
//! The crate provides a kinematic highway environment, a DQN agent built on `tch`,
//! a top-down renderer, and the training and evaluation routines used by the
//! `train` and `evaluate` binaries.
#![warn(clippy::cast_lossless)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::use_self)]
pub mod agents;
pub mod envs;
mod error;
pub mod logging;
pub mod render;
pub mod simulation;
pub mod spaces;
pub mod torch;
pub mod utils;

pub use agents::{Actor, ActorMode, Agent};
pub use envs::{EnvStructure, EnvWithState, Environment, Successor};
pub use error::HighwayError;
pub use simulation::{run_evaluation, run_training, EvaluationConfig, TrainingConfig};

/// Pseudo-random number generator used throughout the crate.
pub type Prng = rand_chacha::ChaCha8Rng;
