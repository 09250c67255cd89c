//! Adam optimizer backed by the libtorch C++ implementation.
use super::{BuildOptimizer, Optimizer, OptimizerStepError};
use crate::logging::StatsLogger;
use serde::{Deserialize, Serialize};
use tch::{nn::VarStore, COptimizer, TchError};

impl Optimizer for COptimizer {
    fn zero_grad(&mut self) -> Result<(), OptimizerStepError> {
        Self::zero_grad(self)?;
        Ok(())
    }

    fn step(&mut self, _: &mut dyn StatsLogger) -> Result<(), OptimizerStepError> {
        Self::step(self)?;
        Ok(())
    }
}

/// Configuration for the Adam optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub learning_rate: f64,
    /// Decay rate of the gradient running average
    pub beta1: f64,
    /// Decay rate of the squared gradient running average
    pub beta2: f64,
    /// L2 penalty
    pub weight_decay: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 5e-4,
            beta1: 0.9,
            beta2: 0.999,
            weight_decay: 0.0,
        }
    }
}

impl BuildOptimizer for AdamConfig {
    type Optimizer = COptimizer;

    fn build_optimizer(&self, vs: &VarStore) -> Result<COptimizer, TchError> {
        let mut optimizer =
            COptimizer::adam(self.learning_rate, self.beta1, self.beta2, self.weight_decay)?;
        let variables = vs
            .variables_
            .lock()
            .map_err(|err| TchError::Torch(err.to_string()))?;
        for var in &variables.trainable_variables {
            optimizer.add_parameters(&var.tensor, var.group)?;
        }
        Ok(optimizer)
    }
}
