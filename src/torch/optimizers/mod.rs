//! Gradient-based optimizers
mod clip;
mod coptimizer;

pub use clip::{clip_grad_norm, GradClipped};
pub use coptimizer::AdamConfig;

use crate::logging::StatsLogger;
use tch::{nn::VarStore, TchError, Tensor};
use thiserror::Error;

/// Error performing an optimization step.
#[derive(Debug, Error)]
pub enum OptimizerStepError {
    #[error("loss is NaN")]
    NaNLoss,
    #[error(transparent)]
    Torch(#[from] TchError),
}

/// Optimizer that updates parameters from their accumulated gradients.
pub trait Optimizer {
    fn zero_grad(&mut self) -> Result<(), OptimizerStepError>;

    /// Update the parameters using the gradients currently stored with them.
    fn step(&mut self, logger: &mut dyn StatsLogger) -> Result<(), OptimizerStepError>;

    /// Evaluate `loss_fn`, backpropagate it and take one step.
    ///
    /// Returns the loss before the step.
    /// A NaN loss leaves the parameters unchanged and is an error.
    fn backward_step(
        &mut self,
        loss_fn: &dyn Fn() -> Tensor,
        logger: &mut dyn StatsLogger,
    ) -> Result<Tensor, OptimizerStepError> {
        let loss = loss_fn();
        if loss.double_value(&[]).is_nan() {
            return Err(OptimizerStepError::NaNLoss);
        }
        self.zero_grad()?;
        loss.backward();
        self.step(logger)?;
        Ok(loss)
    }
}

/// Build an optimizer over the trainable variables of a [`VarStore`].
pub trait BuildOptimizer {
    type Optimizer;

    fn build_optimizer(&self, vs: &VarStore) -> Result<Self::Optimizer, TchError>;
}

#[cfg(test)]
mod testing {
    use super::*;
    use tch::Device;

    /// Check that the optimizer finds the minimum of a convex quadratic.
    pub fn check_optimizes_quadratic<O, F>(build_optimizer: F, num_steps: u64)
    where
        O: Optimizer,
        F: FnOnce(&VarStore) -> O,
    {
        // f(x) = 1/2 x'Mx + b'x with M = [[2, 1], [1, 2]] and b = [-3, 0]
        // has its minimum at x = [2, -1]
        let m = Tensor::of_slice(&[2.0_f32, 1.0, 1.0, 2.0]).reshape(&[2, 2]);
        let b = Tensor::of_slice(&[-3.0_f32, 0.0]);

        let vs = VarStore::new(Device::Cpu);
        let x = vs.root().f_zeros("x", &[2]).unwrap();
        let mut optimizer = build_optimizer(&vs);
        let loss_fn = || m.mv(&x).dot(&x) / 2 + b.dot(&x);
        for _ in 0..num_steps {
            optimizer.backward_step(&loss_fn, &mut ()).unwrap();
        }

        let expected = Tensor::of_slice(&[2.0_f32, -1.0]);
        let error = (&x - &expected).norm().double_value(&[]);
        assert!(error < 1e-3, "expected: {:?}, actual: {:?}", expected, x);
    }
}
