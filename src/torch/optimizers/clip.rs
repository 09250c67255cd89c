use super::{Optimizer, OptimizerStepError};
use crate::logging::StatsLogger;
use tch::Tensor;

/// Rescale the gradients of `variables` so that their joint L2 norm is at most `max_norm`.
///
/// Variables without a gradient are ignored.
/// Returns the joint gradient norm before rescaling.
pub fn clip_grad_norm(variables: &[Tensor], max_norm: f64) -> f64 {
    tch::no_grad(|| {
        let grads: Vec<Tensor> = variables
            .iter()
            .map(Tensor::grad)
            .filter(Tensor::defined)
            .collect();
        let total_norm = grads
            .iter()
            .map(|g| g.norm().double_value(&[]).powi(2))
            .sum::<f64>()
            .sqrt();
        let scale = max_norm / (total_norm + 1e-6);
        if scale < 1.0 {
            for mut grad in grads {
                grad *= scale;
            }
        }
        total_norm
    })
}

/// Wraps an optimizer and clips the gradient norm before each step.
#[derive(Debug)]
pub struct GradClipped<O> {
    optimizer: O,
    variables: Vec<Tensor>,
    max_norm: Option<f64>,
}

impl<O> GradClipped<O> {
    /// Wrap `optimizer`, which optimizes `variables`.
    ///
    /// Gradients are not clipped if `max_norm` is `None`.
    pub fn new(optimizer: O, variables: Vec<Tensor>, max_norm: Option<f64>) -> Self {
        Self {
            optimizer,
            variables,
            max_norm,
        }
    }
}

impl<O: Optimizer> Optimizer for GradClipped<O> {
    fn zero_grad(&mut self) -> Result<(), OptimizerStepError> {
        self.optimizer.zero_grad()
    }

    fn step(&mut self, logger: &mut dyn StatsLogger) -> Result<(), OptimizerStepError> {
        if let Some(max_norm) = self.max_norm {
            let norm = clip_grad_norm(&self.variables, max_norm);
            logger.log_scalar("grad_norm", norm);
        }
        self.optimizer.step(logger)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{testing, AdamConfig, BuildOptimizer};
    use super::*;
    use tch::{nn::VarStore, Device, Kind};

    #[test]
    fn clips_large_gradient() {
        let vs = VarStore::new(Device::Cpu);
        let x = vs.root().zeros("x", &[2]);
        let loss = (&x * Tensor::of_slice(&[30.0_f32, 40.0])).sum(Kind::Float);
        loss.backward();
        let norm = clip_grad_norm(&vs.trainable_variables(), 10.0);
        assert!((norm - 50.0).abs() < 1e-4);
        let clipped = x.grad().norm().double_value(&[]);
        assert!((clipped - 10.0).abs() < 1e-3, "{}", clipped);
    }

    #[test]
    fn small_gradient_unchanged() {
        let vs = VarStore::new(Device::Cpu);
        let x = vs.root().zeros("x", &[2]);
        let loss = (&x * Tensor::of_slice(&[3.0_f32, 4.0])).sum(Kind::Float);
        loss.backward();
        let norm = clip_grad_norm(&vs.trainable_variables(), 10.0);
        assert!((norm - 5.0).abs() < 1e-5);
        assert!((x.grad().norm().double_value(&[]) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn clipped_adam_optimizes_quadratic() {
        let config = AdamConfig {
            learning_rate: 5e-2,
            ..AdamConfig::default()
        };
        let build = |vs: &VarStore| {
            let optimizer = config.build_optimizer(vs).unwrap();
            GradClipped::new(optimizer, vs.trainable_variables(), Some(1.0))
        };
        testing::check_optimizes_quadratic(build, 2000);
    }
}
