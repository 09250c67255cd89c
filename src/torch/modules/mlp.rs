//! Fully connected action-value network
use serde::{Deserialize, Serialize};
use tch::nn::{self, Linear, Module, Path};
use tch::Tensor;

/// Hidden layer activation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Relu
    }
}

impl Activation {
    pub fn apply(self, input: &Tensor) -> Tensor {
        match self {
            Self::Relu => input.relu(),
            Self::Tanh => input.tanh(),
            Self::Sigmoid => input.sigmoid(),
        }
    }
}

/// Configuration of an [`Mlp`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpConfig {
    pub hidden_sizes: Vec<usize>,
    pub activation: Activation,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![256, 256],
            activation: Activation::Relu,
        }
    }
}

impl MlpConfig {
    /// Build an [`Mlp`] mapping `in_dim` features to `out_dim` outputs with variables under `vs`.
    pub fn build_module(&self, vs: &Path, in_dim: usize, out_dim: usize) -> Mlp {
        let mut hidden = Vec::with_capacity(self.hidden_sizes.len());
        let mut prev = in_dim;
        for (i, &size) in self.hidden_sizes.iter().enumerate() {
            hidden.push(linear(&(vs / format!("hidden{}", i)), prev, size));
            prev = size;
        }
        Mlp {
            hidden,
            output: linear(&(vs / "output"), prev, out_dim),
            activation: self.activation,
        }
    }
}

fn linear(vs: &Path, in_dim: usize, out_dim: usize) -> Linear {
    nn::linear(vs, in_dim as i64, out_dim as i64, Default::default())
}

/// Multi-layer perceptron with a linear output layer.
#[derive(Debug)]
pub struct Mlp {
    hidden: Vec<Linear>,
    output: Linear,
    activation: Activation,
}

impl Module for Mlp {
    fn forward(&self, input: &Tensor) -> Tensor {
        let features = self.hidden.iter().fold(input.shallow_clone(), |x, layer| {
            self.activation.apply(&layer.forward(&x))
        });
        self.output.forward(&features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tch::{nn::OptimizerConfig, Device, Kind, Reduction};

    #[fixture]
    fn q_network() -> (nn::VarStore, Mlp) {
        let vs = nn::VarStore::new(Device::Cpu);
        let module = MlpConfig::default().build_module(&vs.root(), 25, 5);
        (vs, module)
    }

    #[rstest]
    fn batch_and_single_shapes(q_network: (nn::VarStore, Mlp)) {
        let (_vs, mlp) = q_network;
        let batch = Tensor::ones(&[4, 25], (Kind::Float, Device::Cpu));
        assert_eq!(mlp.forward(&batch).size(), vec![4, 5]);
        let single = Tensor::ones(&[25], (Kind::Float, Device::Cpu));
        assert_eq!(mlp.forward(&single).size(), vec![5]);
    }

    #[rstest]
    fn variable_names(q_network: (nn::VarStore, Mlp)) {
        let (vs, _mlp) = q_network;
        let variables = vs.variables();
        assert_eq!(variables.len(), 6);
        for name in ["hidden0.weight", "hidden1.bias", "output.weight"] {
            assert!(variables.contains_key(name), "missing {}", name);
        }
        assert_eq!(variables["output.weight"].size(), vec![5, 256]);
    }

    #[test]
    fn no_hidden_layers_is_linear() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = MlpConfig {
            hidden_sizes: vec![],
            ..MlpConfig::default()
        };
        let mlp = config.build_module(&vs.root(), 3, 2);
        assert_eq!(vs.variables().len(), 2);
        let zeros = Tensor::zeros(&[3], (Kind::Float, Device::Cpu));
        let variables = vs.variables();
        assert_eq!(mlp.forward(&zeros), variables["output.bias"]);
    }

    #[rstest]
    #[case(Activation::Relu)]
    #[case(Activation::Tanh)]
    #[case(Activation::Sigmoid)]
    fn fits_targets(#[case] activation: Activation) {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = MlpConfig {
            hidden_sizes: vec![16],
            activation,
        };
        let mlp = config.build_module(&vs.root(), 2, 2);
        let mut opt = nn::Adam::default().build(&vs, 1e-2).unwrap();
        let input = Tensor::of_slice(&[0.5_f32, -0.5, 1.0, 0.0]).reshape(&[2, 2]);
        let target = Tensor::of_slice(&[1.0_f32, -1.0, 0.5, 0.0]).reshape(&[2, 2]);
        for _ in 0..500 {
            let loss = mlp.forward(&input).mse_loss(&target, Reduction::Mean);
            opt.backward_step(&loss);
        }
        let loss = mlp.forward(&input).mse_loss(&target, Reduction::Mean);
        assert!(loss.double_value(&[]) < 1e-2);
    }

    #[test]
    fn config_from_json() {
        let config: MlpConfig = serde_json::from_str(r#"{"hidden_sizes": [64]}"#).unwrap();
        assert_eq!(config.hidden_sizes, vec![64]);
        assert_eq!(config.activation, Activation::Relu);
    }
}
