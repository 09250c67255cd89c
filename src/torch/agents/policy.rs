//! Greedy policy derived from an action-value network.
use crate::agents::Actor;
use crate::spaces::{FeatureSpace, FiniteSpace};
use crate::torch::modules::{Mlp, MlpConfig};
use crate::torch::serialize::{TensorDef, TensorDefError};
use crate::Prng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tch::nn::{Module, VarStore};
use tch::{Device, TchError, Tensor};
use thiserror::Error;

/// Error saving or loading a [`QPolicy`].
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("policy file i/o error")]
    Io(#[from] io::Error),
    #[error("policy file encoding error")]
    Cbor(#[from] serde_cbor::Error),
    #[error("invalid tensor data")]
    Tensor(#[from] TensorDefError),
    #[error("policy has no variable named {0:?}")]
    MissingVariable(String),
    #[error("variable {name:?} has shape {actual:?} but the network expects {expected:?}")]
    Shape {
        name: String,
        expected: Vec<i64>,
        actual: Vec<i64>,
    },
    #[error(transparent)]
    Tch(#[from] TchError),
}

/// Deterministic policy that selects the action with the greatest estimated value.
///
/// This is the artifact produced by training.
/// It holds the observation and action spaces, the network configuration
/// and the network weights, and can be saved to and loaded from a single CBOR file.
pub struct QPolicy<OS, AS> {
    observation_space: OS,
    action_space: AS,
    network_config: MlpConfig,
    vs: VarStore,
    network: Mlp,
}

impl<OS: fmt::Debug, AS: fmt::Debug> fmt::Debug for QPolicy<OS, AS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("QPolicy")
            .field("observation_space", &self.observation_space)
            .field("action_space", &self.action_space)
            .field("network_config", &self.network_config)
            .field("device", &self.vs.device())
            .finish()
    }
}

/// On-disk form of a [`QPolicy`].
#[derive(Serialize, Deserialize)]
struct PolicyRecord<'a, OS, AS> {
    observation_space: OS,
    action_space: AS,
    network: MlpConfig,
    #[serde(borrow)]
    variables: BTreeMap<String, TensorDef<'a>>,
}

impl<OS, AS> QPolicy<OS, AS>
where
    OS: FeatureSpace,
    AS: FiniteSpace,
{
    /// Create a policy with a freshly initialized network.
    pub fn new(
        observation_space: OS,
        action_space: AS,
        network_config: MlpConfig,
        device: Device,
    ) -> Self {
        let vs = VarStore::new(device);
        let network = network_config.build_module(
            &vs.root(),
            observation_space.num_features(),
            action_space.size(),
        );
        Self {
            observation_space,
            action_space,
            network_config,
            vs,
            network,
        }
    }

    /// Create a policy whose network weights are copied from `variables`.
    pub fn from_variables(
        observation_space: OS,
        action_space: AS,
        network_config: MlpConfig,
        variables: &HashMap<String, Tensor>,
        device: Device,
    ) -> Result<Self, PolicyError> {
        let policy = Self::new(observation_space, action_space, network_config, device);
        copy_variables(&policy.vs, variables)?;
        Ok(policy)
    }

    pub const fn observation_space(&self) -> &OS {
        &self.observation_space
    }

    pub const fn action_space(&self) -> &AS {
        &self.action_space
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    /// Estimated value of each action given an observation.
    pub fn action_values(&self, observation: &OS::Element) -> Tensor {
        action_values(
            &self.network,
            &self.observation_space.features(observation),
            self.vs.device(),
        )
    }

    /// The action with the greatest estimated value.
    pub fn greedy_action(&self, observation: &OS::Element) -> AS::Element {
        let index = greedy_index(&self.action_values(observation));
        self.action_space
            .from_index(index)
            .expect("greedy action index is within the action space")
    }
}

impl<OS, AS> QPolicy<OS, AS>
where
    OS: FeatureSpace + Serialize,
    AS: FiniteSpace + Serialize,
{
    /// Save the policy to a CBOR file at `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PolicyError> {
        let variables = self
            .vs
            .variables()
            .into_iter()
            .map(|(name, tensor)| (name, TensorDef::from(&tensor)))
            .collect();
        let record = PolicyRecord {
            observation_space: &self.observation_space,
            action_space: &self.action_space,
            network: self.network_config.clone(),
            variables,
        };
        let mut writer = BufWriter::new(File::create(path)?);
        serde_cbor::to_writer(&mut writer, &record)?;
        writer.flush()?;
        Ok(())
    }
}

impl<OS, AS> QPolicy<OS, AS>
where
    OS: FeatureSpace + DeserializeOwned,
    AS: FiniteSpace + DeserializeOwned,
{
    /// Load a policy saved by [`QPolicy::save`], placing the network on `device`.
    pub fn load<P: AsRef<Path>>(path: P, device: Device) -> Result<Self, PolicyError> {
        let bytes = fs::read(path)?;
        let record: PolicyRecord<OS, AS> = serde_cbor::from_slice(&bytes)?;
        let variables = record
            .variables
            .iter()
            .map(|(name, def)| Ok((name.clone(), Tensor::try_from(def)?)))
            .collect::<Result<HashMap<_, _>, TensorDefError>>()?;
        Self::from_variables(
            record.observation_space,
            record.action_space,
            record.network,
            &variables,
            device,
        )
    }
}

impl<OS, AS> Actor<OS::Element, AS::Element> for QPolicy<OS, AS>
where
    OS: FeatureSpace,
    AS: FiniteSpace,
{
    fn act(&self, observation: &OS::Element, _: &mut Prng) -> AS::Element {
        self.greedy_action(observation)
    }
}

/// Evaluate `network` on a single feature vector.
pub(super) fn action_values(network: &Mlp, features: &[f32], device: Device) -> Tensor {
    let _no_grad = tch::no_grad_guard();
    network.forward(&Tensor::of_slice(features).to_device(device))
}

/// Index of the largest entry of a one-dimensional tensor.
pub(super) fn greedy_index(action_values: &Tensor) -> usize {
    let index: i64 = action_values.argmax(None, false).into();
    usize::try_from(index).unwrap_or_default()
}

/// Copy `src` into the variables of `dst` with the same names.
///
/// Every variable of `dst` must be present in `src` with the same shape.
pub(super) fn copy_variables(
    dst: &VarStore,
    src: &HashMap<String, Tensor>,
) -> Result<(), PolicyError> {
    tch::no_grad(|| {
        for (name, mut variable) in dst.variables() {
            let value = src
                .get(&name)
                .ok_or_else(|| PolicyError::MissingVariable(name.clone()))?;
            if value.size() != variable.size() {
                return Err(PolicyError::Shape {
                    name,
                    expected: variable.size(),
                    actual: value.size(),
                });
            }
            variable.f_copy_(value)?;
        }
        Ok(())
    })
}
