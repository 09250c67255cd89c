use super::policy::{self, PolicyError, QPolicy};
use super::schedules::ExplorationRateSchedule;
use crate::agents::buffers::ReplayBuffer;
use crate::agents::{ActorMode, Agent, PartialStep};
use crate::envs::EnvStructure;
use crate::logging::StatsLogger;
use crate::spaces::{FeatureSpace, FiniteSpace, SampleSpace};
use crate::torch::modules::{Mlp, MlpConfig};
use crate::torch::optimizers::{
    AdamConfig, BuildOptimizer, GradClipped, Optimizer, OptimizerStepError,
};
use crate::torch::serialize::DeviceDef;
use crate::Prng;
use log::warn;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tch::nn::{Module, VarStore};
use tch::{COptimizer, Device, Reduction, TchError, Tensor};

/// Configuration for [`DqnAgent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    pub network: MlpConfig,
    pub optimizer: AdamConfig,

    /// Maximum number of steps stored in the replay buffer.
    pub buffer_capacity: usize,
    /// Number of collected steps before any learning.
    ///
    /// Actions are uniformly random until then.
    pub learning_starts: u64,
    /// Number of steps sampled from the replay buffer per gradient step.
    pub batch_size: usize,
    pub discount_factor: f64,
    /// Train every this many collected steps.
    pub train_frequency: u64,
    /// Gradient steps per training round.
    pub gradient_steps: usize,
    /// Copy the network weights into the target network every this many collected steps.
    pub target_update_interval: u64,

    /// Fraction of the total training steps over which the exploration rate is annealed.
    pub exploration_fraction: f64,
    pub exploration_initial_eps: f64,
    pub exploration_final_eps: f64,

    /// Clip the gradient L2 norm to this value.
    pub max_grad_norm: Option<f64>,

    #[serde(with = "DeviceDef")]
    pub device: Device,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            network: MlpConfig::default(),
            optimizer: AdamConfig {
                learning_rate: 5e-4,
                ..AdamConfig::default()
            },
            buffer_capacity: 30_000,
            learning_starts: 1_000,
            batch_size: 64,
            discount_factor: 0.99,
            train_frequency: 1,
            gradient_steps: 1,
            target_update_interval: 500,
            exploration_fraction: 0.15,
            exploration_initial_eps: 1.0,
            exploration_final_eps: 0.05,
            max_grad_norm: Some(10.0),
            device: Device::Cpu,
        }
    }
}

impl DqnConfig {
    /// Exploration schedule for a training run of `total_steps` steps.
    #[must_use]
    pub fn exploration_schedule(&self, total_steps: u64) -> ExplorationRateSchedule {
        ExplorationRateSchedule::annealed_over_fraction(
            self.exploration_initial_eps,
            self.exploration_final_eps,
            self.exploration_fraction,
            total_steps,
        )
    }
}

/// Deep Q-Learning Agent
///
/// Based on
/// "[Playing Atari with Deep Reinforcement Learning][dqn]"
/// by Volodymyr Mnih et al. (2013)
/// with a separate target network updated by periodic copies
/// and a Huber loss on the one-step temporal difference error.
///
/// [dqn]: https://arxiv.org/pdf/1312.5602.pdf
pub struct DqnAgent<OS: FeatureSpace, AS: FiniteSpace> {
    observation_space: OS,
    action_space: AS,
    network_config: MlpConfig,

    vs: VarStore,
    action_value_fn: Mlp,
    target_vs: VarStore,
    target_action_value_fn: Mlp,
    optimizer: GradClipped<COptimizer>,

    buffer: ReplayBuffer<OS::Element, AS::Element>,
    exploration_rate: ExplorationRateSchedule,
    exploration_initial_eps: f64,
    exploration_final_eps: f64,
    exploration_fraction: f64,
    learning_starts: u64,
    batch_size: usize,
    discount_factor: f64,
    train_frequency: u64,
    gradient_steps: usize,
    target_update_interval: u64,

    /// Number of steps collected in the current learning run.
    num_timesteps: u64,
    /// Number of steps collected over all learning runs.
    total_steps: u64,
    device: Device,

    /// Prng for sampling batches in updates.
    rng: Prng,
}

impl<OS, AS> fmt::Debug for DqnAgent<OS, AS>
where
    OS: FeatureSpace + fmt::Debug,
    AS: FiniteSpace + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DqnAgent")
            .field("observation_space", &self.observation_space)
            .field("action_space", &self.action_space)
            .field("network_config", &self.network_config)
            .field("exploration_rate", &self.exploration_rate)
            .field("buffer_len", &self.buffer.len())
            .field("num_timesteps", &self.num_timesteps)
            .field("total_steps", &self.total_steps)
            .field("device", &self.device)
            .finish()
    }
}

impl<OS, AS> DqnAgent<OS, AS>
where
    OS: FeatureSpace,
    AS: FiniteSpace,
{
    /// Create a new agent for an environment.
    ///
    /// # Args
    /// * `env` - The environment structure.
    /// * `config` - Agent hyper-parameters.
    /// * `total_steps` - Number of training steps planned; sets the exploration schedule.
    ///     Replaced by the next [`Agent::begin_learning`].
    /// * `rng` - Generator for sampling replay batches.
    ///
    /// Network weights are initialized from the global torch generator;
    /// call [`tch::manual_seed`] beforehand for a reproducible initialization.
    pub fn new<E>(
        env: &E,
        config: &DqnConfig,
        total_steps: u64,
        rng: Prng,
    ) -> Result<Self, TchError>
    where
        E: EnvStructure<ObservationSpace = OS, ActionSpace = AS> + ?Sized,
    {
        let observation_space = env.observation_space();
        let action_space = env.action_space();
        let num_features = observation_space.num_features();
        let num_actions = action_space.size();

        let vs = VarStore::new(config.device);
        let action_value_fn = config
            .network
            .build_module(&vs.root(), num_features, num_actions);
        let target_vs = VarStore::new(config.device);
        let target_action_value_fn = config
            .network
            .build_module(&target_vs.root(), num_features, num_actions);

        let optimizer = GradClipped::new(
            config.optimizer.build_optimizer(&vs)?,
            vs.trainable_variables(),
            config.max_grad_norm,
        );

        let mut agent = Self {
            observation_space,
            action_space,
            network_config: config.network.clone(),
            vs,
            action_value_fn,
            target_vs,
            target_action_value_fn,
            optimizer,
            buffer: ReplayBuffer::with_capacity(config.buffer_capacity.max(1)),
            exploration_rate: config.exploration_schedule(total_steps),
            exploration_initial_eps: config.exploration_initial_eps,
            exploration_final_eps: config.exploration_final_eps,
            exploration_fraction: config.exploration_fraction,
            learning_starts: config.learning_starts,
            batch_size: config.batch_size,
            discount_factor: config.discount_factor,
            train_frequency: config.train_frequency.max(1),
            gradient_steps: config.gradient_steps,
            target_update_interval: config.target_update_interval.max(1),
            num_timesteps: 0,
            total_steps: 0,
            device: config.device,
            rng,
        };
        agent.sync_target()?;
        Ok(agent)
    }

    /// Number of steps the agent has been updated with in the current learning run.
    pub const fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }

    /// Number of steps the agent has been updated with over all learning runs.
    pub const fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Replay buffer of collected steps.
    pub const fn buffer(&self) -> &ReplayBuffer<OS::Element, AS::Element> {
        &self.buffer
    }

    /// Current training exploration rate.
    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
            .exploration_rate(self.num_timesteps, ActorMode::Training)
    }

    /// Snapshot of the current greedy policy.
    pub fn policy(&self) -> Result<QPolicy<OS, AS>, PolicyError>
    where
        OS: Clone,
        AS: Clone,
    {
        QPolicy::from_variables(
            self.observation_space.clone(),
            self.action_space.clone(),
            self.network_config.clone(),
            &self.vs.variables(),
            self.device,
        )
    }

    /// Estimated action values given an observation.
    pub fn action_values(&self, observation: &OS::Element) -> Tensor {
        policy::action_values(
            &self.action_value_fn,
            &self.observation_space.features(observation),
            self.device,
        )
    }

    fn greedy_action(&self, observation: &OS::Element) -> AS::Element {
        let index = policy::greedy_index(&self.action_values(observation));
        self.action_space
            .from_index(index)
            .expect("greedy action index is within the action space")
    }

    /// Copy the action value network weights into the target network.
    fn sync_target(&mut self) -> Result<(), TchError> {
        self.target_vs.copy(&self.vs)
    }

    /// Batch of observation features as a `[batch_size, num_features]` tensor.
    fn observation_batch<'a, I>(&self, observations: I, batch_size: usize) -> Tensor
    where
        I: IntoIterator<Item = &'a OS::Element>,
        OS::Element: 'a,
    {
        Tensor::of_slice(&self.observation_space.batch_features(observations))
            .reshape(&[batch_size as i64, self.observation_space.num_features() as i64])
            .to_device(self.device)
    }

    /// One gradient step on a batch sampled from the replay buffer.
    ///
    /// Returns the loss value.
    fn train_step(&mut self, logger: &mut dyn StatsLogger) -> Result<f64, OptimizerStepError> {
        let batch = self.buffer.sample(self.batch_size, &mut self.rng);
        let n = batch.len();

        let observations = self.observation_batch(batch.iter().map(|step| &step.observation), n);
        let next_observations =
            self.observation_batch(batch.iter().map(|step| step.next.inner()), n);
        let actions: Vec<i64> = batch
            .iter()
            .map(|step| self.action_space.to_index(&step.action) as i64)
            .collect();
        let actions = Tensor::of_slice(&actions).to_device(self.device).unsqueeze(-1);
        let rewards: Vec<f32> = batch.iter().map(|step| step.reward as f32).collect();
        let rewards = Tensor::of_slice(&rewards).to_device(self.device);
        // Interrupted episodes bootstrap from the next state; only terminal states have no future
        let continues: Vec<f32> = batch
            .iter()
            .map(|step| if step.next.is_terminal() { 0.0 } else { 1.0 })
            .collect();
        let continues = Tensor::of_slice(&continues).to_device(self.device);

        let targets = tch::no_grad(|| {
            let next_values = self
                .target_action_value_fn
                .forward(&next_observations)
                .amax(&[-1], false);
            rewards + continues * next_values * self.discount_factor
        });

        let action_value_fn = &self.action_value_fn;
        let loss_fn = || {
            action_value_fn
                .forward(&observations)
                .gather(-1, &actions, false)
                .squeeze_dim(-1)
                .smooth_l1_loss(&targets, Reduction::Mean, 1.0)
        };
        let loss = self.optimizer.backward_step(&loss_fn, logger)?;
        Ok(loss.double_value(&[]))
    }
}

impl<OS, AS> Agent<OS::Element, AS::Element> for DqnAgent<OS, AS>
where
    OS: FeatureSpace,
    AS: FiniteSpace + SampleSpace,
{
    fn act(&self, observation: &OS::Element, mode: ActorMode, rng: &mut Prng) -> AS::Element {
        if mode == ActorMode::Training {
            let exploration_rate = self
                .exploration_rate
                .exploration_rate(self.num_timesteps, mode)
                .clamp(0.0, 1.0);
            if self.num_timesteps < self.learning_starts || rng.gen_bool(exploration_rate) {
                return self.action_space.sample(rng);
            }
        }
        self.greedy_action(observation)
    }

    fn update(
        &mut self,
        step: PartialStep<OS::Element, AS::Element>,
        logger: &mut dyn StatsLogger,
    ) {
        self.buffer.push(step);
        self.num_timesteps += 1;
        self.total_steps += 1;

        if self.num_timesteps > self.learning_starts
            && self.num_timesteps % self.train_frequency == 0
        {
            for _ in 0..self.gradient_steps {
                match self.train_step(logger) {
                    Ok(loss) => logger.log_scalar("loss", loss),
                    Err(err) => warn!("error in action value update: {}", err),
                }
            }
        }

        if self.total_steps % self.target_update_interval == 0 {
            if let Err(err) = self.sync_target() {
                warn!("error updating target network: {}", err);
            }
        }

        logger.log_scalar("exploration_rate", self.exploration_rate());
    }

    /// Restart the step count, the warm-up period and the exploration schedule.
    ///
    /// The networks and the replay buffer are kept.
    fn begin_learning(&mut self, num_steps: u64) {
        self.num_timesteps = 0;
        self.exploration_rate = ExplorationRateSchedule::annealed_over_fraction(
            self.exploration_initial_eps,
            self.exploration_final_eps,
            self.exploration_fraction,
            num_steps,
        );
    }
}
