//! Reinforcement learning agents
pub mod buffers;
mod random;

pub use buffers::ReplayBuffer;
pub use random::RandomActor;

use crate::envs::Successor;
use crate::logging::StatsLogger;
use crate::Prng;
use serde::{Deserialize, Serialize};

/// Description of an environment step, as seen by a learning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialStep<O, A> {
    /// The initial observation.
    pub observation: O,
    /// The action taken from the initial state given the initial observation.
    pub action: A,
    /// The resulting reward.
    pub reward: f64,
    /// The next observation and whether the episode continues.
    pub next: Successor<O>,
}

impl<O, A> PartialStep<O, A> {
    pub const fn new(observation: O, action: A, reward: f64, next: Successor<O>) -> Self {
        Self {
            observation,
            action,
            reward,
            next,
        }
    }
}

/// Whether an agent acts for training or for evaluation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorMode {
    /// The agent explores.
    Training,
    /// The agent acts as well as it can.
    Evaluation,
}

/// An actor that produces actions given observations.
pub trait Actor<O, A> {
    /// Choose an action in the environment.
    ///
    /// # Args
    /// * `observation` - The current observation of the environment state.
    /// * `rng`         - Random number generator for any stochasticity in the choice.
    fn act(&self, observation: &O, rng: &mut Prng) -> A;
}

impl<T, O, A> Actor<O, A> for &'_ T
where
    T: Actor<O, A> + ?Sized,
{
    fn act(&self, observation: &O, rng: &mut Prng) -> A {
        T::act(self, observation, rng)
    }
}

impl<T, O, A> Actor<O, A> for Box<T>
where
    T: Actor<O, A> + ?Sized,
{
    fn act(&self, observation: &O, rng: &mut Prng) -> A {
        T::act(self, observation, rng)
    }
}

/// A learning agent.
///
/// Acts in an environment and learns from the resulting steps.
pub trait Agent<O, A> {
    /// Choose an action in the environment.
    fn act(&self, observation: &O, mode: ActorMode, rng: &mut Prng) -> A;

    /// Update the agent with the step that resulted from the most recent action.
    fn update(&mut self, step: PartialStep<O, A>, logger: &mut dyn StatsLogger);

    /// Start a new learning run of `num_steps` steps.
    ///
    /// Step-count dependent behaviour such as exploration restarts from zero.
    /// Learned state is kept.
    fn begin_learning(&mut self, _num_steps: u64) {}
}
