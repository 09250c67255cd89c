//! Reinforcement learning environments
pub mod highway;
mod stateful;

pub use highway::{HighwayConfig, HighwayEnv, MetaAction};
pub use stateful::{EnvWithState, StepOutcome};

use crate::logging::StatsLogger;
use crate::spaces::Space;
use crate::Prng;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The external structure of a reinforcement learning environment.
pub trait EnvStructure {
    type ObservationSpace: Space;
    type ActionSpace: Space;

    /// Space containing all possible observations.
    ///
    /// This is not required to be tight:
    /// the space may contain elements that can never be produced as a state observation.
    fn observation_space(&self) -> Self::ObservationSpace;

    /// The space of all possible actions.
    ///
    /// Every element in this space must be a valid action.
    fn action_space(&self) -> Self::ActionSpace;

    /// A lower and upper bound on possible reward values.
    ///
    /// These bounds are not required to be tight but ideally will be as tight as possible.
    fn reward_range(&self) -> (f64, f64);
}

/// A reinforcement learning environment.
///
/// This defines the environment dynamics.
/// It does not internally manage state; see [`EnvWithState`] for that.
pub trait Environment {
    /// Environment state type. Not necessarily observable by the agent.
    type State;
    /// Observation of the state provided to the agent.
    type Observation;
    /// Action selected by the agent.
    type Action;

    /// Sample a new initial state.
    fn initial_state(&self, rng: &mut Prng) -> Self::State;

    /// Generate an observation for a given state.
    fn observe(&self, state: &Self::State, rng: &mut Prng) -> Self::Observation;

    /// Perform a state transition in reponse to an action.
    ///
    /// # Args
    /// * `state`  - The initial state.
    /// * `action` - The action to take at this state.
    /// * `rng`    - Random number generator for any stochasticity in the transition.
    /// * `logger` - Logger for any auxiliary information.
    ///
    /// # Returns
    /// * `successor` - The resulting state and whether the episode continues.
    /// * `reward` - The reward value for this transition.
    fn step(
        &self,
        state: Self::State,
        action: &Self::Action,
        rng: &mut Prng,
        logger: &mut dyn StatsLogger,
    ) -> (Successor<Self::State>, f64);
}

/// An environment that can draw its state as an image.
pub trait Render: Environment {
    /// Draw the given state.
    fn render(&self, state: &Self::State) -> RgbImage;
}

/// Whether an environment produces frames.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMode {
    /// No frames are produced.
    None,
    /// Frames are produced as RGB images.
    RgbArray,
}

impl Default for RenderMode {
    fn default() -> Self {
        Self::None
    }
}

/// The successor state of an environment step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Successor<S> {
    /// The episode continues from the given state.
    Continue(S),
    /// The episode ends in the given terminal state.
    ///
    /// All future rewards from a terminal state are zero.
    Terminate(S),
    /// The episode is cut off at the given non-terminal state.
    ///
    /// The agent may bootstrap future rewards from this state.
    Interrupt(S),
}

impl<S> Successor<S> {
    /// Whether this successor ends the episode.
    #[inline]
    pub const fn episode_done(&self) -> bool {
        !matches!(self, Self::Continue(_))
    }

    /// Whether the successor state is terminal.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminate(_))
    }

    /// Reference to the successor state.
    #[inline]
    pub const fn inner(&self) -> &S {
        match self {
            Self::Continue(s) | Self::Terminate(s) | Self::Interrupt(s) => s,
        }
    }

    /// Unwrap into the successor state.
    #[inline]
    pub fn into_inner(self) -> S {
        match self {
            Self::Continue(s) | Self::Terminate(s) | Self::Interrupt(s) => s,
        }
    }

    /// Apply a transformation to the successor state.
    #[inline]
    pub fn map<T, F: FnOnce(S) -> T>(self, f: F) -> Successor<T> {
        match self {
            Self::Continue(s) => Successor::Continue(f(s)),
            Self::Terminate(s) => Successor::Terminate(f(s)),
            Self::Interrupt(s) => Successor::Interrupt(f(s)),
        }
    }

    /// Borrow the successor state.
    #[inline]
    pub const fn as_ref(&self) -> Successor<&S> {
        match self {
            Self::Continue(s) => Successor::Continue(s),
            Self::Terminate(s) => Successor::Terminate(s),
            Self::Interrupt(s) => Successor::Interrupt(s),
        }
    }
}

/// Error interacting with an environment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    #[error("no active episode; reset the environment first")]
    NoActiveEpisode,
    #[error("invalid environment configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_episode_done() {
        assert!(!Successor::Continue(1).episode_done());
        assert!(Successor::Terminate(1).episode_done());
        assert!(Successor::Interrupt(1).episode_done());
        assert!(Successor::Terminate(1).is_terminal());
        assert!(!Successor::Interrupt(1).is_terminal());
    }

    #[test]
    fn successor_map_keeps_variant() {
        assert_eq!(Successor::Interrupt(2).map(|x| x * 3), Successor::Interrupt(6));
        assert_eq!(*Successor::Terminate(5).inner(), 5);
    }
}
