use super::{EnvError, Environment, Render, RenderMode, Successor};
use crate::logging::StatsLogger;
use crate::Prng;
use image::RgbImage;
use rand::SeedableRng;

/// Result of one step of an [`EnvWithState`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome<O> {
    /// Observation of the resulting state.
    pub observation: O,
    /// Reward for the transition.
    pub reward: f64,
    /// The resulting state is terminal.
    pub terminated: bool,
    /// The episode was cut off at a non-terminal state.
    pub truncated: bool,
}

impl<O> StepOutcome<O> {
    /// Whether the episode is over.
    pub const fn episode_done(&self) -> bool {
        self.terminated || self.truncated
    }

    /// The resulting observation as a [`Successor`].
    pub fn into_successor(self) -> Successor<O> {
        if self.terminated {
            Successor::Terminate(self.observation)
        } else if self.truncated {
            Successor::Interrupt(self.observation)
        } else {
            Successor::Continue(self.observation)
        }
    }
}

/// An environment together with its current state and random number generator.
///
/// Provides the episodic `reset` / `step` / `render` interface on top of a stateless
/// [`Environment`].
#[derive(Debug)]
pub struct EnvWithState<E: Environment> {
    env: E,
    state: Option<E::State>,
    episode_done: bool,
    render_mode: RenderMode,
    rng: Prng,
}

impl<E: Environment> EnvWithState<E> {
    /// Wrap an environment. The random number generator is seeded with `seed`.
    pub fn new(env: E, seed: u64) -> Self {
        Self {
            env,
            state: None,
            episode_done: true,
            render_mode: RenderMode::None,
            rng: Prng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub const fn with_render_mode(mut self, render_mode: RenderMode) -> Self {
        self.render_mode = render_mode;
        self
    }

    /// The wrapped environment.
    pub const fn env(&self) -> &E {
        &self.env
    }

    /// The current state, if an episode has been started.
    pub const fn state(&self) -> Option<&E::State> {
        self.state.as_ref()
    }

    /// Start a new episode.
    ///
    /// If `seed` is given then the random number generator is reseeded first,
    /// so that resetting two identically configured environments with the same seed
    /// produces the same initial state.
    ///
    /// # Returns
    /// An observation of the initial state.
    pub fn reset(&mut self, seed: Option<u64>) -> E::Observation {
        if let Some(seed) = seed {
            self.rng = Prng::seed_from_u64(seed);
        }
        let state = self.env.initial_state(&mut self.rng);
        let observation = self.env.observe(&state, &mut self.rng);
        self.state = Some(state);
        self.episode_done = false;
        observation
    }

    /// Take a step in the environment.
    ///
    /// Fails if no episode is active: either `reset` was never called or the previous step
    /// ended the episode.
    pub fn step(
        &mut self,
        action: &E::Action,
        logger: &mut dyn StatsLogger,
    ) -> Result<StepOutcome<E::Observation>, EnvError> {
        if self.episode_done {
            return Err(EnvError::NoActiveEpisode);
        }
        let state = self.state.take().ok_or(EnvError::NoActiveEpisode)?;
        let (successor, reward) = self.env.step(state, action, &mut self.rng, logger);
        let terminated = successor.is_terminal();
        let truncated = matches!(successor, Successor::Interrupt(_));
        let state = successor.into_inner();
        let observation = self.env.observe(&state, &mut self.rng);
        self.state = Some(state);
        self.episode_done = terminated || truncated;
        Ok(StepOutcome {
            observation,
            reward,
            terminated,
            truncated,
        })
    }

    /// Close the environment, releasing its resources.
    pub fn close(self) {}
}

impl<E: Render> EnvWithState<E> {
    /// Draw the current state.
    ///
    /// Returns `None` if rendering is disabled or no episode has been started.
    pub fn render(&self) -> Option<RgbImage> {
        match (self.render_mode, &self.state) {
            (RenderMode::RgbArray, Some(state)) => Some(self.env.render(state)),
            _ => None,
        }
    }
}
