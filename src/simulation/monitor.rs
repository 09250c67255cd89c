use crate::logging::StatsLogger;
use std::fmt;

/// Records per-episode reward totals and lengths of a stream of steps.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Monitor {
    episode_rewards: Vec<f64>,
    episode_lengths: Vec<u64>,
    /// Reward accumulated so far in the current episode.
    current_reward: f64,
    /// Number of steps so far in the current episode.
    current_length: u64,
    num_steps: u64,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one environment step.
    ///
    /// Logs the episode reward and length when the step ends an episode.
    pub fn record(&mut self, reward: f64, episode_done: bool, logger: &mut dyn StatsLogger) {
        self.num_steps += 1;
        self.current_reward += reward;
        self.current_length += 1;
        if episode_done {
            logger.log_scalar("episode_reward", self.current_reward);
            logger.log_scalar("episode_length", self.current_length as f64);
            logger.log_counter_increment("episodes", 1);
            self.episode_rewards.push(self.current_reward);
            self.episode_lengths.push(self.current_length);
            self.current_reward = 0.0;
            self.current_length = 0;
        }
    }

    /// Forget the steps of the current episode without recording it.
    ///
    /// The steps still count towards [`Monitor::num_steps`].
    pub fn discard_episode(&mut self) {
        self.current_reward = 0.0;
        self.current_length = 0;
    }

    /// Total rewards of the completed episodes in order of completion.
    pub fn episode_rewards(&self) -> &[f64] {
        &self.episode_rewards
    }

    /// Lengths of the completed episodes in order of completion.
    pub fn episode_lengths(&self) -> &[u64] {
        &self.episode_lengths
    }

    /// Total number of recorded steps, including those of an unfinished episode.
    pub const fn num_steps(&self) -> u64 {
        self.num_steps
    }

    pub fn summary(&self) -> EpisodesSummary {
        EpisodesSummary {
            num_steps: self.num_steps,
            num_episodes: self.episode_rewards.len() as u64,
            total_episode_reward: self.episode_rewards.iter().sum(),
            total_episode_length: self.episode_lengths.iter().sum(),
        }
    }
}

/// Basic summary statistics of completed episodes.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct EpisodesSummary {
    pub num_steps: u64,
    pub num_episodes: u64,
    pub total_episode_reward: f64,
    pub total_episode_length: u64,
}

impl EpisodesSummary {
    pub fn mean_episode_reward(&self) -> Option<f64> {
        if self.num_episodes > 0 {
            Some(self.total_episode_reward / self.num_episodes as f64)
        } else {
            None
        }
    }

    pub fn mean_episode_length(&self) -> Option<f64> {
        if self.num_episodes > 0 {
            Some(self.total_episode_length as f64 / self.num_episodes as f64)
        } else {
            None
        }
    }
}

impl fmt::Display for EpisodesSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "num_steps:      {}", self.num_steps)?;
        writeln!(f, "num_episodes:   {}", self.num_episodes)?;
        if let Some(reward) = self.mean_episode_reward() {
            writeln!(f, "ep_reward_mean: {:.3}", reward)?;
        }
        if let Some(length) = self.mean_episode_length() {
            writeln!(f, "ep_length_mean: {:.1}", length)?;
        }
        Ok(())
    }
}
