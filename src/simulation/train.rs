//! Two-phase training of a DQN agent on the highway environment.
use super::{EpisodesSummary, Monitor};
use crate::agents::{ActorMode, Agent, PartialStep};
use crate::envs::{EnvError, EnvWithState, Environment, HighwayConfig, HighwayEnv};
use crate::error::HighwayError;
use crate::logging::{ScopedLogger, StatsLogger};
use crate::render::save_reward_curve;
use crate::torch::agents::{DqnAgent, DqnConfig};
use crate::Prng;
use log::info;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Split of the training steps into an early phase and a final phase.
///
/// A checkpoint is saved at the end of each phase.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSchedule {
    /// Total number of environment steps over both phases.
    pub total_timesteps: u64,
    /// Fraction of `total_timesteps` in the early phase.
    pub early_fraction: f64,
}

impl Default for TrainingSchedule {
    fn default() -> Self {
        Self {
            total_timesteps: 40_000,
            early_fraction: 0.2,
        }
    }
}

impl TrainingSchedule {
    /// Number of steps in the early phase: `floor(total_timesteps * early_fraction)`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn early_steps(&self) -> u64 {
        let steps = (self.total_timesteps as f64 * self.early_fraction.clamp(0.0, 1.0)).floor();
        (steps as u64).min(self.total_timesteps)
    }

    /// Number of steps in the final phase; the remainder of `total_timesteps`.
    pub fn final_steps(&self) -> u64 {
        self.total_timesteps - self.early_steps()
    }
}

/// File names of the training artifacts, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingArtifacts {
    pub early_policy: PathBuf,
    pub final_policy: PathBuf,
    pub reward_curve: PathBuf,
    /// The resolved training configuration as JSON.
    pub config: PathBuf,
}

impl Default for TrainingArtifacts {
    fn default() -> Self {
        Self {
            early_policy: "dqn_highway_early.cbor".into(),
            final_policy: "dqn_highway_final.cbor".into(),
            reward_curve: "training_curve.png".into(),
            config: "train_config.json".into(),
        }
    }
}

/// Configuration for [`run_training`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Name of the environment variant, for display.
    pub env_id: String,
    pub schedule: TrainingSchedule,
    /// Seed for the environment, the agent and the network initialization.
    pub seed: u64,
    pub env: HighwayConfig,
    pub agent: DqnConfig,
    pub artifacts: TrainingArtifacts,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            env_id: "highway-fast-v0".into(),
            schedule: TrainingSchedule::default(),
            seed: 42,
            env: HighwayConfig::training(),
            agent: DqnConfig::default(),
            artifacts: TrainingArtifacts::default(),
        }
    }
}

/// Paths and statistics produced by [`run_training`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub early_policy: PathBuf,
    pub final_policy: PathBuf,
    pub reward_curve: PathBuf,
    pub config: PathBuf,
    /// Total reward of each completed training episode.
    pub episode_rewards: Vec<f64>,
    pub num_steps: u64,
    pub summary: EpisodesSummary,
}

/// Trains an agent by acting in an environment.
///
/// Each call to [`Trainer::train`] is a separate learning run: it starts from a
/// fresh episode and an episode left unfinished by the previous run is dropped.
pub struct Trainer<E: Environment, T> {
    env: EnvWithState<E>,
    agent: T,
    /// Most recent observation of the episode in progress, if any.
    observation: Option<E::Observation>,
    monitor: Monitor,
    /// Prng for the agent's action selection.
    rng: Prng,
}

impl<E, T> std::fmt::Debug for Trainer<E, T>
where
    E: Environment + std::fmt::Debug,
    E::State: std::fmt::Debug,
    E::Observation: std::fmt::Debug,
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("env", &self.env)
            .field("agent", &self.agent)
            .field("observation", &self.observation)
            .field("monitor", &self.monitor)
            .field("rng", &self.rng)
            .finish()
    }
}

impl<E, T> Trainer<E, T>
where
    E: Environment,
    E::Observation: Clone,
    T: Agent<E::Observation, E::Action>,
{
    pub fn new(env: EnvWithState<E>, agent: T, rng: Prng) -> Self {
        Self {
            env,
            agent,
            observation: None,
            monitor: Monitor::new(),
            rng,
        }
    }

    pub const fn agent(&self) -> &T {
        &self.agent
    }

    pub const fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Run `num_steps` environment steps, updating the agent after each one.
    pub fn train(
        &mut self,
        num_steps: u64,
        logger: &mut dyn StatsLogger,
    ) -> Result<(), EnvError> {
        if self.observation.take().is_some() {
            self.monitor.discard_episode();
        }
        self.agent.begin_learning(num_steps);
        for _ in 0..num_steps {
            let observation = match self.observation.take() {
                Some(observation) => observation,
                None => self.env.reset(None),
            };
            let action = self
                .agent
                .act(&observation, ActorMode::Training, &mut self.rng);
            let outcome = self
                .env
                .step(&action, &mut ScopedLogger::new(&mut *logger, "env"))?;
            let reward = outcome.reward;
            let done = outcome.episode_done();
            self.monitor.record(reward, done, logger);

            let next = outcome.into_successor();
            if !done {
                self.observation = Some(next.inner().clone());
            }
            self.agent.update(
                PartialStep::new(observation, action, reward, next),
                &mut ScopedLogger::new(&mut *logger, "agent"),
            );
        }
        Ok(())
    }

    /// Close the environment and return the agent and the monitor.
    pub fn into_inner(self) -> (T, Monitor) {
        self.env.close();
        (self.agent, self.monitor)
    }
}

/// Train a DQN agent in two phases, saving a policy checkpoint after each.
///
/// Writes the early and final policies, the reward curve of the training episodes
/// and the resolved configuration into `out_dir`.
pub fn run_training(
    config: &TrainingConfig,
    out_dir: &Path,
    logger: &mut dyn StatsLogger,
) -> Result<TrainingReport, HighwayError> {
    fs::create_dir_all(out_dir)?;
    let early_policy = out_dir.join(&config.artifacts.early_policy);
    let final_policy = out_dir.join(&config.artifacts.final_policy);
    let reward_curve = out_dir.join(&config.artifacts.reward_curve);
    let config_path = out_dir.join(&config.artifacts.config);

    let env = HighwayEnv::new(config.env.clone())?;
    tch::manual_seed(config.seed as i64);
    let agent = DqnAgent::new(
        &env,
        &config.agent,
        config.schedule.early_steps(),
        Prng::seed_from_u64(config.seed),
    )?;
    let mut trainer = Trainer::new(
        EnvWithState::new(env, config.seed),
        agent,
        Prng::seed_from_u64(config.seed.wrapping_add(1)),
    );

    let start = Instant::now();
    let early_steps = config.schedule.early_steps();
    info!("{}: training for {} steps", config.env_id, early_steps);
    trainer.train(early_steps, logger)?;
    trainer.agent().policy()?.save(&early_policy)?;
    info!("saved early policy to {}", early_policy.display());

    let final_steps = config.schedule.final_steps();
    info!("{}: training for {} more steps", config.env_id, final_steps);
    trainer.train(final_steps, logger)?;
    trainer.agent().policy()?.save(&final_policy)?;
    info!("saved final policy to {}", final_policy.display());
    logger.log_duration("training_time", start.elapsed());
    logger.flush();

    let (_, monitor) = trainer.into_inner();
    save_reward_curve(&reward_curve, monitor.episode_rewards())?;

    let mut writer = BufWriter::new(File::create(&config_path)?);
    serde_json::to_writer_pretty(&mut writer, config)?;
    writer.flush()?;

    Ok(TrainingReport {
        early_policy,
        final_policy,
        reward_curve,
        config: config_path,
        episode_rewards: monitor.episode_rewards().to_vec(),
        num_steps: monitor.num_steps(),
        summary: monitor.summary(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Actor, RandomActor};
    use crate::envs::{EnvStructure, MetaAction};
    use crate::spaces::IndexedTypeSpace;
    use ndarray::Array2;
    use rstest::rstest;

    #[rstest]
    #[case(40_000, 0.2, 8_000)]
    #[case(10, 0.25, 2)]
    #[case(7, 0.0, 0)]
    #[case(7, 1.0, 7)]
    #[case(3, 1.5, 3)]
    fn schedule_phases_sum_to_total(
        #[case] total_timesteps: u64,
        #[case] early_fraction: f64,
        #[case] early: u64,
    ) {
        let schedule = TrainingSchedule {
            total_timesteps,
            early_fraction,
        };
        assert_eq!(schedule.early_steps(), early);
        assert_eq!(schedule.early_steps() + schedule.final_steps(), total_timesteps);
    }

    #[test]
    fn default_config_json_round_trip() {
        let config = TrainingConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: TrainingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{"schedule": {"total_timesteps": 100}, "seed": 3}"#).unwrap();
        assert_eq!(config.schedule.total_timesteps, 100);
        assert_eq!(config.schedule.early_fraction, 0.2);
        assert_eq!(config.seed, 3);
        assert_eq!(config.env, HighwayConfig::training());
    }

    /// Agent that acts randomly and records the steps it is given.
    struct RecordingAgent {
        actor: RandomActor<IndexedTypeSpace<MetaAction>>,
        runs: Vec<u64>,
        updates: u64,
        episodes: u64,
        /// Next observation of the most recent step if its episode continues.
        last_next: Option<Array2<f32>>,
        /// Steps that do not start from the previous step's next observation.
        new_episodes: u64,
    }

    impl RecordingAgent {
        fn new(env: &HighwayEnv) -> Self {
            Self {
                actor: RandomActor::new(env.action_space()),
                runs: Vec::new(),
                updates: 0,
                episodes: 0,
                last_next: None,
                new_episodes: 0,
            }
        }
    }

    impl Agent<Array2<f32>, MetaAction> for RecordingAgent {
        fn act(&self, observation: &Array2<f32>, _: ActorMode, rng: &mut Prng) -> MetaAction {
            self.actor.act(observation, rng)
        }

        fn update(&mut self, step: PartialStep<Array2<f32>, MetaAction>, _: &mut dyn StatsLogger) {
            self.updates += 1;
            if self.last_next.as_ref() != Some(&step.observation) {
                self.new_episodes += 1;
            }
            if step.next.episode_done() {
                self.episodes += 1;
                self.last_next = None;
            } else {
                self.last_next = Some(step.next.inner().clone());
            }
        }

        fn begin_learning(&mut self, num_steps: u64) {
            self.runs.push(num_steps);
        }
    }

    fn short_episode_env() -> HighwayEnv {
        HighwayEnv::new(HighwayConfig {
            duration: 5.0,
            simulation_frequency: 5,
            policy_frequency: 1,
            ..HighwayConfig::training()
        })
        .unwrap()
    }

    #[test]
    fn each_train_call_is_a_new_run() {
        let env = short_episode_env();
        let agent = RecordingAgent::new(&env);
        let mut trainer = Trainer::new(EnvWithState::new(env, 0), agent, Prng::seed_from_u64(0));
        trainer.train(3, &mut ()).unwrap();
        assert_eq!(trainer.monitor().num_steps(), 3);
        let open_episode = trainer.agent().last_next.is_some();
        let episodes_before = trainer.agent().new_episodes;
        trainer.train(17, &mut ()).unwrap();

        let (agent, monitor) = trainer.into_inner();
        assert_eq!(agent.runs, vec![3, 17]);
        assert_eq!(agent.updates, 20);
        assert_eq!(monitor.num_steps(), 20);
        assert_eq!(agent.episodes, monitor.episode_rewards().len() as u64);
        // Episodes last at most 5 s at 1 step per second
        assert!(monitor.episode_lengths().iter().all(|&len| len <= 5));
        assert!(monitor.episode_lengths().len() >= 3);

        // An episode left open by the first run is dropped, not continued
        if open_episode {
            assert!(agent.new_episodes > episodes_before);
        }
    }

    #[test]
    fn second_run_starts_with_fresh_episode() {
        let env = short_episode_env();
        let agent = RecordingAgent::new(&env);
        let mut trainer = Trainer::new(EnvWithState::new(env, 0), agent, Prng::seed_from_u64(0));
        // Ends part way through the first episode
        trainer.train(1, &mut ()).unwrap();
        if trainer.agent().last_next.is_none() {
            return; // Crashed on the first step
        }
        trainer.train(1, &mut ()).unwrap();
        assert_eq!(trainer.agent().new_episodes, 2);
        assert!(trainer.monitor().episode_rewards().len() <= 1);
    }

    #[test]
    fn run_training_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig {
            schedule: TrainingSchedule {
                total_timesteps: 30,
                early_fraction: 0.2,
            },
            env: HighwayConfig {
                duration: 4.0,
                ..HighwayConfig::training()
            },
            agent: DqnConfig {
                network: crate::torch::MlpConfig {
                    hidden_sizes: vec![8],
                    ..Default::default()
                },
                learning_starts: 10,
                batch_size: 4,
                target_update_interval: 5,
                ..DqnConfig::default()
            },
            ..TrainingConfig::default()
        };
        let report = run_training(&config, dir.path(), &mut ()).unwrap();
        assert_eq!(report.num_steps, 30);
        assert!(report.early_policy.is_file());
        assert!(report.final_policy.is_file());
        assert!(report.reward_curve.is_file());
        let saved: TrainingConfig =
            serde_json::from_reader(File::open(&report.config).unwrap()).unwrap();
        assert_eq!(saved, config);
        assert!(!report.episode_rewards.is_empty());
        assert_eq!(report.summary.num_steps, 30);
        assert_eq!(
            report.summary.num_episodes,
            report.episode_rewards.len() as u64
        );
    }
}
