//! Comparison video of a random, a partially-trained and a fully-trained agent.
use crate::agents::{Actor, RandomActor};
use crate::envs::highway::KinematicsSpace;
use crate::envs::{
    EnvError, EnvStructure, EnvWithState, HighwayConfig, HighwayEnv, MetaAction, Render,
    RenderMode,
};
use crate::error::HighwayError;
use crate::logging::StatsLogger;
use crate::render::{add_label, save_gif};
use crate::spaces::IndexedTypeSpace;
use crate::torch::agents::QPolicy;
use crate::torch::serialize::DeviceDef;
use crate::Prng;
use image::RgbImage;
use log::info;
use ndarray::Array2;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tch::Device;

/// Trained highway driving policy.
pub type HighwayPolicy = QPolicy<KinematicsSpace, IndexedTypeSpace<MetaAction>>;

/// Configuration for [`run_evaluation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Frame rate of the output video.
    pub fps: u32,
    /// Seed shared by the three episodes so that they start from the same scenario.
    pub seed: u64,
    /// How long the labelled first frame of each episode is shown (seconds).
    pub label_seconds: f64,
    pub env: HighwayConfig,
    /// Policy saved part way through training.
    pub early_policy: PathBuf,
    /// Policy saved at the end of training.
    pub final_policy: PathBuf,
    /// Labels of the random, early and final episodes.
    pub labels: [String; 3],
    /// Output video.
    pub output: PathBuf,
    /// The resolved evaluation configuration as JSON.
    pub config: PathBuf,
    #[serde(with = "DeviceDef")]
    pub device: Device,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            fps: 20,
            seed: 42,
            label_seconds: 2.0,
            env: HighwayConfig::evaluation(),
            early_policy: "dqn_highway_early.cbor".into(),
            final_policy: "dqn_highway_final.cbor".into(),
            labels: [
                "Untrained Agent (Random)".into(),
                "Partially-Trained Agent".into(),
                "Fully-Trained Agent".into(),
            ],
            output: "evolution.gif".into(),
            config: "evaluate_config.json".into(),
            device: Device::Cpu,
        }
    }
}

impl EvaluationConfig {
    /// Number of copies of the labelled first frame: `floor(label_seconds * fps)`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn label_frames(&self) -> usize {
        (self.label_seconds.max(0.0) * f64::from(self.fps)).floor() as usize
    }
}

/// Outcome of one recorded episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeReport {
    pub label: String,
    /// Number of environment steps taken.
    pub steps: u64,
    pub total_reward: f64,
    /// Number of frames added to the video, including the label frames.
    pub frames: usize,
}

impl fmt::Display for EpisodeReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}] Episode finished after {} steps, total reward {:.2}",
            self.label, self.steps, self.total_reward
        )
    }
}

/// Runs episodes and accumulates their frames into a single video.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecorder {
    label_frames: usize,
    frames: Vec<RgbImage>,
}

impl EpisodeRecorder {
    /// Create a recorder that shows each episode label for `label_frames` frames.
    pub const fn new(label_frames: usize) -> Self {
        Self {
            label_frames,
            frames: Vec::new(),
        }
    }

    /// All recorded frames.
    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<RgbImage> {
        self.frames
    }

    /// Run one episode from `env.reset(Some(seed))` until it terminates or is truncated.
    ///
    /// If the environment renders, the first frame is labelled with `label` and repeated
    /// `label_frames` times, followed by one frame per step.
    pub fn record_episode<E, T>(
        &mut self,
        env: &mut EnvWithState<E>,
        actor: &T,
        label: &str,
        seed: u64,
        rng: &mut Prng,
        logger: &mut dyn StatsLogger,
    ) -> Result<EpisodeReport, EnvError>
    where
        E: Render,
        T: Actor<E::Observation, E::Action> + ?Sized,
    {
        let start_frames = self.frames.len();
        let mut observation = env.reset(Some(seed));
        if let Some(frame) = env.render() {
            let labelled = add_label(&frame, label);
            self.frames
                .extend(std::iter::repeat(labelled).take(self.label_frames));
        }

        let mut steps = 0;
        let mut total_reward = 0.0;
        loop {
            let action = actor.act(&observation, rng);
            let outcome = env.step(&action, logger)?;
            steps += 1;
            total_reward += outcome.reward;
            if let Some(frame) = env.render() {
                self.frames.push(frame);
            }
            if outcome.episode_done() {
                break;
            }
            observation = outcome.observation;
        }
        logger.log_scalar("episode_reward", total_reward);
        logger.log_scalar("episode_length", steps as f64);

        Ok(EpisodeReport {
            label: label.into(),
            steps,
            total_reward,
            frames: self.frames.len() - start_frames,
        })
    }
}

/// Reports of the evaluation episodes.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub episodes: Vec<EpisodeReport>,
    /// Total number of frames in the video.
    pub num_frames: usize,
    pub output: PathBuf,
    pub config: PathBuf,
}

/// Record one episode each of a random actor and the early and final policies,
/// all from the same seeded scenario, and save them as one labelled GIF.
///
/// Policy paths are relative to `dir`, as are the output video and configuration.
pub fn run_evaluation(
    config: &EvaluationConfig,
    dir: &Path,
    logger: &mut dyn StatsLogger,
) -> Result<EvaluationReport, HighwayError> {
    let early_policy = HighwayPolicy::load(dir.join(&config.early_policy), config.device)?;
    let final_policy = HighwayPolicy::load(dir.join(&config.final_policy), config.device)?;

    let make_env = || -> Result<_, EnvError> {
        Ok(EnvWithState::new(HighwayEnv::new(config.env.clone())?, config.seed)
            .with_render_mode(RenderMode::RgbArray))
    };
    let mut envs = [make_env()?, make_env()?, make_env()?];
    let random_actor = RandomActor::new(envs[0].env().action_space());
    let actors: [&dyn Actor<Array2<f32>, MetaAction>; 3] =
        [&random_actor, &early_policy, &final_policy];

    let mut recorder = EpisodeRecorder::new(config.label_frames());
    let mut episodes = Vec::with_capacity(actors.len());
    for ((env, actor), label) in envs.iter_mut().zip(actors).zip(&config.labels) {
        info!("[{}] starting evaluation episode", label);
        let mut rng = Prng::seed_from_u64(config.seed);
        let report = recorder.record_episode(env, actor, label, config.seed, &mut rng, logger)?;
        info!("{}", report);
        episodes.push(report);
    }
    for env in envs {
        env.close();
    }

    fs::create_dir_all(dir)?;
    let output = dir.join(&config.output);
    let frames = recorder.into_frames();
    save_gif(&output, &frames, config.fps)?;

    let config_path = dir.join(&config.config);
    let mut writer = BufWriter::new(File::create(&config_path)?);
    serde_json::to_writer_pretty(&mut writer, config)?;
    writer.flush()?;

    Ok(EvaluationReport {
        episodes,
        num_frames: frames.len(),
        output,
        config: config_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torch::MlpConfig;
    use rstest::rstest;

    fn small_env_config() -> HighwayConfig {
        HighwayConfig {
            duration: 3.0,
            screen_width: 60,
            screen_height: 30,
            scaling: 2.0,
            ..HighwayConfig::evaluation()
        }
    }

    #[rstest]
    #[case(2.0, 20, 40)]
    #[case(0.5, 15, 7)]
    #[case(0.0, 20, 0)]
    fn label_frames(#[case] label_seconds: f64, #[case] fps: u32, #[case] expected: usize) {
        let config = EvaluationConfig {
            label_seconds,
            fps,
            ..EvaluationConfig::default()
        };
        assert_eq!(config.label_frames(), expected);
    }

    #[test]
    fn frame_count_is_label_frames_plus_steps() {
        let env = HighwayEnv::new(small_env_config()).unwrap();
        let actor = RandomActor::new(env.action_space());
        let mut env = EnvWithState::new(env, 0).with_render_mode(RenderMode::RgbArray);
        let mut recorder = EpisodeRecorder::new(5);
        let mut rng = Prng::seed_from_u64(0);
        let report = recorder
            .record_episode(&mut env, &actor, "Random", 7, &mut rng, &mut ())
            .unwrap();
        assert!(report.steps >= 1);
        assert!(report.steps <= small_env_config().max_episode_steps());
        assert_eq!(report.frames, 5 + report.steps as usize);
        assert_eq!(recorder.frames().len(), report.frames);
        assert_eq!(recorder.frames()[0].dimensions(), (60, 30));
        // The label is drawn on the held frames only
        assert_eq!(recorder.frames()[0], recorder.frames()[4]);
    }

    #[test]
    fn no_frames_without_rendering() {
        let env = HighwayEnv::new(small_env_config()).unwrap();
        let actor = RandomActor::new(env.action_space());
        let mut env = EnvWithState::new(env, 0);
        let mut recorder = EpisodeRecorder::new(5);
        let mut rng = Prng::seed_from_u64(0);
        let report = recorder
            .record_episode(&mut env, &actor, "Random", 7, &mut rng, &mut ())
            .unwrap();
        assert_eq!(report.frames, 0);
        assert!(recorder.frames().is_empty());
    }

    #[test]
    fn run_evaluation_writes_gif() {
        let dir = tempfile::tempdir().unwrap();
        let network = MlpConfig {
            hidden_sizes: vec![8],
            ..MlpConfig::default()
        };
        let config = EvaluationConfig {
            fps: 10,
            label_seconds: 0.5,
            env: small_env_config(),
            ..EvaluationConfig::default()
        };
        for path in [&config.early_policy, &config.final_policy] {
            HighwayPolicy::new(
                KinematicsSpace::new(5),
                IndexedTypeSpace::new(),
                network.clone(),
                Device::Cpu,
            )
            .save(dir.path().join(path))
            .unwrap();
        }

        let report = run_evaluation(&config, dir.path(), &mut ()).unwrap();
        assert_eq!(report.episodes.len(), 3);
        let labels: Vec<_> = report.episodes.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, config.labels.iter().map(String::as_str).collect::<Vec<_>>());
        let max_steps = config.env.max_episode_steps();
        for episode in &report.episodes {
            assert!(episode.steps <= max_steps);
            assert_eq!(episode.frames, 5 + episode.steps as usize);
        }
        assert_eq!(
            report.num_frames,
            report.episodes.iter().map(|e| e.frames).sum::<usize>()
        );
        assert!(report.output.is_file());
        assert!(report.config.is_file());
    }

    #[test]
    fn run_evaluation_missing_policy() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_evaluation(&EvaluationConfig::default(), dir.path(), &mut ());
        assert!(matches!(result, Err(HighwayError::Policy(_))));
    }
}
