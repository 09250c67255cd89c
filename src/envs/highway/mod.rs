//! Highway driving environment.
//!
//! The agent drives the ego vehicle on a straight multi-lane highway among autonomous traffic.
//! It is rewarded for driving fast and on the right-most lanes and penalized for collisions.
mod observation;
mod road;
mod vehicle;

pub use observation::{KinematicsSpace, NUM_VEHICLE_FEATURES, PERCEPTION_DISTANCE};
pub use road::{Road, LANE_WIDTH, SPEED_LIMIT};
pub use vehicle::{
    desired_gap, idm, idm_acceleration, mobil, Control, Driver, Vehicle, EGO_INITIAL_SPEED,
    MAX_SPEED, TARGET_SPEEDS, VEHICLE_LENGTH, VEHICLE_WIDTH,
};

use super::{EnvError, EnvStructure, Environment, Render, Successor};
use crate::logging::StatsLogger;
use crate::render::{TopDownRenderer, Viewport};
use crate::spaces::{Indexed, IndexedTypeSpace};
use crate::Prng;
use image::RgbImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Configuration of the [`HighwayEnv`] environment.
///
/// The default values are a fast-to-simulate highway:
/// few lanes, sparse traffic, a low simulation frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighwayConfig {
    /// Number of lanes.
    pub lanes_count: usize,
    /// Number of traffic vehicles.
    pub vehicles_count: usize,
    /// Traffic density. Vehicles are spaced by `1 / vehicles_density` times the default gap.
    pub vehicles_density: f64,
    /// Episode duration in seconds of simulated time.
    pub duration: f64,
    /// Number of simulation sub-steps per simulated second.
    pub simulation_frequency: u32,
    /// Number of agent decisions per simulated second.
    pub policy_frequency: u32,
    /// Gap in front of the ego vehicle relative to the default gap.
    pub ego_spacing: f64,
    /// Initial lane of the ego vehicle. Random if `None`.
    pub initial_lane_id: Option<usize>,
    /// Reward received on collision.
    pub collision_reward: f64,
    /// Reward received when driving at full speed, linearly mapped to zero for lower speeds.
    pub high_speed_reward: f64,
    /// Reward received when driving on the right-most lane, linearly mapped to zero for
    /// other lanes.
    pub right_lane_reward: f64,
    /// Reward received for each lane change action.
    pub lane_change_reward: f64,
    /// Forward speeds mapped to the minimum and maximum speed reward (m/s).
    pub reward_speed_range: [f64; 2],
    /// Linearly rescale the reward to `[0, 1]`.
    pub normalize_reward: bool,
    /// End the episode when the ego vehicle leaves the road.
    pub offroad_terminal: bool,
    /// Number of vehicles in the observation, including the ego vehicle.
    pub observation_vehicles_count: usize,
    /// Rendered frame width (pixels).
    pub screen_width: u32,
    /// Rendered frame height (pixels).
    pub screen_height: u32,
    /// Rendered pixels per metre.
    pub scaling: f64,
    /// Position of the ego vehicle in the frame as a fraction of the width and height.
    pub centering_position: [f64; 2],
}

impl Default for HighwayConfig {
    fn default() -> Self {
        Self {
            lanes_count: 3,
            vehicles_count: 20,
            vehicles_density: 1.0,
            duration: 30.0,
            simulation_frequency: 5,
            policy_frequency: 1,
            ego_spacing: 1.5,
            initial_lane_id: None,
            collision_reward: -1.0,
            high_speed_reward: 0.4,
            right_lane_reward: 0.1,
            lane_change_reward: 0.0,
            reward_speed_range: [20.0, 30.0],
            normalize_reward: true,
            offroad_terminal: false,
            observation_vehicles_count: 5,
            screen_width: 600,
            screen_height: 150,
            scaling: 5.5,
            centering_position: [0.3, 0.5],
        }
    }
}

impl HighwayConfig {
    /// Dense four-lane traffic with a strong collision penalty, used for training.
    pub fn training() -> Self {
        Self {
            lanes_count: 4,
            vehicles_count: 45,
            duration: 60.0,
            ego_spacing: 1.2,
            simulation_frequency: 15,
            policy_frequency: 5,
            collision_reward: -8.0,
            high_speed_reward: 2.5,
            right_lane_reward: 0.05,
            ..Self::default()
        }
    }

    /// Longer episodes rendered at high resolution, used for the evaluation video.
    pub fn evaluation() -> Self {
        Self {
            lanes_count: 4,
            vehicles_count: 45,
            duration: 100.0,
            simulation_frequency: 15,
            policy_frequency: 3,
            ego_spacing: 1.3,
            screen_width: 1200,
            screen_height: 300,
            scaling: 11.0,
            collision_reward: -5.0,
            high_speed_reward: 2.5,
            right_lane_reward: 0.05,
            ..Self::default()
        }
    }

    /// Check that the environment can be simulated with this configuration.
    pub fn validate(&self) -> Result<(), EnvError> {
        let invalid = |msg: &str| Err(EnvError::InvalidConfig(msg.into()));
        if self.lanes_count == 0 {
            return invalid("lanes_count must be at least 1");
        }
        if matches!(self.initial_lane_id, Some(lane) if lane >= self.lanes_count) {
            return invalid("initial_lane_id must be less than lanes_count");
        }
        if self.simulation_frequency == 0 || self.policy_frequency == 0 {
            return invalid("frequencies must be positive");
        }
        if self.policy_frequency > self.simulation_frequency {
            return invalid("policy_frequency must not exceed simulation_frequency");
        }
        if !(self.duration > 0.0) {
            return invalid("duration must be positive");
        }
        if !(self.vehicles_density > 0.0) || !(self.ego_spacing > 0.0) {
            return invalid("vehicles_density and ego_spacing must be positive");
        }
        let [low, high] = self.reward_speed_range;
        if !(low < high) {
            return invalid("reward_speed_range must be a non-empty interval");
        }
        if self.normalize_reward
            && !(self.collision_reward < self.high_speed_reward + self.right_lane_reward)
        {
            return invalid("collision_reward must be less than the maximum driving reward");
        }
        if self.screen_width == 0 || self.screen_height == 0 || !(self.scaling > 0.0) {
            return invalid("screen size and scaling must be positive");
        }
        Ok(())
    }

    /// Maximum number of agent steps in an episode.
    pub fn max_episode_steps(&self) -> u64 {
        (self.duration * f64::from(self.policy_frequency)).ceil() as u64
    }

    const fn viewport(&self) -> Viewport {
        Viewport {
            width: self.screen_width,
            height: self.screen_height,
            scaling: self.scaling,
            centering: self.centering_position,
        }
    }
}

/// High-level driving decisions of the ego vehicle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaAction {
    LaneLeft,
    Idle,
    LaneRight,
    Faster,
    Slower,
}

impl MetaAction {
    pub const fn is_lane_change(self) -> bool {
        matches!(self, Self::LaneLeft | Self::LaneRight)
    }
}

impl Indexed for MetaAction {
    const SIZE: usize = 5;

    fn as_index(&self) -> usize {
        *self as usize
    }

    fn from_index(index: usize) -> Option<Self> {
        use MetaAction::*;
        [LaneLeft, Idle, LaneRight, Faster, Slower]
            .get(index)
            .copied()
    }
}

/// Highway environment state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighwayState {
    /// All vehicles on the road. The first is the ego vehicle.
    pub vehicles: Vec<Vehicle>,
    /// Number of agent steps taken in this episode.
    pub steps: u64,
}

impl HighwayState {
    /// The agent-controlled vehicle.
    pub fn ego(&self) -> &Vehicle {
        &self.vehicles[0]
    }
}

/// Highway driving environment.
#[derive(Debug, Clone, PartialEq)]
pub struct HighwayEnv {
    config: HighwayConfig,
    road: Road,
    observation_space: KinematicsSpace,
    renderer: TopDownRenderer,
}

impl HighwayEnv {
    pub fn new(config: HighwayConfig) -> Result<Self, EnvError> {
        config.validate()?;
        Ok(Self {
            road: Road::new(config.lanes_count),
            observation_space: KinematicsSpace::new(config.observation_vehicles_count),
            renderer: TopDownRenderer::new(config.viewport()),
            config,
        })
    }

    pub const fn config(&self) -> &HighwayConfig {
        &self.config
    }

    pub const fn road(&self) -> &Road {
        &self.road
    }

    /// Elapsed simulated time (s) after the given number of agent steps.
    fn time(&self, steps: u64) -> f64 {
        steps as f64 / f64::from(self.config.policy_frequency)
    }

    fn apply_action(&self, ego: &mut Vehicle, action: MetaAction) {
        match action {
            MetaAction::LaneLeft => ego.change_target_lane(&self.road, -1),
            MetaAction::LaneRight => ego.change_target_lane(&self.road, 1),
            MetaAction::Faster => {
                let index = (ego.speed_index() + 1).min(TARGET_SPEEDS.len() - 1);
                ego.target_speed = TARGET_SPEEDS[index];
            }
            MetaAction::Slower => {
                ego.target_speed = TARGET_SPEEDS[ego.speed_index().saturating_sub(1)];
            }
            MetaAction::Idle => {}
        }
    }

    /// Advance the simulation by one sub-step of `dt` seconds.
    fn simulate(&self, vehicles: &mut [Vehicle], dt: f64) {
        vehicle::update_lane_targets(vehicles, &self.road);
        let controls: Vec<Control> = vehicles
            .iter()
            .enumerate()
            .map(|(i, v)| match v.driver {
                Driver::Agent => v.agent_control(&self.road),
                Driver::Traffic => v.traffic_control(i, vehicles, &self.road),
            })
            .collect();
        for (v, control) in vehicles.iter_mut().zip(controls) {
            v.step(control, &self.road, dt);
        }

        // Only the ego vehicle checks for collisions
        if let Some((ego, others)) = vehicles.split_first_mut() {
            for other in others {
                if ego.intersects(other) {
                    ego.crashed = true;
                    other.crashed = true;
                }
            }
        }
    }

    /// Reward for arriving at `state` after taking `action`.
    pub fn reward(&self, state: &HighwayState, action: MetaAction) -> f64 {
        let config = &self.config;
        let ego = state.ego();
        let right_lane = ego.target_lane as f64 / (self.road.lanes.max(2) - 1) as f64;
        let [low, high] = config.reward_speed_range;
        let high_speed = lmap(ego.forward_speed(), low, high, 0.0, 1.0).clamp(0.0, 1.0);

        let mut reward = config.collision_reward * f64::from(u8::from(ego.crashed))
            + config.right_lane_reward * right_lane
            + config.high_speed_reward * high_speed
            + config.lane_change_reward * f64::from(u8::from(action.is_lane_change()));
        if config.normalize_reward {
            reward = lmap(
                reward,
                config.collision_reward,
                config.high_speed_reward + config.right_lane_reward,
                0.0,
                1.0,
            );
        }
        if self.road.on_road(ego.position[1]) {
            reward
        } else {
            0.0
        }
    }
}

impl EnvStructure for HighwayEnv {
    type ObservationSpace = KinematicsSpace;
    type ActionSpace = IndexedTypeSpace<MetaAction>;

    fn observation_space(&self) -> Self::ObservationSpace {
        self.observation_space
    }

    fn action_space(&self) -> Self::ActionSpace {
        IndexedTypeSpace::new()
    }

    fn reward_range(&self) -> (f64, f64) {
        let config = &self.config;
        let mut min = config.collision_reward + config.lane_change_reward.min(0.0);
        let mut max = config.high_speed_reward
            + config.right_lane_reward
            + config.lane_change_reward.max(0.0);
        if config.normalize_reward {
            let high = config.high_speed_reward + config.right_lane_reward;
            min = lmap(min, config.collision_reward, high, 0.0, 1.0);
            max = lmap(max, config.collision_reward, high, 0.0, 1.0);
        }
        // Off-road rewards are zero
        (min.min(0.0), max.max(0.0))
    }
}

impl Environment for HighwayEnv {
    type State = HighwayState;
    type Observation = Array2<f32>;
    type Action = MetaAction;

    fn initial_state(&self, rng: &mut Prng) -> Self::State {
        let config = &self.config;
        let mut vehicles = Vec::with_capacity(config.vehicles_count + 1);
        vehicles.push(Vehicle::create_random(
            &self.road,
            &vehicles,
            Some(EGO_INITIAL_SPEED),
            config.initial_lane_id,
            config.ego_spacing,
            Driver::Agent,
            rng,
        ));
        for _ in 0..config.vehicles_count {
            let vehicle = Vehicle::create_random(
                &self.road,
                &vehicles,
                None,
                None,
                1.0 / config.vehicles_density,
                Driver::Traffic,
                rng,
            );
            vehicles.push(vehicle);
        }
        HighwayState { vehicles, steps: 0 }
    }

    fn observe(&self, state: &Self::State, _: &mut Prng) -> Self::Observation {
        self.observation_space
            .observe(&self.road, &state.vehicles, 0)
    }

    fn step(
        &self,
        mut state: Self::State,
        action: &Self::Action,
        _: &mut Prng,
        logger: &mut dyn StatsLogger,
    ) -> (Successor<Self::State>, f64) {
        self.apply_action(&mut state.vehicles[0], *action);

        let frames = self.config.simulation_frequency / self.config.policy_frequency;
        let dt = 1.0 / f64::from(self.config.simulation_frequency);
        for _ in 0..frames {
            self.simulate(&mut state.vehicles, dt);
        }
        state.steps += 1;

        let reward = self.reward(&state, *action);
        let ego = state.ego();
        logger.log_scalar("speed", ego.speed);
        logger.log_index("lane", ego.lane, self.road.lanes);
        logger.log_scalar("crashed", f64::from(u8::from(ego.crashed)));

        let terminated = ego.crashed
            || (self.config.offroad_terminal && !self.road.on_road(ego.position[1]));
        let truncated = self.time(state.steps) >= self.config.duration;
        let successor = if terminated {
            Successor::Terminate(state)
        } else if truncated {
            Successor::Interrupt(state)
        } else {
            Successor::Continue(state)
        };
        (successor, reward)
    }
}

impl Render for HighwayEnv {
    fn render(&self, state: &Self::State) -> RgbImage {
        self.renderer.render(&self.road, &state.vehicles, 0)
    }
}

/// Linearly map `x` from `[a0, a1]` to `[b0, b1]`.
fn lmap(x: f64, a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    b0 + (x - a0) * (b1 - b0) / (a1 - a0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::{SampleSpace, Space};
    use rand::SeedableRng;
    use rstest::{fixture, rstest};

    #[fixture]
    fn env() -> HighwayEnv {
        HighwayEnv::new(HighwayConfig::default()).unwrap()
    }

    #[rstest]
    #[case::default(HighwayConfig::default())]
    #[case::training(HighwayConfig::training())]
    #[case::evaluation(HighwayConfig::evaluation())]
    fn presets_are_valid(#[case] config: HighwayConfig) {
        assert_eq!(config.validate(), Ok(()));
    }

    #[rstest]
    #[case::no_lanes(HighwayConfig { lanes_count: 0, ..HighwayConfig::default() })]
    #[case::bad_lane(HighwayConfig { initial_lane_id: Some(3), ..HighwayConfig::default() })]
    #[case::zero_frequency(HighwayConfig { policy_frequency: 0, ..HighwayConfig::default() })]
    #[case::policy_too_fast(HighwayConfig { policy_frequency: 10, ..HighwayConfig::default() })]
    #[case::empty_speed_range(HighwayConfig { reward_speed_range: [30.0, 20.0], ..HighwayConfig::default() })]
    #[case::no_scaling(HighwayConfig { scaling: 0.0, ..HighwayConfig::default() })]
    fn invalid_configs_rejected(#[case] config: HighwayConfig) {
        assert!(matches!(
            HighwayEnv::new(config),
            Err(EnvError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_deserializes_partial_json() {
        let config: HighwayConfig =
            serde_json::from_str(r#"{"lanes_count": 4, "collision_reward": -8.0}"#).unwrap();
        assert_eq!(config.lanes_count, 4);
        assert_eq!(config.collision_reward, -8.0);
        assert_eq!(config.vehicles_count, HighwayConfig::default().vehicles_count);
    }

    #[test]
    fn meta_action_indices() {
        for i in 0..MetaAction::SIZE {
            assert_eq!(MetaAction::from_index(i).unwrap().as_index(), i);
        }
        assert_eq!(MetaAction::from_index(5), None);
        assert_eq!(MetaAction::Idle.as_index(), 1);
    }

    #[rstest]
    fn initial_state_layout(env: HighwayEnv) {
        let mut rng = Prng::seed_from_u64(1);
        let state = env.initial_state(&mut rng);
        assert_eq!(state.vehicles.len(), 21);
        assert_eq!(state.ego().driver, Driver::Agent);
        assert_eq!(state.ego().speed, EGO_INITIAL_SPEED);
        for pair in state.vehicles.windows(2) {
            assert!(pair[1].position[0] > pair[0].position[0]);
        }
        let obs = env.observe(&state, &mut rng);
        assert!(env.observation_space().contains(&obs));
    }

    #[rstest]
    fn same_seed_same_initial_state(env: HighwayEnv) {
        let a = env.initial_state(&mut Prng::seed_from_u64(42));
        let b = env.initial_state(&mut Prng::seed_from_u64(42));
        let c = env.initial_state(&mut Prng::seed_from_u64(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[rstest]
    fn faster_and_slower_change_target_speed(env: HighwayEnv) {
        let mut ego = Vehicle::new(env.road(), 1, 0.0, 25.0, Driver::Agent);
        env.apply_action(&mut ego, MetaAction::Faster);
        assert_eq!(ego.target_speed, 30.0);
        env.apply_action(&mut ego, MetaAction::Slower);
        assert_eq!(ego.target_speed, 20.0);
        ego.speed = 30.0;
        env.apply_action(&mut ego, MetaAction::Faster);
        assert_eq!(ego.target_speed, 30.0);
    }

    #[rstest]
    fn reward_bounds(env: HighwayEnv) {
        let mut state = env.initial_state(&mut Prng::seed_from_u64(0));
        let (min, max) = env.reward_range();
        assert_eq!((min, max), (0.0, 1.0));

        // Fastest on the right-most lane
        let lane = env.road().lanes - 1;
        state.vehicles[0] = Vehicle::new(env.road(), lane, 0.0, 30.0, Driver::Agent);
        assert!((env.reward(&state, MetaAction::Idle) - 1.0).abs() < 1e-9);

        state.vehicles[0].crashed = true;
        state.vehicles[0].speed = 0.0;
        state.vehicles[0].target_lane = 0;
        state.vehicles[0].position[1] = 0.0;
        assert!(env.reward(&state, MetaAction::Idle).abs() < 1e-9);
    }

    #[rstest]
    fn episode_truncated_at_duration(env: HighwayEnv) {
        let mut rng = Prng::seed_from_u64(3);
        let mut state = env.initial_state(&mut rng);
        // No traffic: the ego vehicle can never crash
        state.vehicles.truncate(1);
        let max_steps = env.config().max_episode_steps();
        for step in 1..=max_steps {
            let (successor, reward) = env.step(state, &MetaAction::Idle, &mut rng, &mut ());
            let (min, max) = env.reward_range();
            assert!(reward >= min && reward <= max);
            if step < max_steps {
                state = match successor {
                    Successor::Continue(s) => s,
                    other => panic!("episode ended early at step {}: {:?}", step, other),
                };
            } else {
                assert!(matches!(successor, Successor::Interrupt(_)));
                return;
            }
        }
        unreachable!()
    }

    #[rstest]
    fn collision_terminates(env: HighwayEnv) {
        let road = *env.road();
        let state = HighwayState {
            vehicles: vec![
                Vehicle::new(&road, 1, 0.0, 30.0, Driver::Agent),
                Vehicle::new(&road, 1, 6.0, 0.0, Driver::Traffic),
            ],
            steps: 0,
        };
        let mut rng = Prng::seed_from_u64(0);
        let (successor, reward) = env.step(state, &MetaAction::Idle, &mut rng, &mut ());
        assert!(successor.is_terminal());
        assert!(successor.inner().ego().crashed);
        assert!(successor.inner().vehicles[1].crashed);
        assert!(reward < 0.5);
    }

    #[rstest]
    fn random_actions_stay_in_bounds(env: HighwayEnv) {
        let mut rng = Prng::seed_from_u64(9);
        let mut state = env.initial_state(&mut rng);
        let space = env.action_space();
        for _ in 0..env.config().max_episode_steps() {
            let action = space.sample(&mut rng);
            let (successor, _) = env.step(state, &action, &mut rng, &mut ());
            assert!(env.observation_space().contains(&env.observe(successor.inner(), &mut rng)));
            match successor {
                Successor::Continue(s) => state = s,
                _ => return,
            }
        }
    }
}
