//! Vehicle kinematics and driver models.
//!
//! Traffic is driven by the Intelligent Driver Model (IDM) for longitudinal control
//! and by MOBIL for lane changes. The ego vehicle follows high-level [`MetaAction`]s
//! that set a target lane and a target speed, tracked by proportional controllers.
//!
//! [`MetaAction`]: super::MetaAction
use super::road::{Road, LANE_WIDTH, SPEED_LIMIT};
use crate::Prng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_3, FRAC_PI_4, PI};

/// Vehicle length (m).
pub const VEHICLE_LENGTH: f64 = 5.0;
/// Vehicle width (m).
pub const VEHICLE_WIDTH: f64 = 2.0;
/// Maximum absolute speed of any vehicle (m/s).
pub const MAX_SPEED: f64 = 40.0;
/// Speeds selectable by the ego vehicle with `Faster` / `Slower` (m/s).
pub const TARGET_SPEEDS: [f64; 3] = [20.0, 25.0, 30.0];
/// Initial speed of the ego vehicle (m/s).
pub const EGO_INITIAL_SPEED: f64 = 25.0;

// Low-level controller time constants (s)
const TAU_ACC: f64 = 0.6;
const TAU_HEADING: f64 = 0.2;
const TAU_LATERAL: f64 = 0.6;
const TAU_PURSUIT: f64 = 0.5 * TAU_HEADING;
const MAX_STEERING_ANGLE: f64 = FRAC_PI_3;

/// Intelligent Driver Model parameters.
pub mod idm {
    use super::VEHICLE_LENGTH;
    /// Maximum acceleration (m/s²)
    pub const ACC_MAX: f64 = 6.0;
    /// Desired maximum acceleration (m/s²)
    pub const COMFORT_ACC_MAX: f64 = 3.0;
    /// Desired maximum deceleration (m/s²), negative
    pub const COMFORT_ACC_MIN: f64 = -5.0;
    /// Desired jam distance to the front vehicle, centre to centre (m)
    pub const DISTANCE_WANTED: f64 = 5.0 + VEHICLE_LENGTH;
    /// Desired time gap to the front vehicle (s)
    pub const TIME_WANTED: f64 = 1.5;
    /// Velocity exponent
    pub const DELTA: f64 = 4.0;
}

/// MOBIL lane-change parameters.
pub mod mobil {
    /// Weight given to the acceleration change of other vehicles
    pub const POLITENESS: f64 = 0.0;
    /// Minimum acceleration gain required for a lane change (m/s²)
    pub const LANE_CHANGE_MIN_ACC_GAIN: f64 = 0.2;
    /// Maximum braking imposed on the new follower (m/s²)
    pub const LANE_CHANGE_MAX_BRAKING_IMPOSED: f64 = 2.0;
    /// Time between lane change decisions (s)
    pub const LANE_CHANGE_DELAY: f64 = 1.0;
}

/// Who decides the vehicle's targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Driver {
    /// Controlled by the agent through meta-actions.
    Agent,
    /// Autonomous traffic (IDM + MOBIL).
    Traffic,
}

/// Low-level control inputs.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Control {
    /// Longitudinal acceleration (m/s²)
    pub acceleration: f64,
    /// Front wheel steering angle (rad)
    pub steering: f64,
}

/// A vehicle on the road.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Centre position `[x, y]` (m)
    pub position: [f64; 2],
    /// Heading angle relative to the road direction (rad)
    pub heading: f64,
    /// Forward speed (m/s)
    pub speed: f64,
    /// The lane closest to the vehicle.
    pub lane: usize,
    /// The lane the vehicle is steering towards.
    pub target_lane: usize,
    /// The speed the vehicle is accelerating towards (m/s).
    pub target_speed: f64,
    pub crashed: bool,
    pub driver: Driver,
    /// Time since the last lane change decision (s)
    lane_change_timer: f64,
}

impl Vehicle {
    /// A vehicle driving straight at the centre of `lane`.
    pub fn new(road: &Road, lane: usize, x: f64, speed: f64, driver: Driver) -> Self {
        Self {
            position: [x, road.lane_center(lane)],
            heading: 0.0,
            speed,
            lane,
            target_lane: lane,
            target_speed: speed,
            crashed: false,
            driver,
            lane_change_timer: 0.0,
        }
    }

    /// Create a vehicle ahead of all the `existing` vehicles.
    ///
    /// # Args
    /// * `speed` - Initial speed. Sampled from `[0.7, 0.8]` times the speed limit if `None`.
    /// * `lane` - Lane index. Sampled uniformly if `None`.
    /// * `spacing` - Ratio of the gap to the vehicle behind relative to the default gap.
    pub fn create_random(
        road: &Road,
        existing: &[Self],
        speed: Option<f64>,
        lane: Option<usize>,
        spacing: f64,
        driver: Driver,
        rng: &mut Prng,
    ) -> Self {
        let lane = lane.unwrap_or_else(|| rng.gen_range(0..road.lanes));
        let speed =
            speed.unwrap_or_else(|| rng.gen_range(0.7 * SPEED_LIMIT..0.8 * SPEED_LIMIT));
        let default_spacing = 12.0 + speed;
        let offset = spacing * default_spacing * (-5.0 / 40.0 * road.lanes as f64).exp();
        let x0 = existing
            .iter()
            .map(|v| v.position[0])
            .reduce(f64::max)
            .unwrap_or(3.0 * offset);
        let x = x0 + offset * rng.gen_range(0.9..1.1);
        Self::new(road, lane, x, speed, driver)
    }

    /// Velocity vector `[vx, vy]` (m/s).
    pub fn velocity(&self) -> [f64; 2] {
        [
            self.speed * self.heading.cos(),
            self.speed * self.heading.sin(),
        ]
    }

    /// Longitudinal distance to another vehicle, positive if it is ahead.
    #[inline]
    pub fn lane_distance_to(&self, other: &Self) -> f64 {
        other.position[0] - self.position[0]
    }

    /// Speed along the road direction (m/s).
    pub fn forward_speed(&self) -> f64 {
        self.speed * self.heading.cos()
    }

    /// Steering angle that tracks the centre of the target lane.
    pub fn steering_control(&self, road: &Road) -> f64 {
        let lateral = self.position[1] - road.lane_center(self.target_lane);
        let lateral_speed_command = -lateral / TAU_LATERAL;
        let heading_command = (lateral_speed_command / not_zero(self.speed))
            .clamp(-1.0, 1.0)
            .asin();
        // The road is straight so the future lane heading is always zero
        let heading_ref = heading_command.clamp(-FRAC_PI_4, FRAC_PI_4);
        let heading_rate_command = wrap_to_pi(heading_ref - self.heading) / TAU_HEADING;
        let slip_angle = (VEHICLE_LENGTH / 2.0 / not_zero(self.speed) * heading_rate_command)
            .clamp(-1.0, 1.0)
            .asin();
        (2.0 * slip_angle.tan())
            .atan()
            .clamp(-MAX_STEERING_ANGLE, MAX_STEERING_ANGLE)
    }

    /// Acceleration that tracks the target speed.
    pub fn speed_control(&self) -> f64 {
        (self.target_speed - self.speed) / TAU_ACC
    }

    /// Request a change of target lane by `delta` lanes.
    ///
    /// The request is ignored if the lane does not exist or is too far away laterally.
    pub fn change_target_lane(&mut self, road: &Road, delta: isize) {
        let max_lane = road.lanes.saturating_sub(1) as isize;
        let lane = (self.target_lane as isize + delta).clamp(0, max_lane) as usize;
        if (self.position[1] - road.lane_center(lane)).abs() <= 2.0 * LANE_WIDTH {
            self.target_lane = lane;
        }
    }

    /// Index of the target speed closest to the current speed.
    pub fn speed_index(&self) -> usize {
        let first = TARGET_SPEEDS[0];
        let last = TARGET_SPEEDS[TARGET_SPEEDS.len() - 1];
        let x = (self.speed - first) / (last - first);
        let index = (x * (TARGET_SPEEDS.len() - 1) as f64).round();
        index.clamp(0.0, (TARGET_SPEEDS.len() - 1) as f64) as usize
    }

    /// Integrate the kinematic bicycle model for `dt` seconds.
    pub fn step(&mut self, control: Control, road: &Road, dt: f64) {
        let Control {
            mut acceleration,
            mut steering,
        } = control;
        if self.crashed {
            steering = 0.0;
            acceleration = -self.speed;
        }
        if self.speed > MAX_SPEED {
            acceleration = acceleration.min(MAX_SPEED - self.speed);
        } else if self.speed < -MAX_SPEED {
            acceleration = acceleration.max(-MAX_SPEED - self.speed);
        }

        let beta = (0.5 * steering.tan()).atan();
        self.position[0] += self.speed * (self.heading + beta).cos() * dt;
        self.position[1] += self.speed * (self.heading + beta).sin() * dt;
        self.heading += self.speed * beta.sin() / (VEHICLE_LENGTH / 2.0) * dt;
        self.speed += acceleration * dt;
        self.lane = road.lane_index(self.position[1]);
        if self.driver == Driver::Traffic {
            self.lane_change_timer += dt;
        }
    }

    /// Corners of the vehicle's bounding rectangle.
    pub fn corners(&self) -> [[f64; 2]; 4] {
        let (sin, cos) = self.heading.sin_cos();
        let half_l = VEHICLE_LENGTH / 2.0;
        let half_w = VEHICLE_WIDTH / 2.0;
        let [x, y] = self.position;
        [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)].map(|(l, w)| {
            let dx = l * half_l;
            let dy = w * half_w;
            [x + dx * cos - dy * sin, y + dx * sin + dy * cos]
        })
    }

    /// Whether the bounding rectangles of two vehicles overlap.
    pub fn intersects(&self, other: &Self) -> bool {
        let dx = other.position[0] - self.position[0];
        let dy = other.position[1] - self.position[1];
        if dx.hypot(dy) > VEHICLE_LENGTH.hypot(VEHICLE_WIDTH) {
            return false;
        }
        let a = self.corners();
        let b = other.corners();
        // Separating axis test over the edge normals of both rectangles
        [self.heading, other.heading].iter().all(|&heading| {
            let (sin, cos) = heading.sin_cos();
            [[cos, sin], [-sin, cos]].iter().all(|axis| {
                let (a_min, a_max) = project(&a, *axis);
                let (b_min, b_max) = project(&b, *axis);
                a_min < b_max && b_min < a_max
            })
        })
    }

    /// Update the target lane of a traffic vehicle with MOBIL.
    ///
    /// `index` is the position of this vehicle in `vehicles`.
    pub fn lane_change_decision(&self, index: usize, vehicles: &[Self], road: &Road) -> usize {
        if self.lane != self.target_lane {
            // Abort if someone else is merging into the same lane just ahead
            for (i, other) in vehicles.iter().enumerate() {
                if i != index
                    && other.lane != self.target_lane
                    && other.target_lane == self.target_lane
                {
                    let d = self.lane_distance_to(other);
                    if 0.0 < d && d < desired_gap(self, other) {
                        return self.lane;
                    }
                }
            }
            return self.target_lane;
        }
        if self.lane_change_timer <= mobil::LANE_CHANGE_DELAY || self.speed.abs() < 1.0 {
            return self.target_lane;
        }
        let mut target = self.target_lane;
        for lane in road.side_lanes(self.lane) {
            if self.mobil(index, lane, vehicles, road) {
                target = lane;
            }
        }
        target
    }

    /// Whether a lane change of a traffic vehicle is both safe and advantageous.
    fn mobil(&self, index: usize, lane: usize, vehicles: &[Self], road: &Road) -> bool {
        let get = |i: Option<usize>| i.map(|i| &vehicles[i]);

        let (new_preceding, new_following) =
            neighbours(vehicles, road, index, self.position[0], lane);
        let (new_preceding, new_following) = (get(new_preceding), get(new_following));
        let new_following_a = idm_acceleration(new_following, new_preceding);
        let new_following_pred_a = idm_acceleration(new_following, Some(self));
        if new_following_pred_a < -mobil::LANE_CHANGE_MAX_BRAKING_IMPOSED {
            return false;
        }

        let (old_preceding, old_following) =
            neighbours(vehicles, road, index, self.position[0], self.lane);
        let (old_preceding, old_following) = (get(old_preceding), get(old_following));
        let self_pred_a = idm_acceleration(Some(self), new_preceding);
        let self_a = idm_acceleration(Some(self), old_preceding);
        let old_following_a = idm_acceleration(old_following, Some(self));
        let old_following_pred_a = idm_acceleration(old_following, old_preceding);
        let jerk = self_pred_a - self_a
            + mobil::POLITENESS
                * (new_following_pred_a - new_following_a + old_following_pred_a
                    - old_following_a);
        jerk >= mobil::LANE_CHANGE_MIN_ACC_GAIN
    }

    /// Control inputs of a traffic vehicle.
    pub fn traffic_control(&self, index: usize, vehicles: &[Self], road: &Road) -> Control {
        let (front, _) = neighbours(vehicles, road, index, self.position[0], self.lane);
        let mut acceleration = idm_acceleration(Some(self), front.map(|i| &vehicles[i]));
        if self.lane != self.target_lane {
            let (front, _) =
                neighbours(vehicles, road, index, self.position[0], self.target_lane);
            acceleration =
                acceleration.min(idm_acceleration(Some(self), front.map(|i| &vehicles[i])));
        }
        Control {
            acceleration: acceleration.clamp(-idm::ACC_MAX, idm::ACC_MAX),
            steering: self.steering_control(road),
        }
    }

    /// Control inputs of the agent-driven vehicle.
    pub fn agent_control(&self, road: &Road) -> Control {
        Control {
            acceleration: self.speed_control(),
            steering: self.steering_control(road),
        }
    }
}

/// Make the lane change decisions of all traffic vehicles.
pub fn update_lane_targets(vehicles: &mut [Vehicle], road: &Road) {
    let targets: Vec<usize> = vehicles
        .iter()
        .enumerate()
        .map(|(i, v)| match v.driver {
            Driver::Traffic => v.lane_change_decision(i, vehicles, road),
            Driver::Agent => v.target_lane,
        })
        .collect();
    for (v, target) in vehicles.iter_mut().zip(targets) {
        if v.driver == Driver::Traffic
            && v.lane == v.target_lane
            && v.lane_change_timer > mobil::LANE_CHANGE_DELAY
        {
            v.lane_change_timer = 0.0;
        }
        v.target_lane = target;
    }
}

/// The closest vehicles ahead and behind a longitudinal position on a lane.
///
/// The vehicle at index `skip` is ignored.
/// Vehicles count as being on the lane if their centre is within 1 m of its edges.
pub fn neighbours(
    vehicles: &[Vehicle],
    road: &Road,
    skip: usize,
    x: f64,
    lane: usize,
) -> (Option<usize>, Option<usize>) {
    let mut front: Option<(usize, f64)> = None;
    let mut rear: Option<(usize, f64)> = None;
    for (i, v) in vehicles.iter().enumerate() {
        if i == skip || !road.on_lane(lane, v.position[1], 1.0) {
            continue;
        }
        let s = v.position[0];
        if x <= s {
            if front.map_or(true, |(_, best)| s <= best) {
                front = Some((i, s));
            }
        } else if rear.map_or(true, |(_, best)| s > best) {
            rear = Some((i, s));
        }
    }
    (front.map(|(i, _)| i), rear.map(|(i, _)| i))
}

/// IDM acceleration of `vehicle` when following `front`.
///
/// Zero if there is no vehicle.
pub fn idm_acceleration(vehicle: Option<&Vehicle>, front: Option<&Vehicle>) -> f64 {
    let vehicle = match vehicle {
        Some(v) => v,
        None => return 0.0,
    };
    let speed_ratio = vehicle.speed.max(0.0) / not_zero(vehicle.target_speed).abs();
    let mut acceleration = idm::COMFORT_ACC_MAX * (1.0 - speed_ratio.powf(idm::DELTA));
    if let Some(front) = front {
        let d = vehicle.lane_distance_to(front);
        acceleration -= idm::COMFORT_ACC_MAX * (desired_gap(vehicle, front) / not_zero(d)).powi(2);
    }
    acceleration
}

/// Desired distance from `vehicle` to `front` (m).
pub fn desired_gap(vehicle: &Vehicle, front: &Vehicle) -> f64 {
    let ab = -idm::COMFORT_ACC_MAX * idm::COMFORT_ACC_MIN;
    let dv = vehicle.speed - front.speed;
    idm::DISTANCE_WANTED + vehicle.speed * idm::TIME_WANTED + vehicle.speed * dv / (2.0 * ab.sqrt())
}

fn project(corners: &[[f64; 2]; 4], axis: [f64; 2]) -> (f64, f64) {
    corners
        .iter()
        .map(|c| c[0] * axis[0] + c[1] * axis[1])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p), hi.max(p))
        })
}

fn not_zero(x: f64) -> f64 {
    const EPS: f64 = 1e-2;
    if x.abs() > EPS {
        x
    } else if x >= 0.0 {
        EPS
    } else {
        -EPS
    }
}

fn wrap_to_pi(x: f64) -> f64 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rstest::rstest;

    fn road() -> Road {
        Road::new(3)
    }

    #[test]
    fn idm_free_road_accelerates_to_target() {
        let mut v = Vehicle::new(&road(), 1, 0.0, 20.0, Driver::Traffic);
        v.target_speed = 25.0;
        assert!(idm_acceleration(Some(&v), None) > 0.0);
        v.speed = 25.0;
        assert!(idm_acceleration(Some(&v), None).abs() < 1e-9);
    }

    #[test]
    fn idm_brakes_behind_slower_leader() {
        let road = road();
        let follower = Vehicle::new(&road, 1, 0.0, 25.0, Driver::Traffic);
        let leader = Vehicle::new(&road, 1, 15.0, 10.0, Driver::Traffic);
        let acceleration = idm_acceleration(Some(&follower), Some(&leader));
        assert!(acceleration < idm::COMFORT_ACC_MIN, "{}", acceleration);
    }

    #[test]
    fn idm_without_vehicle_is_zero() {
        assert_eq!(idm_acceleration(None, None), 0.0);
    }

    #[test]
    fn traffic_control_clips_acceleration() {
        let road = road();
        let vehicles = vec![
            Vehicle::new(&road, 1, 0.0, 30.0, Driver::Traffic),
            Vehicle::new(&road, 1, 6.0, 0.0, Driver::Traffic),
        ];
        let control = vehicles[0].traffic_control(0, &vehicles, &road);
        assert_eq!(control.acceleration, -idm::ACC_MAX);
    }

    #[test]
    fn neighbours_front_and_rear() {
        let road = road();
        let vehicles = vec![
            Vehicle::new(&road, 1, 50.0, 20.0, Driver::Traffic),
            Vehicle::new(&road, 1, 80.0, 20.0, Driver::Traffic),
            Vehicle::new(&road, 1, 20.0, 20.0, Driver::Traffic),
            Vehicle::new(&road, 2, 60.0, 20.0, Driver::Traffic),
            Vehicle::new(&road, 1, 10.0, 20.0, Driver::Traffic),
        ];
        assert_eq!(neighbours(&vehicles, &road, 0, 50.0, 1), (Some(1), Some(2)));
        assert_eq!(neighbours(&vehicles, &road, 0, 50.0, 2), (Some(3), None));
        assert_eq!(neighbours(&vehicles, &road, 0, 50.0, 0), (None, None));
    }

    #[test]
    fn steering_tracks_target_lane() {
        let road = road();
        let mut v = Vehicle::new(&road, 1, 0.0, 25.0, Driver::Agent);
        assert_eq!(v.steering_control(&road), 0.0);
        v.change_target_lane(&road, 1);
        assert_eq!(v.target_lane, 2);
        // Lane 2 is at larger y so the vehicle steers towards positive heading
        assert!(v.steering_control(&road) > 0.0);
        for _ in 0..150 {
            let control = v.agent_control(&road);
            v.step(control, &road, 1.0 / 15.0);
        }
        assert_eq!(v.lane, 2);
        assert!((v.position[1] - road.lane_center(2)).abs() < 0.1);
    }

    #[rstest]
    #[case(0, -1, 0)]
    #[case(0, 1, 1)]
    #[case(2, 1, 2)]
    fn change_target_lane_clamps(
        #[case] lane: usize,
        #[case] delta: isize,
        #[case] expected: usize,
    ) {
        let road = road();
        let mut v = Vehicle::new(&road, lane, 0.0, 25.0, Driver::Agent);
        v.change_target_lane(&road, delta);
        assert_eq!(v.target_lane, expected);
    }

    #[rstest]
    #[case(15.0, 0)]
    #[case(22.0, 0)]
    #[case(23.0, 1)]
    #[case(25.0, 1)]
    #[case(35.0, 2)]
    fn speed_index(#[case] speed: f64, #[case] expected: usize) {
        let v = Vehicle::new(&road(), 0, 0.0, speed, Driver::Agent);
        assert_eq!(v.speed_index(), expected);
    }

    #[test]
    fn crashed_vehicle_stops() {
        let road = road();
        let mut v = Vehicle::new(&road, 0, 0.0, 20.0, Driver::Traffic);
        v.crashed = true;
        for _ in 0..50 {
            v.step(
                Control {
                    acceleration: 3.0,
                    steering: 0.0,
                },
                &road,
                0.1,
            );
        }
        assert!(v.speed < 0.2);
    }

    #[test]
    fn intersects() {
        let road = road();
        let a = Vehicle::new(&road, 1, 0.0, 20.0, Driver::Agent);
        let b = Vehicle::new(&road, 1, 4.9, 20.0, Driver::Traffic);
        let c = Vehicle::new(&road, 1, 5.1, 20.0, Driver::Traffic);
        let d = Vehicle::new(&road, 2, 0.0, 20.0, Driver::Traffic);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!a.intersects(&d));
    }

    #[test]
    fn create_random_places_ahead() {
        let road = road();
        let mut rng = Prng::seed_from_u64(0);
        let mut vehicles = Vec::new();
        for _ in 0..10 {
            let v = Vehicle::create_random(
                &road,
                &vehicles,
                None,
                None,
                1.0,
                Driver::Traffic,
                &mut rng,
            );
            assert!((21.0..24.0).contains(&v.speed));
            assert!(v.lane < road.lanes);
            if let Some(last) = vehicles.last() {
                assert!(v.position[0] > last.position[0]);
            }
            vehicles.push(v);
        }
    }

    #[test]
    fn mobil_changes_out_of_blocked_lane() {
        let road = road();
        let mut vehicles = vec![
            Vehicle::new(&road, 1, 0.0, 25.0, Driver::Traffic),
            Vehicle::new(&road, 1, 20.0, 5.0, Driver::Traffic),
            // Blocks the left lane
            Vehicle::new(&road, 0, 2.0, 25.0, Driver::Traffic),
        ];
        vehicles[0].lane_change_timer = 2.0;
        assert_eq!(vehicles[0].lane_change_decision(0, &vehicles, &road), 2);
    }
}
