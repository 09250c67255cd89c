//! Kinematics observation of the nearby traffic.
use super::road::{Road, SPEED_LIMIT};
use super::vehicle::{Vehicle, MAX_SPEED};
use crate::spaces::{FeatureSpace, Space};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Number of features per observed vehicle: presence, x, y, vx, vy.
pub const NUM_VEHICLE_FEATURES: usize = 5;

/// Vehicles further than this from the ego vehicle are not observed (m).
pub const PERCEPTION_DISTANCE: f64 = 5.0 * MAX_SPEED;

/// Space of kinematics observations.
///
/// Each element is a `vehicles × 5` array with rows `[presence, x, y, vx, vy]`,
/// every entry in `[-1, 1]`.
/// Row 0 describes the ego vehicle: its longitudinal position is always `0`,
/// the remaining entries are absolute.
/// The following rows describe the nearest other vehicles sorted by distance,
/// with positions and velocities relative to the ego vehicle.
/// Rows without a vehicle are all zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KinematicsSpace {
    /// Number of observed vehicles, including the ego vehicle.
    pub vehicles: usize,
}

impl KinematicsSpace {
    pub const fn new(vehicles: usize) -> Self {
        Self { vehicles }
    }

    /// Observe the road from the point of view of `vehicles[ego]`.
    pub fn observe(&self, road: &Road, vehicles: &[Vehicle], ego: usize) -> Array2<f32> {
        let mut obs = Array2::zeros((self.vehicles, NUM_VEHICLE_FEATURES));
        if self.vehicles == 0 {
            return obs;
        }
        let ranges = FeatureRanges::new(road);
        let ego_vehicle = &vehicles[ego];
        let [ego_vx, ego_vy] = ego_vehicle.velocity();
        let ego_row = [
            1.0,
            0.0,
            ranges.y(ego_vehicle.position[1]),
            ranges.v(ego_vx),
            ranges.v(ego_vy),
        ];
        for (o, x) in obs.row_mut(0).iter_mut().zip(ego_row) {
            *o = x as f32;
        }

        let mut others: Vec<(f64, &Vehicle)> = vehicles
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != ego)
            .map(|(_, v)| {
                let dx = v.position[0] - ego_vehicle.position[0];
                let dy = v.position[1] - ego_vehicle.position[1];
                (dx.hypot(dy), v)
            })
            .filter(|(distance, _)| *distance < PERCEPTION_DISTANCE)
            .collect();
        others.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (mut row, (_, v)) in obs.rows_mut().into_iter().skip(1).zip(others) {
            let [vx, vy] = v.velocity();
            let values = [
                1.0,
                ranges.x(v.position[0] - ego_vehicle.position[0]),
                ranges.y(v.position[1] - ego_vehicle.position[1]),
                ranges.v(vx - ego_vx),
                ranges.v(vy - ego_vy),
            ];
            for (o, x) in row.iter_mut().zip(values) {
                *o = x as f32;
            }
        }
        obs
    }
}

impl Space for KinematicsSpace {
    type Element = Array2<f32>;

    fn contains(&self, value: &Self::Element) -> bool {
        value.dim() == (self.vehicles, NUM_VEHICLE_FEATURES)
            && value.iter().all(|x| (-1.0..=1.0).contains(x))
    }
}

impl FeatureSpace for KinematicsSpace {
    fn num_features(&self) -> usize {
        self.vehicles * NUM_VEHICLE_FEATURES
    }

    fn features_out(&self, element: &Self::Element, out: &mut [f32]) {
        assert_eq!(out.len(), self.num_features(), "output slice size mismatch");
        for (o, x) in out.iter_mut().zip(element.iter()) {
            *o = *x;
        }
    }
}

/// Normalization of raw feature values to `[-1, 1]`.
struct FeatureRanges {
    x_max: f64,
    y_max: f64,
    v_max: f64,
}

impl FeatureRanges {
    fn new(road: &Road) -> Self {
        Self {
            x_max: 5.0 * SPEED_LIMIT,
            y_max: road.width(),
            v_max: 2.0 * SPEED_LIMIT,
        }
    }

    fn x(&self, x: f64) -> f64 {
        normalize(x, self.x_max)
    }

    fn y(&self, y: f64) -> f64 {
        normalize(y, self.y_max)
    }

    fn v(&self, v: f64) -> f64 {
        normalize(v, self.v_max)
    }
}

/// Map `[-max, max]` onto `[-1, 1]`, clipping.
fn normalize(value: f64, max: f64) -> f64 {
    (value / max).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::super::vehicle::Driver;
    use super::*;

    fn vehicles(road: &Road) -> Vec<Vehicle> {
        vec![
            Vehicle::new(road, 1, 100.0, 25.0, Driver::Agent),
            Vehicle::new(road, 1, 400.0, 20.0, Driver::Traffic),
            Vehicle::new(road, 2, 130.0, 20.0, Driver::Traffic),
            Vehicle::new(road, 0, 90.0, 30.0, Driver::Traffic),
        ]
    }

    #[test]
    fn ego_row_absolute() {
        let road = Road::new(3);
        let obs = KinematicsSpace::new(5).observe(&road, &vehicles(&road), 0);
        let expected = [1.0, 0.0, 4.0 / 12.0, 25.0 / 60.0, 0.0];
        for (x, y) in obs.row(0).iter().zip(expected) {
            assert!((x - y).abs() < 1e-6, "{} != {}", x, y);
        }
    }

    #[test]
    fn others_sorted_by_distance_and_relative() {
        let road = Road::new(3);
        let obs = KinematicsSpace::new(5).observe(&road, &vehicles(&road), 0);
        // Nearest first: the vehicle 10 m behind, then the one 30 m ahead.
        assert_eq!(obs[[1, 0]], 1.0);
        assert!((obs[[1, 1]] - (-10.0 / 150.0)).abs() < 1e-6);
        assert!((obs[[1, 2]] - (-4.0 / 12.0)).abs() < 1e-6);
        assert!((obs[[1, 3]] - (5.0 / 60.0)).abs() < 1e-6);
        assert!((obs[[2, 1]] - (30.0 / 150.0)).abs() < 1e-6);
        // The vehicle 300 m ahead is out of range
        assert_eq!(obs.row(3).to_vec(), vec![0.0; 5]);
        assert_eq!(obs.row(4).to_vec(), vec![0.0; 5]);
    }

    #[test]
    fn observation_in_space() {
        let road = Road::new(3);
        let space = KinematicsSpace::new(5);
        let obs = space.observe(&road, &vehicles(&road), 0);
        assert!(space.contains(&obs));
        assert!(!KinematicsSpace::new(4).contains(&obs));
        assert_eq!(space.features(&obs).len(), 25);
        assert_eq!(space.features(&obs)[..5], obs.row(0).to_vec()[..]);
    }

    #[test]
    fn truncates_to_vehicle_count() {
        let road = Road::new(3);
        let obs = KinematicsSpace::new(2).observe(&road, &vehicles(&road), 0);
        assert_eq!(obs.dim(), (2, NUM_VEHICLE_FEATURES));
    }
}
