//! Straight multi-lane road geometry.
use serde::{Deserialize, Serialize};

/// Width of each lane (m).
pub const LANE_WIDTH: f64 = 4.0;
/// Speed limit on every lane (m/s).
pub const SPEED_LIMIT: f64 = 30.0;

/// A straight road of parallel lanes along the x axis.
///
/// Lane 0 is the leftmost lane and is centred on `y = 0`;
/// lane `i` is centred on `y = i * LANE_WIDTH`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Road {
    pub lanes: usize,
}

impl Road {
    pub const fn new(lanes: usize) -> Self {
        Self { lanes }
    }

    /// Lateral coordinate of the centre of a lane.
    #[inline]
    pub fn lane_center(&self, lane: usize) -> f64 {
        lane as f64 * LANE_WIDTH
    }

    /// The lane whose centre is closest to lateral coordinate `y`.
    pub fn lane_index(&self, y: f64) -> usize {
        let nearest = (y / LANE_WIDTH).round();
        if nearest <= 0.0 {
            0
        } else {
            (nearest as usize).min(self.lanes.saturating_sub(1))
        }
    }

    /// Whether `y` lies within `margin` of the given lane.
    pub fn on_lane(&self, lane: usize, y: f64, margin: f64) -> bool {
        (y - self.lane_center(lane)).abs() <= LANE_WIDTH / 2.0 + margin
    }

    /// Whether `y` lies within the road surface.
    pub fn on_road(&self, y: f64) -> bool {
        let min = -LANE_WIDTH / 2.0;
        let max = self.lane_center(self.lanes.saturating_sub(1)) + LANE_WIDTH / 2.0;
        (min..=max).contains(&y)
    }

    /// The lanes directly to the left and right of `lane`, if they exist.
    pub fn side_lanes(&self, lane: usize) -> impl Iterator<Item = usize> {
        let left = lane.checked_sub(1);
        let right = Some(lane + 1).filter(|l| *l < self.lanes);
        left.into_iter().chain(right)
    }

    /// Total width of the road surface (m).
    pub fn width(&self) -> f64 {
        self.lanes as f64 * LANE_WIDTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-3.0, 0)]
    #[case(0.0, 0)]
    #[case(1.9, 0)]
    #[case(2.1, 1)]
    #[case(8.0, 2)]
    #[case(40.0, 3)]
    fn lane_index(#[case] y: f64, #[case] expected: usize) {
        assert_eq!(Road::new(4).lane_index(y), expected);
    }

    #[test]
    fn on_road_bounds() {
        let road = Road::new(3);
        assert!(road.on_road(-2.0));
        assert!(road.on_road(10.0));
        assert!(!road.on_road(-2.1));
        assert!(!road.on_road(10.1));
    }

    #[test]
    fn side_lanes() {
        let road = Road::new(3);
        assert_eq!(road.side_lanes(0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(road.side_lanes(1).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(road.side_lanes(2).collect::<Vec<_>>(), vec![1]);
        assert_eq!(Road::new(1).side_lanes(0).count(), 0);
    }
}
