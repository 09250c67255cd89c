//! Rendering: top-down frames of the highway, labels, GIF and plot output.
mod canvas;
mod gif;
mod label;
mod plot;

pub use gif::{save_gif, write_gif};
pub use label::{add_label, draw_text, text_size};
pub use plot::{reward_curve, save_reward_curve};

use crate::envs::highway::{Road, Vehicle, LANE_WIDTH};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Error producing image output.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("no frames to encode")]
    NoFrames,
    #[error("frame rate must be positive")]
    InvalidFrameRate,
}

const BACKGROUND: Rgb<u8> = Rgb([100, 100, 100]);
const LANE_MARKING: Rgb<u8> = Rgb([255, 255, 255]);
const EGO_COLOR: Rgb<u8> = Rgb([50, 200, 0]);
const TRAFFIC_COLOR: Rgb<u8> = Rgb([100, 200, 255]);
const CRASHED_COLOR: Rgb<u8> = Rgb([255, 100, 100]);
const OUTLINE: Rgb<u8> = Rgb([60, 60, 60]);

// Lane marking geometry (m)
const STRIPE_LENGTH: f64 = 3.0;
const STRIPE_SPACING: f64 = 4.33 + STRIPE_LENGTH;
const STRIPE_WIDTH: f64 = 0.3;

/// Frame size and the mapping from world coordinates to pixels.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Frame width (pixels)
    pub width: u32,
    /// Frame height (pixels)
    pub height: u32,
    /// Pixels per metre
    pub scaling: f64,
    /// Position of the followed vehicle as a fraction of the frame width and height.
    pub centering: [f64; 2],
}

impl Viewport {
    /// World position shown at the top left pixel when following `focus`.
    fn origin(&self, focus: [f64; 2]) -> [f64; 2] {
        [
            focus[0] - self.centering[0] * f64::from(self.width) / self.scaling,
            focus[1] - self.centering[1] * f64::from(self.height) / self.scaling,
        ]
    }
}

/// Draws the road from above, following one vehicle.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopDownRenderer {
    viewport: Viewport,
}

impl TopDownRenderer {
    pub const fn new(viewport: Viewport) -> Self {
        Self { viewport }
    }

    pub const fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Render the road and vehicles centred on `vehicles[focus]`.
    pub fn render(&self, road: &Road, vehicles: &[Vehicle], focus: usize) -> RgbImage {
        let viewport = &self.viewport;
        let mut img = RgbImage::from_pixel(viewport.width, viewport.height, BACKGROUND);
        let origin = vehicles
            .get(focus)
            .map_or([0.0, 0.0], |v| viewport.origin(v.position));
        let to_px = |[x, y]: [f64; 2]| {
            [
                (x - origin[0]) * viewport.scaling,
                (y - origin[1]) * viewport.scaling,
            ]
        };

        self.draw_lane_markings(&mut img, road, origin, to_px);

        for (i, vehicle) in vehicles.iter().enumerate() {
            let color = if vehicle.crashed {
                CRASHED_COLOR
            } else if i == focus {
                EGO_COLOR
            } else {
                TRAFFIC_COLOR
            };
            let corners = vehicle.corners().map(to_px);
            canvas::fill_convex_polygon(&mut img, &corners, color);
            canvas::draw_polygon(&mut img, &corners, OUTLINE);
        }
        img
    }

    fn draw_lane_markings<F>(&self, img: &mut RgbImage, road: &Road, origin: [f64; 2], to_px: F)
    where
        F: Fn([f64; 2]) -> [f64; 2],
    {
        let visible_length = f64::from(self.viewport.width) / self.viewport.scaling;
        let x_start = origin[0];
        let x_end = origin[0] + visible_length;
        let half_stripe = STRIPE_WIDTH / 2.0;
        // Boundaries between lanes, including the two road edges
        for boundary in 0..=road.lanes {
            let y = boundary as f64 * LANE_WIDTH - LANE_WIDTH / 2.0;
            let solid = boundary == 0 || boundary == road.lanes;
            let segments: Vec<(f64, f64)> = if solid {
                vec![(x_start, x_end)]
            } else {
                let first = (x_start / STRIPE_SPACING).floor() * STRIPE_SPACING;
                let count = ((x_end - first) / STRIPE_SPACING).ceil() as usize + 1;
                (0..count)
                    .map(|k| first + k as f64 * STRIPE_SPACING)
                    .map(|x| (x, x + STRIPE_LENGTH))
                    .collect()
            };
            for (x0, x1) in segments {
                let [px0, py0] = to_px([x0, y - half_stripe]);
                let [px1, py1] = to_px([x1, y + half_stripe]);
                // Markings are at least one pixel thick
                let py1 = py1.max(py0 + 1.0);
                canvas::fill_rect(
                    img,
                    px0.floor() as i64,
                    py0.floor() as i64,
                    px1.ceil() as i64,
                    py1.ceil() as i64,
                    LANE_MARKING,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::highway::Driver;

    fn renderer() -> TopDownRenderer {
        TopDownRenderer::new(Viewport {
            width: 600,
            height: 150,
            scaling: 5.5,
            centering: [0.3, 0.5],
        })
    }

    #[test]
    fn frame_dimensions() {
        let road = Road::new(3);
        let vehicles = vec![Vehicle::new(&road, 1, 50.0, 25.0, Driver::Agent)];
        let frame = renderer().render(&road, &vehicles, 0);
        assert_eq!(frame.dimensions(), (600, 150));
    }

    #[test]
    fn focus_vehicle_at_centering_position() {
        let road = Road::new(3);
        let vehicles = vec![
            Vehicle::new(&road, 1, 50.0, 25.0, Driver::Agent),
            Vehicle::new(&road, 0, 70.0, 25.0, Driver::Traffic),
        ];
        let frame = renderer().render(&road, &vehicles, 0);
        assert_eq!(*frame.get_pixel(180, 75), EGO_COLOR);
        // 20 m ahead and one lane to the left
        let x = 180 + (20.0 * 5.5) as u32;
        let y = 75 - (4.0 * 5.5) as u32;
        assert_eq!(*frame.get_pixel(x, y), TRAFFIC_COLOR);
    }

    #[test]
    fn crashed_vehicles_drawn_red() {
        let road = Road::new(3);
        let mut ego = Vehicle::new(&road, 1, 50.0, 25.0, Driver::Agent);
        ego.crashed = true;
        let frame = renderer().render(&road, &[ego], 0);
        assert_eq!(*frame.get_pixel(180, 75), CRASHED_COLOR);
    }

    #[test]
    fn road_edges_drawn() {
        let road = Road::new(3);
        let vehicles = vec![Vehicle::new(&road, 1, 50.0, 25.0, Driver::Agent)];
        let frame = renderer().render(&road, &vehicles, 0);
        // Left edge of the road is 6 m above the ego vehicle
        let y = (75.0 - 6.0 * 5.5) as u32;
        assert_eq!(*frame.get_pixel(10, y), LANE_MARKING);
        assert_eq!(*frame.get_pixel(10, 1), BACKGROUND);
    }
}
