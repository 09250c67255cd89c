//! Line plot of the per-episode training reward.
use super::label::{draw_text, text_size};
use super::{canvas, RenderError};
use image::imageops;
use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;

const WIDTH: u32 = 700;
const HEIGHT: u32 = 400;
const MARGIN_LEFT: u32 = 80;
const MARGIN_RIGHT: u32 = 20;
const MARGIN_TOP: u32 = 40;
const MARGIN_BOTTOM: u32 = 50;
const MAX_TICKS: f64 = 6.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const LINE: Rgb<u8> = Rgb([31, 119, 180]);

const TITLE: &str = "Training Reward vs Episodes";
const X_LABEL: &str = "Episode";
const Y_LABEL: &str = "Total Reward";
const LEGEND: &str = "Episode Reward";

/// Closed interval of data values mapped onto a pixel interval.
#[derive(Debug, Copy, Clone, PartialEq)]
struct Axis {
    lo: f64,
    hi: f64,
    px_lo: f64,
    px_hi: f64,
}

impl Axis {
    fn to_px(&self, value: f64) -> f64 {
        self.px_lo + (value - self.lo) / (self.hi - self.lo) * (self.px_hi - self.px_lo)
    }

    /// Evenly spaced round values within the axis range.
    fn ticks(&self) -> Vec<f64> {
        let step = nice_step((self.hi - self.lo) / MAX_TICKS);
        let mut ticks = Vec::new();
        let mut tick = (self.lo / step).ceil() * step;
        while tick <= self.hi + step * 1e-9 {
            ticks.push(tick);
            tick += step;
        }
        ticks
    }
}

/// Smallest value of the form `{1, 2, 5} × 10^k` that is at least `raw`.
fn nice_step(raw: f64) -> f64 {
    let magnitude = 10_f64.powf(raw.log10().floor());
    [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|step| *step >= raw)
        .unwrap_or(10.0 * magnitude)
}

fn format_tick(value: f64, step: f64) -> String {
    let decimals = if step >= 1.0 {
        0
    } else {
        (-step.log10()).ceil() as usize
    };
    // Avoid printing "-0"
    let value = if value.abs() < step * 1e-9 { 0.0 } else { value };
    format!("{:.*}", decimals, value)
}

/// Data range with a margin, never empty.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        (0.0, 1.0)
    } else if lo == hi {
        (lo - 1.0, hi + 1.0)
    } else {
        let pad = 0.05 * (hi - lo);
        (lo - pad, hi + pad)
    }
}

/// Draw the episode rewards as a line plot with axes, grid, title and legend.
pub fn reward_curve(rewards: &[f64]) -> RgbImage {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, WHITE);
    let left = f64::from(MARGIN_LEFT);
    let right = f64::from(WIDTH - MARGIN_RIGHT);
    let top = f64::from(MARGIN_TOP);
    let bottom = f64::from(HEIGHT - MARGIN_BOTTOM);

    let x_hi = rewards.len().saturating_sub(1).max(1) as f64;
    let (x_lo, x_hi) = (-0.05 * x_hi, 1.05 * x_hi);
    let x_axis = Axis {
        lo: x_lo,
        hi: x_hi,
        px_lo: left,
        px_hi: right,
    };
    let (y_lo, y_hi) = padded_range(rewards.iter().copied());
    let y_axis = Axis {
        lo: y_lo,
        hi: y_hi,
        px_lo: bottom,
        px_hi: top,
    };

    // Grid and tick labels
    let x_ticks = x_axis.ticks();
    let x_step = nice_step((x_axis.hi - x_axis.lo) / MAX_TICKS);
    for tick in x_ticks {
        let px = x_axis.to_px(tick);
        canvas::draw_line(&mut img, [px, top], [px, bottom], GRID);
        let label = format_tick(tick, x_step);
        let (w, _) = text_size(&label, 1);
        draw_text(
            &mut img,
            px.round() as i64 - i64::from(w / 2),
            bottom as i64 + 6,
            &label,
            1,
            BLACK,
        );
    }
    let y_step = nice_step((y_axis.hi - y_axis.lo) / MAX_TICKS);
    for tick in y_axis.ticks() {
        let py = y_axis.to_px(tick);
        canvas::draw_line(&mut img, [left, py], [right, py], GRID);
        let label = format_tick(tick, y_step);
        let (w, h) = text_size(&label, 1);
        draw_text(
            &mut img,
            left as i64 - 6 - i64::from(w),
            py.round() as i64 - i64::from(h / 2),
            &label,
            1,
            BLACK,
        );
    }

    // Data
    let points: Vec<[f64; 2]> = rewards
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_finite())
        .map(|(i, r)| [x_axis.to_px(i as f64), y_axis.to_px(*r)])
        .collect();
    for pair in points.windows(2) {
        canvas::draw_line(&mut img, pair[0], pair[1], LINE);
    }
    if let [p] = points.as_slice() {
        let (x, y) = (p[0].round() as i64, p[1].round() as i64);
        canvas::fill_rect(&mut img, x - 1, y - 1, x + 2, y + 2, LINE);
    }

    // Frame
    canvas::draw_polygon(
        &mut img,
        &[[left, top], [right, top], [right, bottom], [left, bottom]],
        BLACK,
    );

    // Legend
    let (legend_w, legend_h) = text_size(LEGEND, 1);
    let legend_x1 = right as i64 - 10;
    let legend_x0 = legend_x1 - i64::from(legend_w) - 40;
    let legend_y0 = top as i64 + 10;
    let legend_y1 = legend_y0 + i64::from(legend_h) + 12;
    canvas::fill_rect(&mut img, legend_x0, legend_y0, legend_x1, legend_y1, WHITE);
    canvas::draw_polygon(
        &mut img,
        &[
            [legend_x0 as f64, legend_y0 as f64],
            [legend_x1 as f64, legend_y0 as f64],
            [legend_x1 as f64, legend_y1 as f64],
            [legend_x0 as f64, legend_y1 as f64],
        ],
        GRID,
    );
    let legend_mid = ((legend_y0 + legend_y1) / 2) as f64;
    canvas::draw_line(
        &mut img,
        [(legend_x0 + 6) as f64, legend_mid],
        [(legend_x0 + 30) as f64, legend_mid],
        LINE,
    );
    draw_text(
        &mut img,
        legend_x0 + 34,
        legend_y0 + 6,
        LEGEND,
        1,
        BLACK,
    );

    // Titles
    let (title_w, _) = text_size(TITLE, 2);
    let center = (left + right) / 2.0;
    draw_text(
        &mut img,
        center as i64 - i64::from(title_w / 2),
        12,
        TITLE,
        2,
        BLACK,
    );
    let (x_label_w, _) = text_size(X_LABEL, 1);
    draw_text(
        &mut img,
        center as i64 - i64::from(x_label_w / 2),
        i64::from(HEIGHT) - 20,
        X_LABEL,
        1,
        BLACK,
    );
    let (y_label_w, y_label_h) = text_size(Y_LABEL, 1);
    let mut y_label = RgbImage::from_pixel(y_label_w, y_label_h, WHITE);
    draw_text(&mut y_label, 0, 0, Y_LABEL, 1, BLACK);
    let y_label = imageops::rotate270(&y_label);
    imageops::overlay(
        &mut img,
        &y_label,
        12,
        ((top + bottom) / 2.0) as i64 - i64::from(y_label_w / 2),
    );

    img
}

/// Save the reward curve of `rewards` as a PNG image.
pub fn save_reward_curve<P: AsRef<Path>>(path: P, rewards: &[f64]) -> Result<(), RenderError> {
    reward_curve(rewards).save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
