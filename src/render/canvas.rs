//! Primitive raster drawing on RGB images.
use image::{Rgb, RgbImage};

/// Fill the pixels `[x0, x1) × [y0, y1)`, clipped to the image.
pub fn fill_rect(img: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    blend_rect(img, x0, y0, x1, y1, color, 255);
}

/// Alpha-blend `color` over the pixels `[x0, x1) × [y0, y1)`, clipped to the image.
pub fn blend_rect(
    img: &mut RgbImage,
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
    color: Rgb<u8>,
    alpha: u8,
) {
    let (w, h) = (i64::from(img.width()), i64::from(img.height()));
    for y in y0.max(0)..y1.min(h) {
        for x in x0.max(0)..x1.min(w) {
            blend_pixel(img, x as u32, y as u32, color, alpha);
        }
    }
}

/// Alpha-blend a single in-bounds pixel.
fn blend_pixel(img: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>, alpha: u8) {
    let pixel = img.get_pixel_mut(x, y);
    if alpha == 255 {
        *pixel = color;
        return;
    }
    let a = u32::from(alpha);
    for (p, c) in pixel.0.iter_mut().zip(color.0) {
        *p = ((u32::from(*p) * (255 - a) + u32::from(c) * a) / 255) as u8;
    }
}

/// Set a pixel if it is within the image.
pub fn put_pixel(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < i64::from(img.width()) && y < i64::from(img.height()) {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Fill a convex polygon given by its vertices in pixel coordinates.
pub fn fill_convex_polygon(img: &mut RgbImage, vertices: &[[f64; 2]], color: Rgb<u8>) {
    if vertices.len() < 3 {
        return;
    }
    let (mut x_min, mut y_min) = (f64::INFINITY, f64::INFINITY);
    let (mut x_max, mut y_max) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for [x, y] in vertices {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }
    let x_range = (x_min.floor().max(0.0) as i64)..(x_max.ceil().min(f64::from(img.width())) as i64);
    let y_range =
        (y_min.floor().max(0.0) as i64)..(y_max.ceil().min(f64::from(img.height())) as i64);
    for y in y_range {
        for x in x_range.clone() {
            // Sample at the pixel centre
            if contains(vertices, [x as f64 + 0.5, y as f64 + 0.5]) {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Whether a point is inside a convex polygon with vertices in either winding order.
fn contains(vertices: &[[f64; 2]], point: [f64; 2]) -> bool {
    let mut sign = 0.0;
    for (i, a) in vertices.iter().enumerate() {
        let b = vertices[(i + 1) % vertices.len()];
        let cross = (b[0] - a[0]) * (point[1] - a[1]) - (b[1] - a[1]) * (point[0] - a[0]);
        if cross != 0.0 {
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
    }
    true
}

/// Draw the outline of a polygon.
pub fn draw_polygon(img: &mut RgbImage, vertices: &[[f64; 2]], color: Rgb<u8>) {
    for (i, a) in vertices.iter().enumerate() {
        let b = vertices[(i + 1) % vertices.len()];
        draw_line(img, *a, b, color);
    }
}

/// Draw a one pixel wide line segment.
pub fn draw_line(img: &mut RgbImage, from: [f64; 2], to: [f64; 2], color: Rgb<u8>) {
    let dx = to[0] - from[0];
    let dy = to[1] - from[1];
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        put_pixel(
            img,
            (from[0] + t * dx).round() as i64,
            (from[1] + t * dy).round() as i64,
            color,
        );
    }
}
