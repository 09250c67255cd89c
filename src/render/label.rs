//! Bitmap text and frame labels.
use super::canvas;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};

/// Glyph size of the bitmap font (pixels, unscaled).
pub const GLYPH_SIZE: u32 = 8;

const LABEL_ORIGIN: i64 = 5;
const LABEL_PADDING: u32 = 6;
const LABEL_BACKGROUND_ALPHA: u8 = 180;

/// Size `(width, height)` of `text` drawn at the given scale.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let chars = text.chars().count() as u32;
    (chars * GLYPH_SIZE * scale, GLYPH_SIZE * scale)
}

/// Draw `text` with its top left corner at `(x, y)`.
///
/// Characters without a glyph are drawn as blanks.
pub fn draw_text(img: &mut RgbImage, x: i64, y: i64, text: &str, scale: u32, color: Rgb<u8>) {
    let scale = i64::from(scale);
    let advance = i64::from(GLYPH_SIZE) * scale;
    for (i, c) in text.chars().enumerate() {
        let glyph = match BASIC_FONTS.get(c) {
            Some(glyph) => glyph,
            None => continue,
        };
        let x0 = x + i as i64 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8 {
                if bits & (1 << col) != 0 {
                    let px = x0 + col * scale;
                    let py = y + row as i64 * scale;
                    canvas::fill_rect(img, px, py, px + scale, py + scale, color);
                }
            }
        }
    }
}

/// Text scale that keeps labels legible on larger frames.
fn label_scale(frame: &RgbImage) -> u32 {
    (frame.height() / 150).max(1)
}

/// A copy of `frame` with `text` in white on a translucent black box in the top left corner.
pub fn add_label(frame: &RgbImage, text: &str) -> RgbImage {
    let mut img = frame.clone();
    let scale = label_scale(frame);
    let (text_width, text_height) = text_size(text, scale);
    let x1 = LABEL_ORIGIN + i64::from(text_width + 2 * LABEL_PADDING);
    let y1 = LABEL_ORIGIN + i64::from(text_height + 2 * LABEL_PADDING);
    canvas::blend_rect(
        &mut img,
        LABEL_ORIGIN,
        LABEL_ORIGIN,
        x1,
        y1,
        Rgb([0, 0, 0]),
        LABEL_BACKGROUND_ALPHA,
    );
    let text_origin = LABEL_ORIGIN + i64::from(LABEL_PADDING);
    draw_text(
        &mut img,
        text_origin,
        text_origin,
        text,
        scale,
        Rgb([255, 255, 255]),
    );
    img
}
