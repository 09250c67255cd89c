//! Animated GIF output.
use super::RenderError;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, RgbImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Colour quantization speed in `[1, 30]`; higher is faster with lower quality.
const QUANTIZATION_SPEED: i32 = 10;

/// Save `frames` as a looping animated GIF played at `fps` frames per second.
pub fn save_gif<P: AsRef<Path>>(
    path: P,
    frames: &[RgbImage],
    fps: u32,
) -> Result<(), RenderError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_gif(&mut writer, frames, fps)?;
    writer.flush()?;
    Ok(())
}

/// Encode `frames` as a looping animated GIF into a writer.
pub fn write_gif<W: Write>(
    writer: W,
    frames: &[RgbImage],
    fps: u32,
) -> Result<(), RenderError> {
    if frames.is_empty() {
        return Err(RenderError::NoFrames);
    }
    if fps == 0 {
        return Err(RenderError::InvalidFrameRate);
    }
    let delay = Delay::from_numer_denom_ms(1000, fps);
    let mut encoder = GifEncoder::new_with_speed(writer, QUANTIZATION_SPEED);
    encoder.set_repeat(Repeat::Infinite)?;
    for frame in frames {
        let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
        encoder.encode_frame(Frame::from_parts(rgba, 0, 0, delay))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, Rgb};
    use std::io::Cursor;
    use std::time::Duration;

    fn frames(n: u8) -> Vec<RgbImage> {
        (0..n)
            .map(|i| RgbImage::from_pixel(16, 8, Rgb([i * 20, 100, 200])))
            .collect()
    }

    #[test]
    fn gif_round_trip_frame_count_and_size() {
        let mut buffer = Vec::new();
        write_gif(&mut buffer, &frames(5), 20).unwrap();
        let decoder = GifDecoder::new(Cursor::new(buffer)).unwrap();
        let decoded = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(decoded.len(), 5);
        for frame in &decoded {
            assert_eq!(frame.buffer().dimensions(), (16, 8));
            assert_eq!(Duration::from(frame.delay()), Duration::from_millis(50));
        }
    }

    #[test]
    fn empty_frames_rejected() {
        let mut buffer = Vec::new();
        assert!(matches!(
            write_gif(&mut buffer, &[], 20),
            Err(RenderError::NoFrames)
        ));
    }

    #[test]
    fn zero_fps_rejected() {
        let mut buffer = Vec::new();
        assert!(matches!(
            write_gif(&mut buffer, &frames(1), 0),
            Err(RenderError::InvalidFrameRate)
        ));
    }

    #[test]
    fn save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gif");
        save_gif(&path, &frames(3), 10).unwrap();
        assert!(path.metadata().unwrap().len() > 0);
    }
}
