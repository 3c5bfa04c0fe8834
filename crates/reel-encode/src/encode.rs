use std::path::PathBuf;

use image::imageops::{self, FilterType};
use reel_types::frame::Bitmap;

use crate::{ContainerWriter, EncodeError};

/// Presentation timestamp of the frame at `index`, in seconds.
///
/// Always computed from the absolute index rather than summed incrementally,
/// so no drift accumulates over long sequences.
pub fn presentation_time(index: usize, frames_per_second: f64) -> f64 {
    index as f64 / frames_per_second
}

/// Output dimensions: the frame's logical size scaled by the host pixel
/// density, rounded up to even (required for yuv420p output).
pub fn output_dimensions(first: &Bitmap, pixel_scale: f32) -> (u32, u32) {
    let scale = |v: u32| {
        let scaled = ((v as f32) * pixel_scale).round().max(1.0) as u32;
        scaled + (scaled & 1)
    };
    (scale(first.width), scale(first.height))
}

/// Convert a frame to a 32-bit BGRA buffer at the output dimensions.
fn bgra_pixels(frame: &Bitmap, width: u32, height: u32) -> Result<Vec<u8>, EncodeError> {
    let image = frame.to_image().ok_or_else(|| {
        EncodeError::Internal("frame pixel buffer does not match its dimensions".into())
    })?;
    let image = if image.dimensions() == (width, height) {
        image
    } else {
        imageops::resize(&image, width, height, FilterType::Triangle)
    };
    let mut pixels = image.into_raw();
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    Ok(pixels)
}

/// Drive the producer/consumer loop: poll the writer for readiness, then
/// append the next frame at its exact presentation timestamp. The loop never
/// appends faster than the writer accepts and only advances past a frame
/// after a successful append.
pub fn write_frames<W: ContainerWriter>(
    mut writer: W,
    frames: &[Bitmap],
    frames_per_second: f64,
    width: u32,
    height: u32,
) -> Result<PathBuf, EncodeError> {
    writer.start()?;
    for (index, frame) in frames.iter().enumerate() {
        while !writer.is_ready() {
            std::thread::yield_now();
        }
        let pixels = bgra_pixels(frame, width, height)?;
        writer.append(&pixels, presentation_time(index, frames_per_second))?;
    }
    writer.finalize()
}
