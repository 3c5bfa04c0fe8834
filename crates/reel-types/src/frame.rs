use chrono::{DateTime, Utc};
use image::{ImageBuffer, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// One rasterized frame of a rendering surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    /// Raw RGBA8 pixel buffer, row-major.
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Bitmap {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width as usize) * (height as usize) * 4);
        Self {
            width,
            height,
            data,
            captured_at: Utc::now(),
        }
    }

    /// Single-color frame, handy for demos and tests.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width as usize) * (height as usize) * 4);
        for _ in 0..(width as usize) * (height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self::from_rgba(width, height, data)
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::from_rgba(width, height, image.into_raw())
    }

    /// Reinterpret the pixel buffer as an [`RgbaImage`]. Returns `None` when
    /// the buffer length does not match the declared dimensions.
    pub fn to_image(&self) -> Option<RgbaImage> {
        ImageBuffer::<Rgba<u8>, _>::from_raw(self.width, self.height, self.data.clone())
    }
}
