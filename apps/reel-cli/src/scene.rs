//! Procedurally animated demo content.

use std::time::Duration;

use reel_surface::Scene;
use reel_types::frame::Bitmap;

/// A bright dot orbiting over a vertical gradient. One full orbit every two
/// seconds.
pub struct DemoScene {
    width: u32,
    height: u32,
}

impl DemoScene {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Scene for DemoScene {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn paint(&self, elapsed: Duration) -> Bitmap {
        let (w, h) = (self.width as i64, self.height as i64);
        let angle = elapsed.as_secs_f64() * std::f64::consts::PI;
        let cx = w / 2 + ((w as f64 / 4.0) * angle.cos()) as i64;
        let cy = h / 2 + ((h as f64 / 4.0) * angle.sin()) as i64;
        let radius = (h / 10).max(2);

        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            let shade = (40 + y * 140 / h.max(1)) as u8;
            for x in 0..w {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= radius * radius {
                    data.extend_from_slice(&[255, 214, 0, 255]);
                } else {
                    data.extend_from_slice(&[shade / 3, shade / 2, shade, 255]);
                }
            }
        }
        Bitmap::from_rgba(self.width, self.height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paints_frames_of_the_declared_size() {
        let scene = DemoScene::new(64, 36);
        let frame = scene.paint(Duration::ZERO);
        assert_eq!((frame.width, frame.height), (64, 36));
        assert_eq!(frame.data.len(), 64 * 36 * 4);
    }

    #[test]
    fn animation_changes_over_time() {
        let scene = DemoScene::new(64, 36);
        let first = scene.paint(Duration::ZERO);
        let later = scene.paint(Duration::from_millis(500));
        assert_ne!(first.data, later.data);
    }
}
