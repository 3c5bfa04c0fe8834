//! Frame-sequence rendering: the pluggable renderer contract and the
//! reference video encoder.

use std::path::PathBuf;

use async_trait::async_trait;
use reel_types::{config::EncoderConfig, frame::Bitmap};
use thiserror::Error;
use tracing::info;

mod encode;
mod ffmpeg;
mod writer;

pub use encode::{output_dimensions, presentation_time, write_frames};
pub use ffmpeg::{is_ffmpeg_on_path, FfmpegWriter};
pub use writer::{ContainerWriter, InMemoryWriter};

/// Failures raised inside the reference encoder. These never reach a
/// recording session's result channel directly; the session reports them as
/// a rendering error carrying this type's description.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("no frames to encode")]
    NoFrames,
    #[error("frames per second must be greater than zero")]
    InvalidFrameRate,
    #[error("container writer error: {0}")]
    Writer(String),
    #[error("internal encoder error: {0}")]
    Internal(String),
}

/// Renders a captured frame sequence into some asset.
///
/// The single extension point of the pipeline: a recording session accepts
/// any implementation and adapts its result into the session's result
/// channel.
#[async_trait]
pub trait FramesRenderer: Send + Sync + 'static {
    type Asset: Clone + Send + Sync + 'static;

    /// Render the ordered `frames` as an asset presented at
    /// `frames_per_second`. `Ok(None)` means the renderer legitimately
    /// produced no asset.
    async fn render(
        &self,
        frames: Vec<Bitmap>,
        frames_per_second: f64,
    ) -> anyhow::Result<Option<Self::Asset>>;
}

/// Reference renderer: encodes the frame sequence into a video container
/// file via a streaming [`ContainerWriter`].
pub struct VideoEncoder {
    config: EncoderConfig,
}

impl VideoEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }
}

impl Default for VideoEncoder {
    fn default() -> Self {
        Self::new(EncoderConfig::default())
    }
}

#[async_trait]
impl FramesRenderer for VideoEncoder {
    type Asset = PathBuf;

    async fn render(
        &self,
        frames: Vec<Bitmap>,
        frames_per_second: f64,
    ) -> anyhow::Result<Option<PathBuf>> {
        if frames.is_empty() {
            return Err(EncodeError::NoFrames.into());
        }
        if !(frames_per_second > 0.0) {
            return Err(EncodeError::InvalidFrameRate.into());
        }

        let config = self.config.clone();
        let (width, height) = output_dimensions(&frames[0], config.pixel_scale);
        info!(
            frames = frames.len(),
            fps = frames_per_second,
            width,
            height,
            codec = %config.codec,
            "Generating video"
        );

        // The writer loop blocks on pixel conversion and pipe writes; keep it
        // off the async executor entirely.
        let path = tokio::task::spawn_blocking(move || {
            let writer = FfmpegWriter::create(&config, width, height, frames_per_second)?;
            write_frames(writer, &frames, frames_per_second, width, height)
        })
        .await
        .map_err(|err| EncodeError::Internal(format!("encode task failed: {err}")))??;

        info!(path = %path.display(), "Successfully finished writing video");
        Ok(Some(path))
    }
}
