use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{ReelError, Result};

pub const DEFAULT_FRAMES_PER_SECOND: f64 = 24.0;

/// Sampling parameters for one recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Number of frames captured per second.
    #[serde(default = "default_frames_per_second")]
    pub frames_per_second: f64,
    /// Fixed recording length in seconds. `None` records until
    /// `stop_recording` is called.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Capture deferred surface snapshots instead of rasterizing on every
    /// tick. Cheaper per tick, but not safe on every host/surface pairing;
    /// the caller is responsible for enabling it only where supported.
    #[serde(default)]
    pub use_snapshots: bool,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            frames_per_second: DEFAULT_FRAMES_PER_SECOND,
            duration: None,
            use_snapshots: false,
        }
    }
}

fn default_frames_per_second() -> f64 {
    DEFAULT_FRAMES_PER_SECOND
}

/// Container/codec settings bundle handed to the reference encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
    /// Host display pixel density; output dimensions are the first frame's
    /// logical size multiplied by this factor.
    #[serde(default = "default_pixel_scale")]
    pub pixel_scale: f32,
    /// Directory for output artifacts. Defaults to the system temp dir.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Extra writer flags, forwarded verbatim as `-key value` pairs.
    #[serde(default)]
    pub extra_args: BTreeMap<String, String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            container: default_container(),
            pixel_format: default_pixel_format(),
            pixel_scale: default_pixel_scale(),
            output_dir: None,
            extra_args: BTreeMap::new(),
        }
    }
}

fn default_codec() -> String {
    "libx264".to_string()
}

fn default_container() -> String {
    "mp4".to_string()
}

fn default_pixel_format() -> String {
    "yuv420p".to_string()
}

fn default_pixel_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReelConfig {
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub ops: OpsConfig,
}

impl ReelConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            ReelError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            ReelError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.recording.frames_per_second > 0.0) {
            return Err(ReelError::Configuration(
                "recording.frames_per_second must be greater than zero".into(),
            ));
        }
        if let Some(duration) = self.recording.duration {
            if !(duration > 0.0) {
                return Err(ReelError::Configuration(
                    "recording.duration must be greater than zero when set".into(),
                ));
            }
        }
        if !(self.encoder.pixel_scale > 0.0) {
            return Err(ReelError::Configuration(
                "encoder.pixel_scale must be greater than zero".into(),
            ));
        }
        if self.encoder.codec.is_empty() {
            return Err(ReelError::Configuration(
                "encoder.codec must not be empty".into(),
            ));
        }
        if self.encoder.container.is_empty() {
            return Err(ReelError::Configuration(
                "encoder.container must not be empty".into(),
            ));
        }
        Ok(())
    }
}
