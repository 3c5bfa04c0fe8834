use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use reel_encode::VideoEncoder;
use reel_session::RecordingSession;
use reel_surface::{capture_image, SceneProvider};
use reel_types::config::{OpsConfig, ReelConfig};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod scene;

#[derive(Debug, Parser)]
#[command(name = "reel", about = "Record an animating demo scene to a video file")]
struct Cli {
    /// Path to a TOML config file (also read from REEL_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Recording length in seconds. Omit to record until Ctrl-C.
    #[arg(long)]
    duration: Option<f64>,
    /// Sampling rate in frames per second.
    #[arg(long)]
    fps: Option<f64>,
    /// Capture deferred snapshots instead of rasterizing on every tick.
    #[arg(long)]
    snapshots: bool,
    /// Directory for the output artifact (defaults to the system temp dir).
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Capture a single still frame to this PNG path instead of recording.
    #[arg(long)]
    still: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| env::var("REEL_CONFIG").ok().map(PathBuf::from));
    let mut config = load_config(config_path.as_deref());

    if let Some(duration) = cli.duration {
        config.recording.duration = Some(duration);
    }
    if let Some(fps) = cli.fps {
        config.recording.frames_per_second = fps;
    }
    if cli.snapshots {
        config.recording.use_snapshots = true;
    }
    if let Some(dir) = cli.output_dir {
        config.encoder.output_dir = Some(dir);
    }

    init_tracing(&config.ops)?;

    let provider = SceneProvider::new(scene::DemoScene::new(320, 180));

    if let Some(path) = cli.still {
        let frame = capture_image(&provider)?;
        frame
            .to_image()
            .context("frame pixel buffer does not match its dimensions")?
            .save(&path)
            .with_context(|| format!("failed to save still image to {}", path.display()))?;
        info!(path = %path.display(), "Captured still image");
        println!("{}", path.display());
        return Ok(());
    }

    let session = RecordingSession::new(
        &provider,
        VideoEncoder::new(config.encoder.clone()),
        config.recording.clone(),
    )?;

    if config.recording.duration.is_none() {
        info!("Recording until Ctrl-C");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        session.stop_recording();
    }

    match session.result().await {
        Ok(Some(path)) => println!("{}", path.display()),
        Ok(None) => println!("renderer produced no asset"),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> ReelConfig {
    let Some(path) = path else {
        return ReelConfig::default();
    };
    match ReelConfig::from_file(path) {
        Ok(config) => {
            if let Err(err) = config.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                ReelConfig::default()
            } else {
                config
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            ReelConfig::default()
        }
    }
}

fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to create log filter")?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!("tracing init error: {err}"))?;
    Ok(())
}
