use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::mpsc::{sync_channel, SyncSender, TrySendError},
    thread,
};

use reel_types::config::EncoderConfig;
use tracing::debug;
use uuid::Uuid;

use crate::{ContainerWriter, EncodeError};

/// Frames buffered between the append side and the feeder thread. A full
/// queue is the writer's not-ready state.
const FRAME_QUEUE_DEPTH: usize = 4;

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn ensure_parent_dir(path: &Path) -> Result<(), EncodeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            EncodeError::Internal(format!(
                "failed to create output directory '{}': {err}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

/// Unique output location for one encode job. Never reused, never cleaned up
/// here; removal is the caller's responsibility.
fn unique_output_path(config: &EncoderConfig) -> PathBuf {
    let dir = config
        .output_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    dir.join(format!("{}.{}", Uuid::new_v4(), config.container))
}

/// Streaming container writer backed by an ffmpeg child process.
///
/// Raw BGRA frames are queued to a feeder thread that writes them into
/// ffmpeg's stdin; the bounded queue supplies the readiness signal. We use
/// the system `ffmpeg` binary rather than native FFmpeg bindings to avoid
/// dev header/lib requirements.
pub struct FfmpegWriter {
    out_path: PathBuf,
    frame_len: usize,
    child: Child,
    sender: Option<SyncSender<Vec<u8>>>,
    queued: Option<Vec<u8>>,
    feeder: Option<thread::JoinHandle<std::io::Result<()>>>,
    started: bool,
    last_pts: Option<f64>,
}

impl FfmpegWriter {
    pub fn create(
        config: &EncoderConfig,
        width: u32,
        height: u32,
        frames_per_second: f64,
    ) -> Result<Self, EncodeError> {
        if !is_ffmpeg_on_path() {
            return Err(EncodeError::Internal(
                "ffmpeg is required for video encoding, but was not found on PATH".into(),
            ));
        }

        let out_path = unique_output_path(config);
        ensure_parent_dir(&out_path)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "bgra",
            "-s",
            &format!("{width}x{height}"),
            "-r",
            &format!("{frames_per_second}"),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            &config.codec,
            "-pix_fmt",
            &config.pixel_format,
        ]);

        if matches!(config.container.as_str(), "mp4" | "mov") {
            cmd.args(["-movflags", "+faststart"]);
        }
        for (key, value) in &config.extra_args {
            cmd.arg(format!("-{key}")).arg(value);
        }
        cmd.arg(&out_path);

        let mut child = cmd.spawn().map_err(|err| {
            EncodeError::Internal(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {err}"
            ))
        })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            EncodeError::Internal("failed to open ffmpeg stdin (unexpected)".into())
        })?;

        let (sender, receiver) = sync_channel::<Vec<u8>>(FRAME_QUEUE_DEPTH);
        let feeder = thread::spawn(move || -> std::io::Result<()> {
            for frame in receiver.iter() {
                stdin.write_all(&frame)?;
            }
            Ok(())
        });

        debug!(path = %out_path.display(), width, height, "Opened ffmpeg container writer");
        Ok(Self {
            out_path,
            frame_len: (width as usize) * (height as usize) * 4,
            child,
            sender: Some(sender),
            queued: None,
            feeder: Some(feeder),
            started: false,
            last_pts: None,
        })
    }

    fn flush_queued(&mut self) -> Result<bool, EncodeError> {
        let Some(frame) = self.queued.take() else {
            return Ok(true);
        };
        let Some(sender) = self.sender.as_ref() else {
            return Err(EncodeError::Internal("writer is already finalized".into()));
        };
        match sender.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(frame)) => {
                self.queued = Some(frame);
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(EncodeError::Writer(
                "ffmpeg stopped accepting frames".into(),
            )),
        }
    }
}

impl ContainerWriter for FfmpegWriter {
    fn start(&mut self) -> Result<(), EncodeError> {
        self.started = true;
        Ok(())
    }

    fn is_ready(&mut self) -> bool {
        // A dead writer reports ready so the next append surfaces the error
        // instead of leaving the producer polling forever.
        self.flush_queued().unwrap_or(true)
    }

    fn append(&mut self, pixels: &[u8], pts_seconds: f64) -> Result<(), EncodeError> {
        if !self.started {
            return Err(EncodeError::Internal("writer has not been started".into()));
        }
        if self.queued.is_some() {
            return Err(EncodeError::Internal(
                "append called while the writer is not ready".into(),
            ));
        }
        if pixels.len() != self.frame_len {
            return Err(EncodeError::Internal(format!(
                "frame buffer is {} bytes, expected {}",
                pixels.len(),
                self.frame_len
            )));
        }
        if let Some(last) = self.last_pts {
            if pts_seconds <= last {
                return Err(EncodeError::Internal(format!(
                    "non-monotonic presentation timestamp {pts_seconds} after {last}"
                )));
            }
        }

        self.queued = Some(pixels.to_vec());
        self.last_pts = Some(pts_seconds);
        // The frame lands on the feeder queue now if there is room, or on
        // the next readiness poll otherwise.
        self.flush_queued()?;
        Ok(())
    }

    fn finalize(mut self) -> Result<PathBuf, EncodeError> {
        if let (Some(frame), Some(sender)) = (self.queued.take(), self.sender.as_ref()) {
            sender
                .send(frame)
                .map_err(|_| EncodeError::Writer("ffmpeg stopped accepting frames".into()))?;
        }
        // Closing the queue lets the feeder drain and close ffmpeg's stdin.
        drop(self.sender.take());

        if let Some(feeder) = self.feeder.take() {
            match feeder.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    return Err(EncodeError::Writer(format!(
                        "failed to write frames to ffmpeg stdin: {err}"
                    )))
                }
                Err(_) => {
                    return Err(EncodeError::Internal("frame feeder thread panicked".into()))
                }
            }
        }

        let output = self.child.wait_with_output().map_err(|err| {
            EncodeError::Internal(format!("failed to wait for ffmpeg to finish: {err}"))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::Writer(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(self.out_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_frames;
    use reel_types::frame::Bitmap;

    #[test]
    fn unique_output_paths_do_not_collide() {
        let config = EncoderConfig::default();
        let first = unique_output_path(&config);
        let second = unique_output_path(&config);
        assert_ne!(first, second);
        assert_eq!(first.extension().and_then(|e| e.to_str()), Some("mp4"));
    }

    fn probe_frame_count(path: &Path) -> Option<u64> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-count_frames",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=nb_read_frames",
                "-of",
                "default=nokey=1:noprint_wrappers=1",
            ])
            .arg(path)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }

    #[test]
    fn encodes_a_short_sequence_through_ffmpeg() {
        if !is_ffmpeg_on_path() {
            eprintln!("skipping: ffmpeg not found on PATH");
            return;
        }

        let config = EncoderConfig::default();
        let frames: Vec<Bitmap> = (0..6)
            .map(|i| Bitmap::solid(32, 32, [40 * i as u8, 80, 120, 255]))
            .collect();
        let writer = FfmpegWriter::create(&config, 32, 32, 12.0).expect("spawn writer");
        let path = write_frames(writer, &frames, 12.0, 32, 32).expect("encode");

        let metadata = std::fs::metadata(&path).expect("artifact exists");
        assert!(metadata.len() > 0);
        if let Some(count) = probe_frame_count(&path) {
            assert_eq!(count, frames.len() as u64);
        }
        std::fs::remove_file(&path).ok();
    }
}
