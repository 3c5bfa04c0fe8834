//! Recording session orchestration: timed frame sampling, one-shot stop,
//! and asset generation.
//!
//! A session cannot be reused once stopped; start a new recording with a new
//! session instance.

use std::{
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::{stream::BoxStream, StreamExt};
use reel_encode::{FramesRenderer, VideoEncoder};
use reel_surface::{CapturedFrame, RenderSurface, SurfaceProvider};
use reel_types::{config::RecordingConfig, frame::Bitmap, ReelError, Result};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant},
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// Terminal outcome of one stop event: the rendered asset (possibly absent
/// if the renderer legitimately produced none), or the failure that ended
/// generation.
pub type GenerationResult<A> = Result<Option<A>, ReelError>;

struct CaptureState {
    recording: bool,
    frames: Vec<CapturedFrame>,
}

struct SessionCore<R: FramesRenderer> {
    renderer: R,
    frames_per_second: f64,
    fixed_frame_count: Option<usize>,
    use_snapshots: bool,
    state: Mutex<CaptureState>,
    result_tx: watch::Sender<Option<GenerationResult<R::Asset>>>,
    generation: Mutex<Option<JoinHandle<()>>>,
}

impl<R: FramesRenderer> SessionCore<R> {
    fn lock_state(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn target_reached(&self, captured: usize) -> bool {
        self.fixed_frame_count
            .map_or(false, |target| captured >= target)
    }

    /// One-shot stop: the first call takes the frame buffer and starts
    /// generation; later calls are no-ops.
    fn stop_recording(self: &Arc<Self>) {
        let frames = {
            let mut state = self.lock_state();
            if !state.recording {
                return;
            }
            state.recording = false;
            mem::take(&mut state.frames)
        };
        info!(frames = frames.len(), "Stop recording");
        self.start_generation(frames);
    }

    fn start_generation(self: &Arc<Self>, frames: Vec<CapturedFrame>) {
        let mut slot = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let core = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            let bitmaps: Vec<Bitmap> = frames.iter().map(CapturedFrame::render).collect();
            debug!(frames = bitmaps.len(), "Materialized frame buffer");

            let result = match core
                .renderer
                .render(bitmaps, core.frames_per_second)
                .await
            {
                Ok(asset) => Ok(asset),
                Err(err) => Err(ReelError::Rendering {
                    reason: err.to_string(),
                }),
            };
            if core.result_tx.send(Some(result)).is_err() {
                warn!("Recording result had no remaining subscribers");
            }
        }));
    }
}

/// Periodic sampling on the task that owns the surface. Capture ticks are
/// serialized with nothing else touching the surface, so frame capture never
/// races surface mutation.
async fn sample_loop<R, S>(core: Arc<SessionCore<R>>, mut surface: S, period: Duration)
where
    R: FramesRenderer,
    S: RenderSurface,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;

        {
            let state = core.lock_state();
            if !state.recording {
                break;
            }
            // A zero-frame target stops before anything is captured.
            if core.target_reached(state.frames.len()) {
                drop(state);
                core.stop_recording();
                break;
            }
        }

        let frame = if core.use_snapshots {
            CapturedFrame::Deferred(surface.snapshot())
        } else {
            CapturedFrame::Rendered(surface.rasterize())
        };

        let appended = {
            let mut state = core.lock_state();
            if state.recording {
                state.frames.push(frame);
                Some(state.frames.len())
            } else {
                // Stopped while this tick was rasterizing; the buffer has
                // already been handed off.
                None
            }
        };

        match appended {
            Some(count) if core.target_reached(count) => {
                // The frame completing the fixed count is included, and stop
                // runs within the same tick.
                core.stop_recording();
                break;
            }
            Some(_) => {}
            None => break,
        }
    }
    debug!("Sampling stopped; releasing surface");
    drop(surface);
}

/// Session handler managing one recording attempt.
pub struct RecordingSession<R: FramesRenderer> {
    core: Arc<SessionCore<R>>,
    result_rx: watch::Receiver<Option<GenerationResult<R::Asset>>>,
}

impl<R: FramesRenderer> RecordingSession<R> {
    /// Validate the configuration, host the content on an off-screen
    /// surface, and start sampling immediately.
    ///
    /// Must be called within a Tokio runtime. Fails with
    /// [`ReelError::IllegalDuration`] or
    /// [`ReelError::IllegalFramesPerSecond`] before anything is allocated.
    pub fn new<P: SurfaceProvider>(
        provider: &P,
        renderer: R,
        config: RecordingConfig,
    ) -> Result<Self> {
        if let Some(duration) = config.duration {
            if !(duration > 0.0) {
                return Err(ReelError::IllegalDuration);
            }
        }
        if !(config.frames_per_second > 0.0) {
            return Err(ReelError::IllegalFramesPerSecond);
        }
        let period = Duration::try_from_secs_f64(1.0 / config.frames_per_second)
            .map_err(|_| ReelError::IllegalFramesPerSecond)?;

        let fixed_frame_count = config
            .duration
            .map(|duration| (duration * config.frames_per_second).floor() as usize);

        let surface = provider.instantiate()?;

        let (result_tx, result_rx) = watch::channel(None);
        let core = Arc::new(SessionCore {
            renderer,
            frames_per_second: config.frames_per_second,
            fixed_frame_count,
            use_snapshots: config.use_snapshots,
            state: Mutex::new(CaptureState {
                recording: true,
                frames: Vec::new(),
            }),
            result_tx,
            generation: Mutex::new(None),
        });

        info!(
            fps = config.frames_per_second,
            duration = ?config.duration,
            frames = ?fixed_frame_count,
            "Start recording"
        );
        tokio::spawn(sample_loop(Arc::clone(&core), surface, period));

        Ok(Self { core, result_rx })
    }

    /// Stop the recording session and start asset generation. Idempotent;
    /// only the first call has any effect.
    pub fn stop_recording(&self) {
        self.core.stop_recording();
    }

    pub fn is_recording(&self) -> bool {
        self.core.lock_state().recording
    }

    pub fn frames_per_second(&self) -> f64 {
        self.core.frames_per_second
    }

    /// Wait for the terminal generation result. Pending forever on a session
    /// that is never stopped.
    pub async fn result(&self) -> GenerationResult<R::Asset> {
        let mut rx = self.result_rx.clone();
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                // Sender gone without a terminal value; none will arrive.
                futures::future::pending::<()>().await;
            }
        }
    }

    /// Stream of the terminal result. Emits exactly one item per session,
    /// and ends without one if the session is torn down before stopping.
    pub fn subscribe(&self) -> BoxStream<'static, GenerationResult<R::Asset>> {
        WatchStream::new(self.result_rx.clone())
            .filter_map(|value| async move { value })
            .boxed()
    }
}

impl<R: FramesRenderer> Drop for RecordingSession<R> {
    fn drop(&mut self) {
        let mut state = self.core.lock_state();
        if state.recording {
            state.recording = false;
            state.frames.clear();
            debug!("Recording session dropped while sampling; capture halted");
        }
    }
}

/// Record the provided content as a video with the reference encoder and
/// default settings.
pub fn record_video<P: SurfaceProvider>(
    provider: &P,
    config: RecordingConfig,
) -> Result<RecordingSession<VideoEncoder>> {
    RecordingSession::new(provider, VideoEncoder::default(), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reel_surface::{FnScene, SceneProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, timeout};

    #[derive(Clone)]
    struct MockRenderer {
        asset: Option<String>,
        error: Option<String>,
        invocations: Arc<AtomicUsize>,
        captured: Arc<Mutex<Vec<usize>>>,
    }

    impl MockRenderer {
        fn succeeding() -> Self {
            Self {
                asset: Some("someGeneratedAsset".into()),
                error: None,
                invocations: Arc::new(AtomicUsize::new(0)),
                captured: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                error: Some(reason.to_string()),
                ..Self::succeeding()
            }
        }

        fn frame_counts(&self) -> Vec<usize> {
            self.captured.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FramesRenderer for MockRenderer {
        type Asset = String;

        async fn render(
            &self,
            frames: Vec<Bitmap>,
            _frames_per_second: f64,
        ) -> anyhow::Result<Option<String>> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            self.captured.lock().unwrap().push(frames.len());
            if let Some(reason) = &self.error {
                anyhow::bail!("{reason}");
            }
            Ok(self.asset.clone())
        }
    }

    fn test_provider() -> SceneProvider<FnScene<impl Fn(Duration) -> Bitmap + Send + Sync + 'static>>
    {
        SceneProvider::new(FnScene::new(8, 8, |_| {
            Bitmap::solid(8, 8, [255, 214, 0, 255])
        }))
    }

    fn config(duration: Option<f64>, fps: f64) -> RecordingConfig {
        RecordingConfig {
            frames_per_second: fps,
            duration,
            use_snapshots: false,
        }
    }

    #[tokio::test]
    async fn rejects_non_positive_duration() {
        for duration in [0.0, -1.0] {
            let err = RecordingSession::new(
                &test_provider(),
                MockRenderer::succeeding(),
                config(Some(duration), 24.0),
            )
            .err()
            .expect("construction must fail");
            assert_eq!(err, ReelError::IllegalDuration);
        }
    }

    #[tokio::test]
    async fn rejects_non_positive_frame_rate() {
        for (duration, fps) in [(None, 0.0), (Some(100.0), -24.0)] {
            let err = RecordingSession::new(
                &test_provider(),
                MockRenderer::succeeding(),
                config(duration, fps),
            )
            .err()
            .expect("construction must fail");
            assert_eq!(err, ReelError::IllegalFramesPerSecond);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_duration_captures_exactly_the_derived_frame_count() {
        let renderer = MockRenderer::succeeding();
        let session = RecordingSession::new(
            &test_provider(),
            renderer.clone(),
            config(Some(1.0), 24.0),
        )
        .expect("valid session");

        let result = session.result().await;
        assert_eq!(result, Ok(Some("someGeneratedAsset".into())));
        assert_eq!(renderer.frame_counts(), vec![24]);
        assert!(!session.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn fractional_targets_floor_the_frame_count() {
        let renderer = MockRenderer::succeeding();
        let session = RecordingSession::new(
            &test_provider(),
            renderer.clone(),
            config(Some(0.5), 3.0),
        )
        .expect("valid session");

        session.result().await.expect("generation succeeds");
        // floor(0.5 * 3.0) == 1
        assert_eq!(renderer.frame_counts(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_frame_targets_stop_before_capturing() {
        let renderer = MockRenderer::succeeding();
        let session = RecordingSession::new(
            &test_provider(),
            renderer.clone(),
            config(Some(0.01), 24.0),
        )
        .expect("valid session");

        session.result().await.expect("generation succeeds");
        // floor(0.01 * 24.0) == 0: generation still runs, with no frames.
        assert_eq!(renderer.frame_counts(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_generates_once() {
        let renderer = MockRenderer::succeeding();
        let session =
            RecordingSession::new(&test_provider(), renderer.clone(), config(None, 24.0))
                .expect("valid session");

        sleep(Duration::from_millis(250)).await;
        session.stop_recording();
        let first = session.result().await;
        assert_eq!(first, Ok(Some("someGeneratedAsset".into())));
        let captured = renderer.frame_counts();
        assert_eq!(captured.len(), 1);
        assert!(captured[0] >= 1);

        session.stop_recording();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(renderer.invocations.load(Ordering::SeqCst), 1);
        assert_eq!(session.result().await, first);
    }

    #[tokio::test(start_paused = true)]
    async fn never_emits_without_a_stop() {
        let renderer = MockRenderer::succeeding();
        let session =
            RecordingSession::new(&test_provider(), renderer.clone(), config(None, 24.0))
                .expect("valid session");

        let outcome = timeout(Duration::from_secs(2), session.result()).await;
        assert!(outcome.is_err(), "open-ended session must stay pending");
        assert_eq!(renderer.invocations.load(Ordering::SeqCst), 0);
        assert!(session.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn renderer_failure_surfaces_its_description_verbatim() {
        let renderer = MockRenderer::failing("some error reason");
        let session =
            RecordingSession::new(&test_provider(), renderer, config(None, 24.0))
                .expect("valid session");

        session.stop_recording();
        let result = session.result().await;
        assert_eq!(
            result,
            Err(ReelError::Rendering {
                reason: "some error reason".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_yields_the_terminal_result_once() {
        let renderer = MockRenderer::succeeding();
        let session = RecordingSession::new(
            &test_provider(),
            renderer,
            config(Some(1.0 / 24.0), 24.0),
        )
        .expect("valid session");

        let mut stream = session.subscribe();
        let value = stream.next().await.expect("one terminal emission");
        assert_eq!(value, Ok(Some("someGeneratedAsset".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_mode_defers_rasterization_until_generation() {
        let paints = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&paints);
        let provider = SceneProvider::new(FnScene::new(8, 8, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Bitmap::solid(8, 8, [0, 0, 0, 255])
        }));
        let renderer = MockRenderer::succeeding();
        let session = RecordingSession::new(
            &provider,
            renderer.clone(),
            RecordingConfig {
                frames_per_second: 24.0,
                duration: Some(0.25),
                use_snapshots: true,
            },
        )
        .expect("valid session");

        session.result().await.expect("generation succeeds");
        // floor(0.25 * 24) == 6 frames, each painted exactly once, at
        // materialization time rather than capture time.
        assert_eq!(renderer.frame_counts(), vec![6]);
        assert_eq!(paints.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_live_session_halts_without_emitting() {
        let renderer = MockRenderer::succeeding();
        let session =
            RecordingSession::new(&test_provider(), renderer.clone(), config(None, 24.0))
                .expect("valid session");

        let mut stream = session.subscribe();
        drop(session);

        assert_eq!(stream.next().await, None);
        assert_eq!(renderer.invocations.load(Ordering::SeqCst), 0);
    }
}
