//! Rendering-surface abstraction layer.
//!
//! A [`Scene`] is a renderable description of animating content. A
//! [`SurfaceProvider`] hosts a scene on a live, off-screen surface that can
//! be rasterized immediately or captured as a deferred [`SurfaceSnapshot`]
//! for later rasterization.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use reel_types::{frame::Bitmap, ReelError, Result};
use tracing::debug;

/// Renderable description of animating content.
///
/// `paint` must yield a frame for any elapsed time; the surface decides when
/// it is sampled.
pub trait Scene: Send + Sync + 'static {
    /// Natural content bounds in logical pixels.
    fn size(&self) -> (u32, u32);
    fn paint(&self, elapsed: Duration) -> Bitmap;
}

/// Scene backed by a paint closure.
pub struct FnScene<F> {
    width: u32,
    height: u32,
    painter: F,
}

impl<F> FnScene<F>
where
    F: Fn(Duration) -> Bitmap + Send + Sync + 'static,
{
    pub fn new(width: u32, height: u32, painter: F) -> Self {
        Self {
            width,
            height,
            painter,
        }
    }
}

impl<F> Scene for FnScene<F>
where
    F: Fn(Duration) -> Bitmap + Send + Sync + 'static,
{
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn paint(&self, elapsed: Duration) -> Bitmap {
        (self.painter)(elapsed)
    }
}

/// Yields live rendering surfaces for a fixed renderable description.
pub trait SurfaceProvider {
    type Surface: RenderSurface;

    /// Place the content on a live, off-screen surface sized to its natural
    /// bounds. Capture cannot fail once the surface is live.
    fn instantiate(&self) -> Result<Self::Surface>;
}

/// A live surface that can be sampled.
pub trait RenderSurface: Send + 'static {
    /// Rasterize the surface's current state.
    fn rasterize(&mut self) -> Bitmap;

    /// Capture a lightweight snapshot of the current state for deferred
    /// rasterization.
    fn snapshot(&mut self) -> SurfaceSnapshot;
}

/// Deferred capture of one surface instant.
///
/// Rasterization is pull-based: each [`SurfaceSnapshot::rasterize`] call may
/// render again. Callers must rasterize before the state backing the
/// snapshot is torn down; snapshots produced by [`SceneSurface`] own their
/// backing state and are immune to teardown.
#[derive(Clone)]
pub struct SurfaceSnapshot {
    resolve: Arc<dyn Fn() -> Bitmap + Send + Sync>,
}

impl SurfaceSnapshot {
    pub fn new(resolve: impl Fn() -> Bitmap + Send + Sync + 'static) -> Self {
        Self {
            resolve: Arc::new(resolve),
        }
    }

    pub fn rasterize(&self) -> Bitmap {
        (self.resolve)()
    }
}

impl fmt::Debug for SurfaceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SurfaceSnapshot")
    }
}

/// One sampled frame: either an already-rasterized bitmap or a deferred
/// snapshot rasterized on access.
#[derive(Debug, Clone)]
pub enum CapturedFrame {
    Rendered(Bitmap),
    Deferred(SurfaceSnapshot),
}

impl CapturedFrame {
    pub fn render(&self) -> Bitmap {
        match self {
            CapturedFrame::Rendered(bitmap) => bitmap.clone(),
            CapturedFrame::Deferred(snapshot) => snapshot.rasterize(),
        }
    }
}

/// Reference provider hosting a [`Scene`] off-screen.
pub struct SceneProvider<S: Scene> {
    scene: Arc<S>,
}

impl<S: Scene> SceneProvider<S> {
    pub fn new(scene: S) -> Self {
        Self {
            scene: Arc::new(scene),
        }
    }
}

impl<S: Scene> SurfaceProvider for SceneProvider<S> {
    type Surface = SceneSurface<S>;

    fn instantiate(&self) -> Result<SceneSurface<S>> {
        let (width, height) = self.scene.size();
        if width == 0 || height == 0 {
            return Err(surface_error("scene has no content bounds"));
        }
        debug!(width, height, "Hosting scene on off-screen surface");
        Ok(SceneSurface {
            scene: Arc::clone(&self.scene),
            epoch: Instant::now(),
        })
    }
}

/// Live surface animating a [`Scene`] from the instant it was placed.
pub struct SceneSurface<S: Scene> {
    scene: Arc<S>,
    epoch: Instant,
}

impl<S: Scene> RenderSurface for SceneSurface<S> {
    fn rasterize(&mut self) -> Bitmap {
        self.scene.paint(self.epoch.elapsed())
    }

    fn snapshot(&mut self) -> SurfaceSnapshot {
        let scene = Arc::clone(&self.scene);
        let at = self.epoch.elapsed();
        SurfaceSnapshot::new(move || scene.paint(at))
    }
}

/// One-shot capture: place the content off-screen, rasterize once, tear the
/// surface down.
pub fn capture_image<P: SurfaceProvider>(provider: &P) -> Result<Bitmap> {
    let mut surface = provider.instantiate()?;
    let image = surface.rasterize();
    drop(surface);
    Ok(image)
}

pub fn surface_error(message: impl Into<String>) -> ReelError {
    ReelError::Surface(message.into())
}
