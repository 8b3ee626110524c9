//! Still-image capture from a live camera stream or an imported file
//!
//! The controller exclusively owns the camera stream between
//! [`CaptureController::acquire_stream`] and
//! [`CaptureController::release_stream`]. Dropping the controller releases
//! the stream as well, so every exit path from the capture view stops it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::imaging::{self, DEFAULT_JPEG_QUALITY};

/// How long the shutter acknowledgment stays visible
pub const SHUTTER_DURATION: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Rear camera, pointed at the label
    Environment,
    User,
}

/// Constraints passed to the camera when opening a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamConstraints {
    pub facing: Option<Facing>,
    /// Require `facing` rather than prefer it
    pub exact_facing: bool,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl StreamConstraints {
    /// Constraint sets tried in order, from most to least specific
    pub fn fallback_chain(facing: Facing) -> [StreamConstraints; 3] {
        [
            StreamConstraints {
                facing: Some(facing),
                exact_facing: true,
                ideal_width: Some(1920),
                ideal_height: Some(1080),
            },
            StreamConstraints {
                facing: Some(facing),
                exact_facing: false,
                ideal_width: None,
                ideal_height: None,
            },
            StreamConstraints::default(),
        ]
    }
}

/// A platform camera capable of opening video streams
#[async_trait]
pub trait Camera: Send + Sync {
    async fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CaptureError>;
}

/// A live video stream owned by the capture controller
///
/// Frame access may touch the disk or a device, so the controller only calls
/// [`VideoStream::dimensions`] and [`VideoStream::grab_frame`] from the
/// blocking pool.
pub trait VideoStream: Send {
    /// Decoded frame size, or `None` until the first frame arrives
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Copy the current frame into an off-screen buffer
    fn grab_frame(&mut self) -> Option<RgbaImage>;

    /// Stop all tracks of the stream
    fn stop(&mut self);
}

/// Clears the in-flight capture flag on every exit path
struct CaptureGuard<'a>(&'a AtomicBool);

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

type SharedStream = Arc<Mutex<Box<dyn VideoStream>>>;

fn lock_stream(stream: &SharedStream) -> MutexGuard<'_, Box<dyn VideoStream>> {
    stream.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct CaptureController<C: Camera> {
    camera: C,
    stream: Mutex<Option<SharedStream>>,
    capturing: AtomicBool,
    shutter_started: Mutex<Option<Instant>>,
    jpeg_quality: u8,
}

impl<C: Camera> CaptureController<C> {
    pub fn new(camera: C) -> Self {
        Self {
            camera,
            stream: Mutex::new(None),
            capturing: AtomicBool::new(false),
            shutter_started: Mutex::new(None),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    fn stream_slot(&self) -> MutexGuard<'_, Option<SharedStream>> {
        // A poisoned slot still holds a valid stream handle
        self.stream.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has_stream(&self) -> bool {
        self.stream_slot().is_some()
    }

    /// Open a camera stream, relaxing constraints until one succeeds
    pub async fn acquire_stream(&self, facing: Facing) -> Result<(), CaptureError> {
        self.release_stream();

        let mut permission_denied = false;
        let mut last_error = None;

        for constraints in StreamConstraints::fallback_chain(facing) {
            match self.camera.open(&constraints).await {
                Ok(stream) => {
                    info!(?constraints, "camera stream acquired");
                    *self.stream_slot() = Some(Arc::new(Mutex::new(stream)));
                    return Ok(());
                }
                Err(e) => {
                    debug!(?constraints, error = %e, "camera constraints rejected");
                    if matches!(e, CaptureError::PermissionDenied) {
                        permission_denied = true;
                    }
                    last_error = Some(e);
                }
            }
        }

        if permission_denied {
            warn!("camera permission denied");
            return Err(CaptureError::PermissionDenied);
        }
        let detail = last_error.map(|e| e.to_string()).unwrap_or_default();
        warn!("camera unavailable: {}", detail);
        Err(CaptureError::Device(detail))
    }

    /// Stop the stream if one is open; safe to call repeatedly
    pub fn release_stream(&self) {
        let released = self.stream_slot().take();
        if let Some(stream) = released {
            lock_stream(&stream).stop();
            debug!("camera stream released");
        }
    }

    /// True while the shutter acknowledgment should be shown
    pub fn shutter_active(&self) -> bool {
        self.shutter_started
            .lock()
            .map(|started| started.map_or(false, |t| t.elapsed() < SHUTTER_DURATION))
            .unwrap_or(false)
    }

    /// Capture the current frame as a JPEG data URI
    ///
    /// Returns `None` without side effects when a capture is already in
    /// flight, an analysis is running, or the stream has no decoded frame yet.
    pub async fn capture_frame(&self, analysis_busy: bool) -> Option<String> {
        if analysis_busy {
            return None;
        }
        if self.capturing.swap(true, Ordering::AcqRel) {
            return None;
        }
        let _guard = CaptureGuard(&self.capturing);

        let stream = self.stream_slot().clone()?;
        let grabbed = tokio::task::spawn_blocking(move || {
            let mut live = lock_stream(&stream);
            match live.dimensions() {
                Some((w, h)) if w > 0 && h > 0 => live.grab_frame(),
                _ => {
                    debug!("capture skipped, stream not ready");
                    None
                }
            }
        })
        .await;
        let frame = match grabbed {
            Ok(frame) => frame?,
            Err(e) => {
                warn!("frame grab task failed: {}", e);
                return None;
            }
        };

        if let Ok(mut started) = self.shutter_started.lock() {
            *started = Some(Instant::now());
        }
        // Let the front-end draw the shutter before the encode starts
        tokio::task::yield_now().await;

        let quality = self.jpeg_quality;
        match tokio::task::spawn_blocking(move || imaging::encode_frame(frame, quality)).await {
            Ok(Ok(encoded)) => Some(encoded),
            Ok(Err(e)) => {
                warn!("frame encode failed: {}", e);
                None
            }
            Err(e) => {
                warn!("frame encode task failed: {}", e);
                None
            }
        }
    }

    /// Import an image file in the same encoding as captured frames
    pub async fn import_file(&self, path: &Path) -> Result<String, CaptureError> {
        import_file(path, self.jpeg_quality).await
    }
}

impl<C: Camera> Drop for CaptureController<C> {
    fn drop(&mut self) {
        self.release_stream();
    }
}

/// Read an image file and re-encode it as a JPEG data URI
pub async fn import_file(path: &Path, quality: u8) -> Result<String, CaptureError> {
    let bytes = tokio::fs::read(path).await?;
    if image::guess_format(&bytes).is_err() {
        return Err(CaptureError::Unsupported(path.display().to_string()));
    }

    let encoded = tokio::task::spawn_blocking(move || imaging::reencode_bytes(&bytes, quality))
        .await
        .map_err(|e| CaptureError::Device(e.to_string()))??;

    info!(path = %path.display(), "imported image");
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::atomic::AtomicUsize;

    struct FakeStream {
        ready: bool,
        stops: Arc<AtomicUsize>,
        grab_threads: Arc<Mutex<Vec<std::thread::ThreadId>>>,
    }

    impl VideoStream for FakeStream {
        fn dimensions(&self) -> Option<(u32, u32)> {
            self.ready.then_some((4, 4))
        }

        fn grab_frame(&mut self) -> Option<RgbaImage> {
            self.grab_threads.lock().unwrap().push(std::thread::current().id());
            Some(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])))
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Accepts only constraint sets at or after `accept_from` in the chain
    struct FakeCamera {
        accept_from: usize,
        deny_permission: bool,
        ready: bool,
        opens: AtomicUsize,
        stops: Arc<AtomicUsize>,
        grab_threads: Arc<Mutex<Vec<std::thread::ThreadId>>>,
    }

    impl FakeCamera {
        fn new(accept_from: usize) -> Self {
            Self {
                accept_from,
                deny_permission: false,
                ready: true,
                opens: AtomicUsize::new(0),
                stops: Arc::new(AtomicUsize::new(0)),
                grab_threads: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Camera for FakeCamera {
        async fn open(&self, _constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CaptureError> {
            let attempt = self.opens.fetch_add(1, Ordering::SeqCst);
            if self.deny_permission {
                return Err(CaptureError::PermissionDenied);
            }
            if attempt < self.accept_from {
                return Err(CaptureError::Device("OverconstrainedError".into()));
            }
            Ok(Box::new(FakeStream {
                ready: self.ready,
                stops: self.stops.clone(),
                grab_threads: self.grab_threads.clone(),
            }))
        }
    }

    #[test]
    fn test_fallback_chain_relaxes() {
        let chain = StreamConstraints::fallback_chain(Facing::Environment);
        assert!(chain[0].exact_facing && chain[0].ideal_width.is_some());
        assert_eq!(chain[1].facing, Some(Facing::Environment));
        assert!(!chain[1].exact_facing);
        assert_eq!(chain[2], StreamConstraints::default());
    }

    #[tokio::test]
    async fn test_acquire_falls_back_to_unconstrained() {
        let controller = CaptureController::new(FakeCamera::new(2));
        controller.acquire_stream(Facing::Environment).await.unwrap();
        assert!(controller.has_stream());
        assert_eq!(controller.camera.opens.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_acquire_stops_at_first_success() {
        let controller = CaptureController::new(FakeCamera::new(0));
        controller.acquire_stream(Facing::Environment).await.unwrap();
        assert_eq!(controller.camera.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_distinguishes_permission_denial() {
        let mut camera = FakeCamera::new(0);
        camera.deny_permission = true;
        let controller = CaptureController::new(camera);
        let err = controller.acquire_stream(Facing::Environment).await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied));

        let controller = CaptureController::new(FakeCamera::new(5));
        let err = controller.acquire_stream(Facing::Environment).await.unwrap_err();
        assert!(matches!(err, CaptureError::Device(_)));
        assert!(!controller.has_stream());
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_runs_on_drop() {
        let camera = FakeCamera::new(0);
        let stops = camera.stops.clone();
        let controller = CaptureController::new(camera);
        controller.acquire_stream(Facing::Environment).await.unwrap();

        controller.release_stream();
        controller.release_stream();
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        controller.acquire_stream(Facing::Environment).await.unwrap();
        drop(controller);
        assert_eq!(stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_capture_produces_jpeg_and_shutter() {
        let controller = CaptureController::new(FakeCamera::new(0));
        controller.acquire_stream(Facing::Environment).await.unwrap();

        let shot = controller.capture_frame(false).await.unwrap();
        assert!(shot.starts_with("data:image/jpeg;base64,"));
        assert!(controller.shutter_active());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_frame_grab_runs_off_the_runtime_thread() {
        let camera = FakeCamera::new(0);
        let grab_threads = camera.grab_threads.clone();
        let controller = CaptureController::new(camera);
        controller.acquire_stream(Facing::Environment).await.unwrap();

        assert!(controller.capture_frame(false).await.is_some());
        let threads = grab_threads.lock().unwrap();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[tokio::test]
    async fn test_capture_soft_fails() {
        // No stream at all
        let controller = CaptureController::new(FakeCamera::new(0));
        assert!(controller.capture_frame(false).await.is_none());

        // Stream without decoded dimensions
        let mut camera = FakeCamera::new(0);
        camera.ready = false;
        let controller = CaptureController::new(camera);
        controller.acquire_stream(Facing::Environment).await.unwrap();
        assert!(controller.capture_frame(false).await.is_none());
        assert!(!controller.shutter_active());

        // Analysis in flight
        let controller = CaptureController::new(FakeCamera::new(0));
        controller.acquire_stream(Facing::Environment).await.unwrap();
        assert!(controller.capture_frame(true).await.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_concurrent_capture_is_dropped() {
        let controller = CaptureController::new(FakeCamera::new(0));
        controller.acquire_stream(Facing::Environment).await.unwrap();

        let (a, b) = tokio::join!(controller.capture_frame(false), controller.capture_frame(false));
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);

        // The guard is cleared once the first capture finishes
        assert!(controller.capture_frame(false).await.is_some());
    }

    #[tokio::test]
    async fn test_import_file_reencodes() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("label.png");
        RgbaImage::from_pixel(5, 3, Rgba([1, 2, 3, 255])).save(&png).unwrap();

        let encoded = import_file(&png, 80).await.unwrap();
        assert!(encoded.starts_with("data:image/jpeg;base64,"));

        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "hello").unwrap();
        assert!(matches!(import_file(&txt, 80).await, Err(CaptureError::Unsupported(_))));

        let missing = dir.path().join("missing.jpg");
        assert!(matches!(import_file(&missing, 80).await, Err(CaptureError::Io(_))));
    }
}
