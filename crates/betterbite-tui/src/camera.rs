//! Camera backed by a watched folder
//!
//! A terminal has no camera API, so the "live feed" is the newest image in a
//! folder that a phone sync, `fswebcam` or a screenshot tool writes into.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use betterbite_core::{Camera, CaptureError, StreamConstraints, VideoStream};
use image::RgbaImage;
use tracing::debug;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

pub struct FolderCamera {
    dir: PathBuf,
}

impl FolderCamera {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl Camera for FolderCamera {
    async fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CaptureError> {
        // A folder has no lens to select
        if constraints.exact_facing {
            return Err(CaptureError::Device("facing cannot be selected".into()));
        }

        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(CaptureError::Device(format!("{} is not a folder", self.dir.display())));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(CaptureError::PermissionDenied);
            }
            Err(e) => {
                return Err(CaptureError::Device(format!("{}: {}", self.dir.display(), e)));
            }
        }

        Ok(Box::new(FolderStream {
            dir: self.dir.clone(),
            stopped: false,
        }))
    }
}

struct FolderStream {
    dir: PathBuf,
    stopped: bool,
}

impl FolderStream {
    fn current_frame_path(&self) -> Option<PathBuf> {
        if self.stopped {
            return None;
        }
        newest_image(&self.dir)
    }
}

impl VideoStream for FolderStream {
    fn dimensions(&self) -> Option<(u32, u32)> {
        let path = self.current_frame_path()?;
        image::image_dimensions(&path).ok()
    }

    fn grab_frame(&mut self) -> Option<RgbaImage> {
        let path = self.current_frame_path()?;
        match image::open(&path) {
            Ok(img) => Some(img.to_rgba8()),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "frame unreadable");
                None
            }
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Most recently modified image file in `dir`
pub fn newest_image(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use betterbite_core::{CaptureController, Facing};
    use image::Rgba;

    fn write_frame(dir: &Path, name: &str) {
        RgbaImage::from_pixel(8, 6, Rgba([10, 200, 30, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    #[tokio::test]
    async fn test_exact_facing_rejected_then_relaxed() {
        let dir = tempfile::tempdir().unwrap();
        let camera = FolderCamera::new(dir.path().to_path_buf());

        let [exact, relaxed, _] = StreamConstraints::fallback_chain(Facing::Environment);
        assert!(camera.open(&exact).await.is_err());
        assert!(camera.open(&relaxed).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_folder_is_device_error() {
        let dir = tempfile::tempdir().unwrap();
        let controller = CaptureController::new(FolderCamera::new(dir.path().join("missing")));

        let err = controller.acquire_stream(Facing::Environment).await.unwrap_err();
        assert!(matches!(err, CaptureError::Device(_)));
        assert!(!controller.has_stream());
    }

    #[tokio::test]
    async fn test_empty_folder_has_no_frame() {
        let dir = tempfile::tempdir().unwrap();
        let controller = CaptureController::new(FolderCamera::new(dir.path().to_path_buf()));
        controller.acquire_stream(Facing::Environment).await.unwrap();

        assert_eq!(controller.capture_frame(false).await, None);
    }

    #[tokio::test]
    async fn test_captures_newest_image() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "label.png");
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let controller = CaptureController::new(FolderCamera::new(dir.path().to_path_buf()));
        controller.acquire_stream(Facing::Environment).await.unwrap();

        let shot = controller.capture_frame(false).await.unwrap();
        assert!(shot.starts_with("data:image/jpeg;base64,"));
        assert_eq!(newest_image(dir.path()), Some(dir.path().join("label.png")));
    }

    #[tokio::test]
    async fn test_stopped_stream_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "label.png");
        let camera = FolderCamera::new(dir.path().to_path_buf());

        let mut stream = camera.open(&StreamConstraints::default()).await.unwrap();
        assert_eq!(stream.dimensions(), Some((8, 6)));
        stream.stop();
        assert_eq!(stream.dimensions(), None);
        assert!(stream.grab_frame().is_none());
    }
}
