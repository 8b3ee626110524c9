use thiserror::Error;

/// Failures while acquiring the camera or producing an image encoding
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera unavailable: {0}")]
    Device(String),

    #[error("Not an image file: {0}")]
    Unsupported(String),

    #[error("Image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    #[error("File could not be read: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Message shown next to the retry prompt on the capture view
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied => {
                "Camera access was blocked. Allow camera access and try again."
            }
            CaptureError::Device(_) => "No usable camera was found. Try again or upload a photo.",
            CaptureError::Unsupported(_) => "That file is not an image.",
            CaptureError::Decode(_) | CaptureError::Io(_) => "That photo could not be opened.",
        }
    }
}

/// Any failure of an analysis request
///
/// Transport failures, service errors and malformed model output all map to
/// this one type; callers only learn that the attempt failed.
#[derive(Error, Debug)]
#[error("Product analysis failed: {0}")]
pub struct AnalysisError(pub String);

impl AnalysisError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(e: serde_json::Error) -> Self {
        Self(format!("unparseable model output: {}", e))
    }
}
