pub mod gemini;
pub mod prompt;

pub use gemini::GeminiClient;

use async_trait::async_trait;

use crate::analysis::Analysis;
use crate::error::AnalysisError;
use crate::mode::ScanMode;

/// A hosted model that scores products from label photos
///
/// One call is one attempt: implementations do not retry.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Analyze 1-3 image encodings (data URIs or bare base64) for `mode`
    async fn analyze(&self, images: &[String], mode: ScanMode) -> Result<Analysis, AnalysisError>;
}
