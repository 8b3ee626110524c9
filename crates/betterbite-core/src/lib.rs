pub mod ai;
pub mod analysis;
pub mod capture;
pub mod config;
pub mod error;
pub mod flow;
pub mod imaging;
pub mod mode;
pub mod profile;
pub mod session;
pub mod state;
pub mod tier;

// Re-export main types for convenience
pub use ai::{AnalysisService, GeminiClient};
pub use analysis::{Analysis, ComparisonAnalysis, HealthAnalysis, HealthPoint};
pub use capture::{Camera, CaptureController, Facing, StreamConstraints, VideoStream};
pub use config::Config;
pub use error::{AnalysisError, CaptureError};
pub use flow::{AnalysisRequest, FlowState, Scanner, ShotSet, Step, Submission};
pub use mode::ScanMode;
pub use profile::{ProfileStore, SupabaseClient};
pub use session::{AuthOutcome, AuthWatcher, ProfileSync, Session, SessionUser};
pub use state::{Profile, ScanResult, SessionEvent, UserState};
pub use tier::{Tier, TierConfig, UNLIMITED_SCANS};
