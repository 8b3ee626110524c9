//! Quota-gated analysis flow
//!
//! ```text
//!   Idle ──shot──▶ AwaitingShots ──submit──▶ Analyzing ──ok──▶ Result
//!     ▲                 │                        │
//!     │                 └──quota exhausted──▶ Upsell
//!     └──────────────────────failed──────────────┘
//! ```
//!
//! [`Scanner`] is the single context object front-ends talk to. It owns the
//! user state, the pending shot set and the flow state, and is the only place
//! where quota is consumed.

use std::sync::Arc;

use tracing::{info, warn};

use crate::ai::AnalysisService;
use crate::analysis::Analysis;
use crate::error::AnalysisError;
use crate::mode::ScanMode;
use crate::profile::ProfileStore;
use crate::session::{AuthOutcome, ProfileSync, Session};
use crate::state::{ScanResult, SessionEvent, UserState};

/// Images collected for one analysis request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotSet {
    mode: ScanMode,
    shots: Vec<String>,
}

impl ShotSet {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            shots: Vec::new(),
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn shots(&self) -> &[String] {
        &self.shots
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.mode.max_shots()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.cap()
    }

    /// Append a shot; hands the image back when the set is already full
    pub fn push(&mut self, image: String) -> Result<usize, String> {
        if self.is_full() {
            return Err(image);
        }
        self.shots.push(image);
        Ok(self.shots.len())
    }

    pub fn remove(&mut self, index: usize) -> Option<String> {
        (index < self.shots.len()).then(|| self.shots.remove(index))
    }

    pub fn into_images(self) -> Vec<String> {
        self.shots
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    Idle,
    AwaitingShots(ShotSet),
    Analyzing { mode: ScanMode, shot_count: usize },
    Result(Analysis),
    Upsell,
}

impl FlowState {
    pub fn is_busy(&self) -> bool {
        matches!(self, FlowState::Analyzing { .. })
    }
}

/// One dispatched analysis, handed back to [`Scanner::finish_submission`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub mode: ScanMode,
    pub images: Vec<String>,
    /// Auth generation the request was dispatched under
    auth_generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Dispatch(AnalysisRequest),
    /// Quota exhausted; nothing was sent
    Upsell,
    /// An analysis is already in flight
    Dropped,
    /// No shots to submit
    Empty,
}

/// Outcome of a user action on the flow
#[derive(Debug)]
pub enum Step {
    Collecting { count: usize, cap: usize },
    /// The shot set is complete and should be submitted now
    ReadyToSubmit,
    /// The shot set is already at its cap
    Rejected,
    /// Ignored because an analysis is in flight
    Dropped,
    Nothing,
    Upsell,
    Completed,
    Failed(AnalysisError),
    /// The auth state changed while the analysis ran; its result was thrown away
    Discarded,
}

pub struct Scanner {
    analyzer: Arc<dyn AnalysisService>,
    sync: ProfileSync,
    session: Option<Session>,
    user: UserState,
    mode: ScanMode,
    state: FlowState,
    last_analysis: Option<Analysis>,
    last_error: Option<String>,
    /// Bumped on every auth change so in-flight results can be matched to the
    /// account that dispatched them
    auth_generation: u64,
}

impl Scanner {
    pub fn new(analyzer: Arc<dyn AnalysisService>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            analyzer,
            sync: ProfileSync::new(profiles),
            session: None,
            user: UserState::default(),
            mode: ScanMode::default(),
            state: FlowState::Idle,
            last_analysis: None,
            last_error: None,
            auth_generation: 0,
        }
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn user(&self) -> &UserState {
        &self.user
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn last_analysis(&self) -> Option<&Analysis> {
        self.last_analysis.as_ref()
    }

    /// Message from the most recent failed analysis, until the next attempt
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn analyzer(&self) -> Arc<dyn AnalysisService> {
        self.analyzer.clone()
    }

    pub fn pending_shots(&self) -> &[String] {
        match &self.state {
            FlowState::AwaitingShots(set) => set.shots(),
            _ => &[],
        }
    }

    /// Switch capture mode; pending shots are discarded since the cap changes
    pub fn set_mode(&mut self, mode: ScanMode) -> bool {
        if self.is_busy() {
            return false;
        }
        if mode != self.mode {
            self.mode = mode;
            if matches!(self.state, FlowState::AwaitingShots(_)) {
                self.state = FlowState::Idle;
            }
        }
        true
    }

    /// Leave the result or upsell view and return to capture
    pub fn return_to_capture(&mut self) {
        if matches!(self.state, FlowState::Result(_) | FlowState::Upsell) {
            self.state = FlowState::Idle;
        }
    }

    /// Append a captured or imported image to the pending shot set
    pub fn add_shot(&mut self, image: String) -> Step {
        if self.is_busy() {
            return Step::Dropped;
        }

        let mut set = match std::mem::replace(&mut self.state, FlowState::Idle) {
            FlowState::AwaitingShots(set) => set,
            _ => ShotSet::new(self.mode),
        };

        let step = match set.push(image) {
            Err(_) => Step::Rejected,
            Ok(_) if set.is_full() => Step::ReadyToSubmit,
            Ok(count) => Step::Collecting {
                count,
                cap: set.cap(),
            },
        };
        self.state = FlowState::AwaitingShots(set);
        step
    }

    /// Remove a pending shot, keeping the others in order
    pub fn remove_shot(&mut self, index: usize) -> Option<String> {
        let FlowState::AwaitingShots(set) = &mut self.state else {
            return None;
        };
        let removed = set.remove(index);
        if set.is_empty() {
            self.state = FlowState::Idle;
        }
        removed
    }

    /// Run the quota guard and, if it passes, enter the analyzing state
    pub fn begin_submission(&mut self) -> Submission {
        match &self.state {
            FlowState::Analyzing { .. } => return Submission::Dropped,
            FlowState::AwaitingShots(set) if !set.is_empty() => {}
            _ => return Submission::Empty,
        }

        if self.user.quota_exhausted() {
            info!(scans_remaining = self.user.scans_remaining, "quota exhausted, showing upsell");
            self.user.apply(SessionEvent::QuotaExhausted);
            self.state = FlowState::Upsell;
            return Submission::Upsell;
        }

        let FlowState::AwaitingShots(set) = std::mem::replace(&mut self.state, FlowState::Idle) else {
            return Submission::Empty;
        };
        let mode = set.mode();
        let images = set.into_images();
        self.last_error = None;
        self.state = FlowState::Analyzing {
            mode,
            shot_count: images.len(),
        };
        info!(mode = mode.as_str(), shots = images.len(), "dispatching analysis");
        Submission::Dispatch(AnalysisRequest {
            mode,
            images,
            auth_generation: self.auth_generation,
        })
    }

    /// Apply the outcome of a dispatched analysis
    ///
    /// Results dispatched before the last auth change are dropped without
    /// touching quota or history.
    pub async fn finish_submission(
        &mut self,
        request: AnalysisRequest,
        result: Result<Analysis, AnalysisError>,
    ) -> Step {
        if !self.is_busy() {
            warn!("analysis finished outside the analyzing state, ignoring");
            return Step::Discarded;
        }
        if request.auth_generation != self.auth_generation {
            info!("auth changed during analysis, discarding result");
            self.state = FlowState::Idle;
            return Step::Discarded;
        }

        let analysis = match result {
            Ok(analysis) => analysis,
            Err(e) => return self.fail(e),
        };
        let Some(headline) = analysis.headline().cloned() else {
            return self.fail(AnalysisError::new("analysis contained no products"));
        };

        let before = self.user.scans_remaining;
        let unlimited = self.user.is_unlimited();
        self.user.apply(SessionEvent::AnalysisSucceeded(ScanResult::new(
            request.images,
            headline,
        )));

        if !unlimited {
            if let Some(session) = &self.session {
                match self.sync.persist_decrement(session, before).await {
                    Ok(stored) if stored != self.user.scans_remaining => {
                        self.user.apply(SessionEvent::QuotaSynced(stored));
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Failed to persist scan quota: {}", e),
                }
            }
        }

        info!(scans_remaining = self.user.scans_remaining, "analysis complete");
        self.last_analysis = Some(analysis.clone());
        self.state = FlowState::Result(analysis);
        Step::Completed
    }

    fn fail(&mut self, error: AnalysisError) -> Step {
        warn!("{}", error);
        self.user.apply(SessionEvent::AnalysisFailed);
        self.last_error = Some(error.to_string());
        self.state = FlowState::Idle;
        Step::Failed(error)
    }

    /// Submit the pending shots and wait for the analysis
    pub async fn submit(&mut self) -> Step {
        match self.begin_submission() {
            Submission::Dispatch(request) => {
                let result = self.analyzer.analyze(&request.images, request.mode).await;
                self.finish_submission(request, result).await
            }
            Submission::Upsell => Step::Upsell,
            Submission::Dropped => Step::Dropped,
            Submission::Empty => Step::Nothing,
        }
    }

    /// Add a shot and submit straight away once the set is complete
    pub async fn capture(&mut self, image: String) -> Step {
        match self.add_shot(image) {
            Step::ReadyToSubmit => self.submit().await,
            step => step,
        }
    }

    /// React to an auth state change from the hosted auth service
    pub async fn handle_auth_change(&mut self, session: Option<Session>) -> AuthOutcome {
        self.auth_generation += 1;
        self.session = session;
        self.sync.on_auth_change(self.session.as_ref(), &mut self.user).await
    }
}
