use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use betterbite_core::{
    capture, Analysis, AnalysisError, AnalysisRequest, AnalysisService, AuthOutcome, AuthWatcher,
    CaptureController, Config, Facing, FlowState, Profile, ProfileStore, ScanResult, Scanner,
    Session, Step, Submission, SupabaseClient,
};
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::camera::FolderCamera;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Capture,
    Results,
    History,
    Pricing,
    Login,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Password,
}

/// Profile store used when no Supabase project is configured
struct NoProfileStore;

#[async_trait]
impl ProfileStore for NoProfileStore {
    async fn fetch_profile(&self, _session: &Session) -> Result<Profile> {
        Err(anyhow!("Supabase is not configured"))
    }

    async fn update_scans_remaining(&self, _session: &Session, _expected: i32, _new: i32) -> Result<bool> {
        Err(anyhow!("Supabase is not configured"))
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub config: Config,
    pub scanner: Scanner,

    // Capture state
    pub capture: Arc<CaptureController<FolderCamera>>,
    pub capture_dir: PathBuf,
    pub camera_error: Option<String>,
    pub capture_task: Option<JoinHandle<Option<String>>>,
    pub shot_state: ListState,
    pub path_input: String,

    // Analysis state
    pub analysis_task: Option<(AnalysisRequest, JoinHandle<Result<Analysis, AnalysisError>>)>,
    pub animation_frame: u8,

    // Account state
    pub supabase: Option<SupabaseClient>,
    pub auth: AuthWatcher,
    pub session_path: PathBuf,
    pub guest: bool,
    pub email_input: String,
    pub password_input: String,
    pub login_field: LoginField,

    pub history_state: ListState,
    pub results_scroll: u16,

    /// One-line message shown above the footer
    pub status: Option<String>,
}

impl App {
    pub fn new(
        config: Config,
        analyzer: Arc<dyn AnalysisService>,
        supabase: Option<SupabaseClient>,
        auth: AuthWatcher,
        session_path: PathBuf,
    ) -> Result<Self> {
        let profiles: Arc<dyn ProfileStore> = match &supabase {
            Some(client) => Arc::new(client.clone()),
            None => Arc::new(NoProfileStore),
        };
        let scanner = Scanner::new(analyzer, profiles).with_mode(config.default_mode());

        let capture_dir = config.capture_dir()?;
        let capture = CaptureController::new(FolderCamera::new(capture_dir.clone()))
            .with_jpeg_quality(config.jpeg_quality());

        Ok(Self {
            should_quit: false,
            screen: Screen::Capture,
            input_mode: InputMode::Normal,
            config,
            scanner,

            capture: Arc::new(capture),
            capture_dir,
            camera_error: None,
            capture_task: None,
            shot_state: ListState::default(),
            path_input: String::new(),

            analysis_task: None,
            animation_frame: 0,

            supabase,
            auth,
            session_path,
            guest: false,
            email_input: String::new(),
            password_input: String::new(),
            login_field: LoginField::Email,

            history_state: ListState::default(),
            results_scroll: 0,

            status: None,
        })
    }

    pub fn is_analyzing(&self) -> bool {
        self.analysis_task.is_some()
    }

    pub fn tick_animation(&mut self) {
        if self.is_analyzing() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Switch screens, holding the camera only while the capture view is shown
    pub async fn enter_screen(&mut self, screen: Screen) {
        if self.screen == Screen::Capture && screen != Screen::Capture {
            self.capture.release_stream();
        }
        if screen == Screen::Capture && !self.capture.has_stream() {
            self.open_camera().await;
        }
        if screen == Screen::History {
            self.clamp_history_selection();
        }
        self.screen = screen;
    }

    /// Keep the history selection on an existing entry, defaulting to the newest
    fn clamp_history_selection(&mut self) {
        let len = self.scanner.user().history.len();
        let selected = match self.history_state.selected() {
            Some(idx) if idx < len => Some(idx),
            _ => len.checked_sub(1),
        };
        self.history_state.select(selected);
    }

    pub async fn open_camera(&mut self) {
        match self.capture.acquire_stream(Facing::Environment).await {
            Ok(()) => self.camera_error = None,
            Err(e) => self.camera_error = Some(e.user_message().to_string()),
        }
    }

    /// Grab the current camera frame on a background task
    pub fn start_capture(&mut self) {
        if self.capture_task.is_some() || self.is_analyzing() {
            return;
        }
        let capture = self.capture.clone();
        let busy = self.scanner.is_busy();
        self.capture_task = Some(tokio::spawn(async move { capture.capture_frame(busy).await }));
    }

    pub async fn import_path(&mut self) {
        let path = self.path_input.trim().to_string();
        if path.is_empty() {
            return;
        }
        match capture::import_file(Path::new(&path), self.config.jpeg_quality()).await {
            Ok(image) => {
                self.path_input.clear();
                self.add_shot(image);
            }
            Err(e) => {
                warn!("Import failed: {}", e);
                self.status = Some(format!("{} ({})", e.user_message(), path));
            }
        }
    }

    pub fn add_shot(&mut self, image: String) {
        match self.scanner.add_shot(image) {
            Step::ReadyToSubmit => self.start_analysis(),
            Step::Collecting { count, cap } => {
                self.shot_state.select(Some(count - 1));
                self.status = Some(format!("{} of {} photos added", count, cap));
            }
            Step::Rejected => {
                self.status = Some(format!(
                    "{} takes at most {} photos",
                    self.scanner.mode().display_name(),
                    self.scanner.mode().max_shots()
                ));
            }
            _ => {}
        }
    }

    pub fn remove_selected_shot(&mut self) {
        let Some(idx) = self.shot_state.selected() else {
            return;
        };
        if self.scanner.remove_shot(idx).is_some() {
            let remaining = self.scanner.pending_shots().len();
            self.shot_state
                .select(remaining.checked_sub(1).map(|last| idx.min(last)));
        }
    }

    /// Submit the pending shots, or show pricing when the quota is used up
    pub fn start_analysis(&mut self) {
        match self.scanner.begin_submission() {
            Submission::Dispatch(request) => {
                let analyzer = self.scanner.analyzer();
                let images = request.images.clone();
                let mode = request.mode;
                self.status = None;
                self.shot_state.select(None);
                self.analysis_task = Some((
                    request,
                    tokio::spawn(async move { analyzer.analyze(&images, mode).await }),
                ));
            }
            Submission::Upsell => {
                self.capture.release_stream();
                self.screen = Screen::Pricing;
            }
            Submission::Empty => {
                self.status = Some("Capture or import a photo first".to_string());
            }
            Submission::Dropped => {}
        }
    }

    /// Collect finished background tasks
    pub async fn poll_tasks(&mut self) {
        if self.capture_task.as_ref().is_some_and(|t| t.is_finished()) {
            if let Some(task) = self.capture_task.take() {
                match task.await {
                    Ok(Some(image)) => self.add_shot(image),
                    Ok(None) => {
                        if self.camera_error.is_none() {
                            self.status = Some(format!("No frame yet in {}", self.capture_dir.display()));
                        }
                    }
                    Err(e) => warn!("Capture task failed: {}", e),
                }
            }
        }

        if self.analysis_task.as_ref().is_some_and(|(_, t)| t.is_finished()) {
            if let Some((request, task)) = self.analysis_task.take() {
                let result = task
                    .await
                    .unwrap_or_else(|e| Err(AnalysisError::new(e.to_string())));
                self.finish_analysis(request, result).await;
            }
        }
    }

    async fn finish_analysis(&mut self, request: AnalysisRequest, result: Result<Analysis, AnalysisError>) {
        match self.scanner.finish_submission(request, result).await {
            Step::Completed => {
                self.results_scroll = 0;
                // Trimming may have shifted every entry
                self.history_state.select(None);
                if let Some(scan) = self.scanner.user().history.last() {
                    self.archive_scan(scan.clone());
                }
                if self.screen != Screen::Login {
                    self.enter_screen(Screen::Results).await;
                }
            }
            Step::Failed(e) => {
                self.status = Some(format!("{}. Please try again.", e));
                if self.screen != Screen::Login {
                    self.enter_screen(Screen::Capture).await;
                }
            }
            Step::Discarded => {
                self.status = Some("Account changed during analysis; scan discarded".to_string());
            }
            _ => {}
        }
    }

    /// Upload a finished scan's photos to storage when archiving is on
    fn archive_scan(&self, scan: ScanResult) {
        if !self.config.archive_scans {
            return;
        }
        let (Some(client), Some(session)) = (self.supabase.clone(), self.scanner.session().cloned()) else {
            return;
        };

        tokio::spawn(async move {
            for (n, image) in scan.original_images.iter().enumerate() {
                let path = format!("{}/{}-{}.jpg", session.user.id, scan.id, n);
                match client.upload_image(&session, image, &path).await {
                    Ok(url) => info!(%url, "archived scan image"),
                    Err(e) => warn!("Archive upload failed: {}", e),
                }
            }
        });
    }

    pub fn return_to_capture_view(&mut self) -> bool {
        self.scanner.return_to_capture();
        matches!(self.scanner.state(), FlowState::Idle | FlowState::AwaitingShots(_))
    }

    pub fn cycle_mode(&mut self) {
        let next = self.scanner.mode().next();
        if self.scanner.set_mode(next) {
            self.shot_state.select(None);
            self.status = Some(format!("Mode: {}", next.display_name()));
        }
    }

    pub async fn handle_auth(&mut self, session: Option<Session>) {
        let persisted = match &session {
            Some(s) => s.save(&self.session_path),
            None => Session::clear(&self.session_path),
        };
        if let Err(e) = persisted {
            warn!("Could not persist session: {}", e);
        }

        let outcome = self.scanner.handle_auth_change(session).await;
        self.history_state.select(None);
        match outcome {
            AuthOutcome::SignedIn => {
                self.guest = false;
                self.password_input.clear();
                if self.screen == Screen::Login {
                    self.input_mode = InputMode::Normal;
                    self.enter_screen(Screen::Capture).await;
                }
            }
            AuthOutcome::LoginRequired if !self.guest => {
                self.capture.release_stream();
                self.screen = Screen::Login;
                self.input_mode = InputMode::Editing;
            }
            AuthOutcome::LoginRequired => {}
        }
    }

    pub async fn sign_in(&mut self) {
        let Some(client) = self.supabase.clone() else {
            self.status = Some("Sign-in needs SUPABASE_URL and SUPABASE_ANON_KEY".to_string());
            return;
        };
        let email = self.email_input.trim().to_string();
        if email.is_empty() || self.password_input.is_empty() {
            self.status = Some("Enter your email and password".to_string());
            return;
        }

        match client.sign_in_with_password(&email, &self.password_input).await {
            Ok(session) => {
                info!(user = %session.user.id, "signed in");
                self.status = None;
                self.auth.set(Some(session));
            }
            Err(e) => {
                warn!("Sign-in failed: {}", e);
                self.status = Some("Sign-in failed. Check your email and password.".to_string());
            }
        }
    }

    pub async fn sign_out(&mut self) {
        if let (Some(client), Some(session)) = (&self.supabase, self.scanner.session()) {
            if let Err(e) = client.sign_out(session).await {
                warn!("Sign-out request failed: {}", e);
            }
        }
        self.guest = false;
        self.auth.set(None);
    }

    pub async fn continue_as_guest(&mut self) {
        self.guest = true;
        self.input_mode = InputMode::Normal;
        self.enter_screen(Screen::Capture).await;
    }

    pub fn selected_history(&self) -> Option<&ScanResult> {
        self.history_state
            .selected()
            .and_then(|idx| self.scanner.user().history.get(idx))
    }

    pub fn history_down(&mut self) {
        let len = self.scanner.user().history.len();
        if len == 0 {
            return;
        }
        let next = self.history_state.selected().map_or(0, |i| (i + 1).min(len - 1));
        self.history_state.select(Some(next));
    }

    pub fn history_up(&mut self) {
        let prev = self.history_state.selected().map_or(0, |i| i.saturating_sub(1));
        if !self.scanner.user().history.is_empty() {
            self.history_state.select(Some(prev));
        }
    }

    pub fn shot_down(&mut self) {
        let len = self.scanner.pending_shots().len();
        if len > 0 {
            let next = self.shot_state.selected().map_or(0, |i| (i + 1).min(len - 1));
            self.shot_state.select(Some(next));
        }
    }

    pub fn shot_up(&mut self) {
        if !self.scanner.pending_shots().is_empty() {
            let prev = self.shot_state.selected().map_or(0, |i| i.saturating_sub(1));
            self.shot_state.select(Some(prev));
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
        if let Some((_, task)) = self.analysis_task.take() {
            task.abort();
        }
        self.capture.release_stream();
    }
}
