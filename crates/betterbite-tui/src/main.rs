use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use betterbite_core::{AuthWatcher, Config, GeminiClient, Session, SupabaseClient};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod app;
mod camera;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

const DEFAULT_LOG_FILTER: &str = "betterbite=info,betterbite_core=info";

/// Log to a file; stdout and stderr belong to the terminal UI
fn init_logging() -> Result<()> {
    let log_path = Config::log_path()?;
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Load the persisted session, refreshing it if the access token expired
async fn restore_session(path: &Path, supabase: Option<&SupabaseClient>) -> Option<Session> {
    let session = match Session::load(path) {
        Ok(session) => session?,
        Err(e) => {
            warn!("Ignoring stored session: {}", e);
            return None;
        }
    };
    if !session.is_expired() {
        return Some(session);
    }

    let client = supabase?;
    match client.refresh_session(&session).await {
        Ok(fresh) => {
            info!(user = %fresh.user.id, "session refreshed");
            Some(fresh)
        }
        Err(e) => {
            warn!("Session refresh failed: {}", e);
            None
        }
    }
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    app.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let mut config = Config::load().inspect_err(|e| error!("{}", e))?;
    if !Config::get_config_path()?.exists() {
        // Saved before env overrides so environment secrets never reach the file
        match config.save() {
            Ok(()) => info!("wrote starter config"),
            Err(e) => warn!("Could not write starter config: {}", e),
        }
    }
    config.apply_env();

    let api_key = config.gemini_api_key.clone().ok_or_else(|| {
        anyhow!(
            "No Gemini API key. Set GEMINI_API_KEY or add gemini_api_key to {}",
            Config::get_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "config.json".to_string())
        )
    })?;
    let mut gemini = GeminiClient::new(&api_key);
    if let Some(model) = &config.gemini_model {
        gemini = gemini.with_model(model);
    }

    let supabase = match (&config.supabase_url, &config.supabase_anon_key) {
        (Some(url), Some(key)) => Some(SupabaseClient::new(url, key)),
        _ => {
            info!("Supabase not configured, running without accounts");
            None
        }
    };

    let session_path = Config::session_path()?;
    let session = restore_session(&session_path, supabase.as_ref()).await;
    let auth = AuthWatcher::new(session);

    info!(model = gemini.model(), "starting BetterBite");
    let mut app = App::new(config, Arc::new(gemini), supabase, auth.clone(), session_path)?;
    app.open_camera().await;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(auth.subscribe());

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}
