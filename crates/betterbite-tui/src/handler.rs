use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, InputMode, LoginField, Screen};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_tasks().await;
        }
        AppEvent::Auth(session) => app.handle_auth(session).await,
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key).await,
        InputMode::Editing => handle_editing_mode(app, key).await,
    }

    Ok(())
}

async fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match app.screen {
        Screen::Capture => handle_capture_normal(app, key).await,
        Screen::Results => handle_results_normal(app, key).await,
        Screen::History => handle_history_normal(app, key).await,
        Screen::Pricing => handle_pricing_normal(app, key).await,
        Screen::Login => {
            if key.code == KeyCode::Char('q') {
                app.should_quit = true;
            } else {
                app.input_mode = InputMode::Editing;
            }
        }
    }
}

async fn handle_capture_normal(app: &mut App, key: KeyEvent) {
    // While analyzing only quitting is allowed
    if app.is_analyzing() {
        if key.code == KeyCode::Char('q') {
            app.should_quit = true;
        }
        return;
    }

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Shutter
        KeyCode::Char(' ') | KeyCode::Char('c') => {
            app.status = None;
            app.start_capture();
        }
        KeyCode::Char('r') => app.open_camera().await,

        // File import fallback
        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.status = None;
            app.input_mode = InputMode::Editing;
        }

        // Pending shots
        KeyCode::Char('j') | KeyCode::Down => app.shot_down(),
        KeyCode::Char('k') | KeyCode::Up => app.shot_up(),
        KeyCode::Char('d') | KeyCode::Delete => app.remove_selected_shot(),
        KeyCode::Enter | KeyCode::Char('a') => app.start_analysis(),

        KeyCode::Char('m') | KeyCode::Tab => app.cycle_mode(),

        // Screen switching
        KeyCode::Char('h') => app.enter_screen(Screen::History).await,
        KeyCode::Char('p') => app.enter_screen(Screen::Pricing).await,
        KeyCode::Char('l') if app.scanner.user().is_logged_in => app.sign_out().await,
        KeyCode::Char('l') => {
            app.enter_screen(Screen::Login).await;
            app.input_mode = InputMode::Editing;
        }

        _ => {}
    }
}

async fn handle_results_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.results_scroll = app.results_scroll.saturating_add(1),
        KeyCode::Char('k') | KeyCode::Up => app.results_scroll = app.results_scroll.saturating_sub(1),
        KeyCode::Char('h') => app.enter_screen(Screen::History).await,
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('n') => {
            app.return_to_capture_view();
            app.enter_screen(Screen::Capture).await;
        }
        _ => {}
    }
}

async fn handle_history_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.history_down(),
        KeyCode::Char('k') | KeyCode::Up => app.history_up(),
        KeyCode::Esc | KeyCode::Char('h') => {
            app.return_to_capture_view();
            app.enter_screen(Screen::Capture).await;
        }
        _ => {}
    }
}

async fn handle_pricing_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('l') if !app.scanner.user().is_logged_in => {
            app.return_to_capture_view();
            app.enter_screen(Screen::Login).await;
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Esc | KeyCode::Char('p') => {
            app.return_to_capture_view();
            app.enter_screen(Screen::Capture).await;
        }
        _ => {}
    }
}

async fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match app.screen {
        Screen::Login => handle_login_editing(app, key).await,
        _ => handle_path_editing(app, key).await,
    }
}

async fn handle_path_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.path_input.clear();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.input_mode = InputMode::Normal;
            app.import_path().await;
        }
        KeyCode::Backspace => {
            app.path_input.pop();
        }
        KeyCode::Char(c) => app.path_input.push(c),
        _ => {}
    }
}

async fn handle_login_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.continue_as_guest().await,
        KeyCode::Tab | KeyCode::Down | KeyCode::Up => {
            app.login_field = match app.login_field {
                LoginField::Email => LoginField::Password,
                LoginField::Password => LoginField::Email,
            };
        }
        KeyCode::Enter => match app.login_field {
            LoginField::Email => app.login_field = LoginField::Password,
            LoginField::Password => app.sign_in().await,
        },
        KeyCode::Backspace => {
            login_input(app).pop();
        }
        KeyCode::Char(c) => login_input(app).push(c),
        _ => {}
    }
}

fn login_input(app: &mut App) -> &mut String {
    match app.login_field {
        LoginField::Email => &mut app.email_input,
        LoginField::Password => &mut app.password_input,
    }
}
