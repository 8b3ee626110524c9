use betterbite_core::{Analysis, FlowState, HealthAnalysis, HealthPoint, Tier, UNLIMITED_SCANS};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode, LoginField, Screen};

fn score_color(score: u8) -> Color {
    match score {
        80..=u8::MAX => Color::Green,
        60..=79 => Color::Yellow,
        _ => Color::Red,
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, status, footer
    let [header_area, body_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Capture | Screen::Login => render_capture_screen(app, frame, body_area),
        Screen::Results => render_results_screen(app, frame, body_area),
        Screen::History => render_history_screen(app, frame, body_area),
        Screen::Pricing => render_pricing_screen(app, frame, body_area),
    }

    render_status(app, frame, status_area);
    render_footer(app, frame, footer_area);

    if app.screen == Screen::Login {
        render_login(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let user = app.scanner.user();
    let quota = if user.scans_remaining == UNLIMITED_SCANS {
        "unlimited scans".to_string()
    } else {
        format!("{} scans left", user.scans_remaining)
    };
    let account = match app.scanner.session() {
        Some(session) => session.user.email.clone().unwrap_or_else(|| "signed in".to_string()),
        None => "guest".to_string(),
    };

    let title = Line::from(vec![
        Span::styled(" BetterBite ", Style::default().fg(Color::Green).bold()),
        Span::styled(format!(" {} ", user.tier.config().label), Style::default().fg(Color::White)),
        Span::styled(format!("· {} ", quota), Style::default().fg(Color::White)),
        Span::styled(format!("· {} ", account), Style::default().fg(Color::Gray)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let line = if app.is_analyzing() {
        let dots = ".".repeat(app.animation_frame as usize + 1);
        Line::from(Span::styled(
            format!(" Analyzing{}", dots),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
    } else if let Some(status) = &app.status {
        Line::from(Span::styled(format!(" {}", status), Style::default().fg(Color::Yellow)))
    } else {
        Line::default()
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Capture => " CAPTURE ",
        Screen::Results => " RESULT ",
        Screen::History => " HISTORY ",
        Screen::Pricing => " PLANS ",
        Screen::Login => " LOGIN ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let hints: Vec<Span> = match (app.screen, app.input_mode) {
        (Screen::Capture, InputMode::Normal) if app.is_analyzing() => hint("q", "quit").to_vec(),
        (Screen::Capture, InputMode::Normal) => {
            let account = if app.scanner.user().is_logged_in { "sign out" } else { "sign in" };
            [
                hint("Space", "snap"),
                hint("i", "import"),
                hint("m", "mode"),
                hint("Enter", "analyze"),
                hint("d", "remove"),
                hint("h", "history"),
                hint("p", "plans"),
                hint("l", account),
                hint("q", "quit"),
            ]
            .concat()
        }
        (Screen::Capture, InputMode::Editing) => [hint("Enter", "import"), hint("Esc", "cancel")].concat(),
        (Screen::Results, _) => [hint("j/k", "scroll"), hint("Enter", "scan again"), hint("h", "history")].concat(),
        (Screen::History, _) => [hint("j/k", "nav"), hint("Esc", "back")].concat(),
        (Screen::Pricing, _) => [hint("l", "sign in"), hint("Esc", "back")].concat(),
        (Screen::Login, _) => [
            hint("Tab", "field"),
            hint("Enter", "sign in"),
            hint("Esc", "continue as guest"),
        ]
        .concat(),
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_capture_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [camera_area, shots_area] =
        Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)]).areas(area);

    let mode = app.scanner.mode();
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Mode: ", Style::default().fg(Color::DarkGray)),
            Span::styled(mode.display_name(), Style::default().fg(Color::Cyan).bold()),
            Span::styled(
                format!("  (up to {} photo{})", mode.max_shots(), if mode.is_single_shot() { "" } else { "s" }),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        Line::default(),
    ];

    match &app.camera_error {
        Some(error) => {
            lines.push(Line::from(Span::styled(error.clone(), Style::default().fg(Color::Red))));
            lines.push(Line::from(Span::styled(
                "Press r to retry or i to import a photo.",
                Style::default().fg(Color::DarkGray),
            )));
        }
        None => {
            let feed = if app.capture.has_stream() { "Camera ready" } else { "Camera off" };
            lines.push(Line::from(feed.to_string()));
            lines.push(Line::from(Span::styled(
                format!("Watching {}", app.capture_dir.display()),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }

    if app.capture.shutter_active() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            " ◉ SNAP ",
            Style::default().bg(Color::White).fg(Color::Black).bold(),
        )));
    }

    if let FlowState::Analyzing { mode, shot_count } = app.scanner.state() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!("Analyzing {} photo(s) for {}", shot_count, mode.display_name()),
            Style::default().fg(Color::Cyan),
        )));
    }

    let camera = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Camera "));
    frame.render_widget(camera, camera_area);

    let [list_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(shots_area);

    let items: Vec<ListItem> = app
        .scanner
        .pending_shots()
        .iter()
        .enumerate()
        .map(|(i, shot)| ListItem::new(format!(" Photo {} ({} KB)", i + 1, shot.len() * 3 / 4 / 1024)))
        .collect();
    let title = format!(" Photos {}/{} ", app.scanner.pending_shots().len(), mode.max_shots());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut app.shot_state);

    let editing = app.input_mode == InputMode::Editing && app.screen == Screen::Capture;
    let border = if editing { Color::Yellow } else { Color::DarkGray };
    let input = Paragraph::new(app.path_input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(" Import file "),
    );
    frame.render_widget(input, input_area);
    if editing {
        let cursor_x = (app.path_input.chars().count() as u16).min(input_area.width.saturating_sub(3));
        frame.set_cursor_position((input_area.x + 1 + cursor_x, input_area.y + 1));
    }
}

fn point_lines(title: &str, color: Color, points: &[HealthPoint]) -> Vec<Line<'static>> {
    if points.is_empty() {
        return vec![];
    }
    let mut lines = vec![Line::from(Span::styled(title.to_string(), Style::default().fg(color).bold()))];
    lines.extend(points.iter().map(|p| Line::from(format!("  • {}", p.text()))));
    lines.push(Line::default());
    lines
}

fn analysis_lines(analysis: &HealthAnalysis) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(vec![
            Span::styled(analysis.product_name.clone(), Style::default().bold()),
            Span::raw("  "),
            Span::styled(
                format!("{}/100 · {}", analysis.score, analysis.verdict()),
                Style::default().fg(score_color(analysis.score)).bold(),
            ),
        ]),
        Line::from(analysis.explanation.clone()),
        Line::default(),
    ];
    lines.extend(point_lines("The Good", Color::Green, &analysis.pros));
    lines.extend(point_lines("The Bad", Color::Red, &analysis.cons));

    if !analysis.additives.is_empty() {
        lines.push(Line::from(Span::styled("Additives", Style::default().fg(Color::Magenta).bold())));
        lines.push(Line::from(format!("  {}", analysis.additives.join(", "))));
        lines.push(Line::default());
    }
    if let Some(alternatives) = analysis.alternatives.as_ref().filter(|a| !a.is_empty()) {
        lines.push(Line::from(Span::styled("Try instead", Style::default().fg(Color::Cyan).bold())));
        lines.extend(alternatives.iter().map(|a| Line::from(format!("  • {}", a))));
    }
    lines
}

fn render_results_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let Some(analysis) = app.scanner.last_analysis() else {
        frame.render_widget(Paragraph::new("No result yet."), area);
        return;
    };

    let [gauge_area, body_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);

    let (headline_score, title, lines) = match analysis {
        Analysis::Single(single) => (single.score, " Health score ", analysis_lines(single)),
        Analysis::Comparison(comparison) => {
            let mut lines = vec![
                Line::from(vec![
                    Span::styled("Winner: ", Style::default().fg(Color::DarkGray)),
                    Span::styled(comparison.winner.clone(), Style::default().fg(Color::Green).bold()),
                ]),
                Line::from(comparison.comparison_summary.clone()),
                Line::default(),
            ];
            for product in &comparison.products {
                lines.extend(analysis_lines(product));
                lines.push(Line::from("─".repeat(body_area.width.saturating_sub(2) as usize)));
            }
            let score = analysis.headline().map_or(0, |h| h.score);
            (score, " Winner's score ", lines)
        }
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(score_color(headline_score)))
        .percent(headline_score.min(100) as u16)
        .label(format!("{}/100", headline_score));
    frame.render_widget(gauge, gauge_area);

    let details = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .scroll((app.results_scroll, 0))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(details, body_area);
}

fn render_history_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(area);

    let items: Vec<ListItem> = app
        .scanner
        .user()
        .history
        .iter()
        .map(|scan| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    scan.timestamp.format("%Y-%m-%d %H:%M ").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(scan.analysis.product_name.clone()),
                Span::styled(
                    format!(" {}", scan.analysis.score),
                    Style::default().fg(score_color(scan.analysis.score)),
                ),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(" History "))
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, list_area, &mut app.history_state);

    let detail = match app.selected_history() {
        Some(scan) => {
            let mut lines = analysis_lines(&scan.analysis);
            lines.push(Line::from(Span::styled(
                format!("{} photo(s)", scan.original_images.len()),
                Style::default().fg(Color::DarkGray),
            )));
            Text::from(lines)
        }
        None => Text::from("No scans yet."),
    };
    let detail = Paragraph::new(detail)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(detail, detail_area);
}

fn render_pricing_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let mut lines = Vec::new();
    if *app.scanner.state() == FlowState::Upsell {
        lines.push(Line::from(Span::styled(
            "You've used all your scans. Upgrade to keep scanning.",
            Style::default().fg(Color::Yellow).bold(),
        )));
        lines.push(Line::default());
    }

    let current = app.scanner.user().tier;
    for tier in Tier::all() {
        let config = tier.config();
        let scans = if tier.is_unlimited() {
            "unlimited scans".to_string()
        } else {
            format!("{} scans", config.scans)
        };
        let marker = if tier == current { "● " } else { "  " };
        lines.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Green)),
            Span::styled(format!("{:<22}", config.label), Style::default().bold()),
            Span::raw(format!("${:>3}/mo  {}", config.price, scans)),
        ]));
        if let Some(link) = app.config.payment_link(tier) {
            lines.push(Line::from(Span::styled(
                format!("    {}", link),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::UNDERLINED),
            )));
        }
    }

    let pricing = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Plans "));
    frame.render_widget(pricing, area);
}

fn render_login(app: &App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = 8;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Sign in to BetterBite ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let field_style = |field: LoginField| {
        if app.login_field == field {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::White)
        }
    };

    let email = Paragraph::new(Line::from(vec![
        Span::styled("Email:    ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.email_input.clone(), field_style(LoginField::Email)),
    ]));
    frame.render_widget(email, Rect::new(inner.x, inner.y + 1, inner.width, 1));

    let password = Paragraph::new(Line::from(vec![
        Span::styled("Password: ", Style::default().fg(Color::DarkGray)),
        Span::styled("*".repeat(app.password_input.chars().count()), field_style(LoginField::Password)),
    ]));
    frame.render_widget(password, Rect::new(inner.x, inner.y + 3, inner.width, 1));

    let help = Paragraph::new("Esc skips sign-in; guest scans are not saved to your account.")
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, Rect::new(inner.x, inner.y + 5, inner.width, 1));

    // Show cursor at the end of the active field
    let (row, len) = match app.login_field {
        LoginField::Email => (1, app.email_input.chars().count()),
        LoginField::Password => (3, app.password_input.chars().count()),
    };
    let cursor_x = (10 + len as u16).min(inner.width.saturating_sub(1));
    frame.set_cursor_position((inner.x + cursor_x, inner.y + row));
}
