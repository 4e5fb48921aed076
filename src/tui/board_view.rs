#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::HttpApi;
use crate::api::types::{Analysis, FollowUpRequest};
use crate::board::{self, Board, PreviewContent, SharedBoard, TaskRow};
use crate::config::{self, Theme};
use crate::error::{ApiError, ScanwatchError};
use crate::output::format_age;
use crate::poller::Poller;
use crate::task::model::TaskStatus;
use crate::tui::analysis_view::{self, AnalysisView};
use crate::tui::output_viewer::{self, OutputView};
use crate::tui::theme::Palette;
use crate::tui::{self, TerminalGuard};

#[derive(Clone)]
pub struct BoardViewOptions {
    pub poller: Poller,
    pub api: Arc<HttpApi>,
    pub icons: bool,
    pub theme: Theme,
    /// Follow-up action id for the analysis view; empty disables it.
    pub follow_up_action: String,
    /// Where the theme toggle is persisted.
    pub config_file: PathBuf,
}

pub async fn run(opts: BoardViewOptions) -> anyhow::Result<()> {
    let mut guard = TerminalGuard::new(tui::init_terminal()?);
    let poller = &opts.poller;
    let mut app = AppState::new(&opts, poller.board());
    let started = poller.start_all();
    info!(started, "board opened");
    let (fetch_tx, mut fetch_rx) = mpsc::unbounded_channel::<Fetched>();

    loop {
        while let Ok(fetched) = fetch_rx.try_recv() {
            if let Some(alert) = app.finish_fetch(fetched) {
                board::lock(poller.board()).set_alert(alert);
            }
        }
        app.polling = poller.active_count();
        app.sync(poller.board());
        guard.terminal()?.draw(|f| draw(f, &mut app))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };

        match handle_key(key, &mut app) {
            Action::None => {}
            Action::Quit => break,
            Action::TogglePreview(id) => {
                if let Err(e) = poller.toggle_preview(&id) {
                    app.notice = Some(e.to_string());
                }
            }
            Action::Stop(id) => {
                let poller = poller.clone();
                tokio::spawn(async move {
                    poller.stop_with_alert(&id).await;
                });
            }
            Action::Refresh => {
                let poller = poller.clone();
                tokio::spawn(async move {
                    if let Err(e) = poller.refresh_rows().await {
                        warn!(error = %e, "task list refresh failed");
                        board::lock(poller.board()).set_alert(format!("Refresh failed: {e}"));
                    }
                });
                app.notice = Some("Refreshing task list...".to_owned());
            }
            Action::OpenOutput(id) => {
                app.notice = Some(format!("Loading output for task {id}..."));
                app.pending = Some(Pending::Output(id.clone()));
                let api = Arc::clone(&opts.api);
                let tx = fetch_tx.clone();
                tokio::spawn(async move {
                    let result = api.task_output(&id).await;
                    if let Err(e) = &result {
                        warn!(task_id = %id, error = %e, "output fetch failed");
                    }
                    let _ = tx.send(Fetched::Output { task_id: id, result });
                });
            }
            Action::OpenAnalysis(id) => {
                app.notice = Some(format!("Loading analysis for task {id}..."));
                app.pending = Some(Pending::Analysis(id.clone()));
                let api = Arc::clone(&opts.api);
                let tx = fetch_tx.clone();
                tokio::spawn(async move {
                    let result = api.task_analysis(&id).await;
                    if let Err(e) = &result {
                        warn!(task_id = %id, error = %e, "analysis fetch failed");
                    }
                    let _ = tx.send(Fetched::Analysis { task_id: id, result });
                });
            }
            Action::FollowUp(req) => {
                app.notice = Some("Starting follow-up...".to_owned());
                let poller = poller.clone();
                tokio::spawn(async move {
                    let alert = match poller.start_follow_up(&req).await {
                        Ok(started) => format!(
                            "Follow-up task started: {} (task {})",
                            started.message, started.task_id
                        ),
                        Err(ScanwatchError::Api(ApiError::Rejected(m))) => format!("Error: {m}"),
                        Err(e) => format!("Could not start follow-up task: {e}"),
                    };
                    board::lock(poller.board()).set_alert(alert);
                });
            }
            Action::ToggleTheme => {
                app.set_theme(app.theme.toggled());
                if let Err(e) = config::set_value_string_at_path(
                    &opts.config_file,
                    "ui.theme",
                    app.theme.as_str(),
                ) {
                    warn!(error = %e, "failed to persist theme");
                    app.notice = Some(format!("Theme not saved: {e}"));
                }
            }
            Action::DismissAlert => {
                board::lock(poller.board()).dismiss_alert();
            }
        }
    }

    poller.shutdown();
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    None,
    Quit,
    TogglePreview(String),
    Stop(String),
    Refresh,
    OpenOutput(String),
    OpenAnalysis(String),
    FollowUp(FollowUpRequest),
    ToggleTheme,
    DismissAlert,
}

/// A finished background request, handed back to the draw loop.
#[derive(Debug)]
enum Fetched {
    Output {
        task_id: String,
        result: Result<String, ApiError>,
    },
    Analysis {
        task_id: String,
        result: Result<Analysis, ApiError>,
    },
}

/// The view request still awaited; replies to older requests are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Output(String),
    Analysis(String),
}

#[derive(Debug, Clone)]
enum Mode {
    Normal,
    ConfirmStop(String),
    Output(OutputView),
    Analysis(AnalysisView),
}

#[derive(Debug)]
struct AppState {
    snapshot: Board,
    seen_revision: u64,
    table_state: TableState,
    mode: Mode,
    theme: Theme,
    palette: Palette,
    icons: bool,
    server: String,
    notice: Option<String>,
    /// Live poll loops, not just non-terminal rows.
    polling: usize,
    pending: Option<Pending>,
    follow_up_action: String,
}

impl AppState {
    fn new(opts: &BoardViewOptions, shared: &SharedBoard) -> Self {
        let snapshot = board::lock(shared).clone();
        let mut table_state = TableState::default();
        table_state.select(Some(0));
        Self {
            seen_revision: snapshot.revision(),
            snapshot,
            table_state,
            mode: Mode::Normal,
            theme: opts.theme,
            palette: Palette::for_theme(opts.theme),
            icons: opts.icons,
            server: opts.api.base().to_string(),
            notice: None,
            polling: 0,
            pending: None,
            follow_up_action: opts.follow_up_action.trim().to_owned(),
        }
    }

    /// Re-snapshots the board only when it changed since the last frame.
    fn sync(&mut self, shared: &SharedBoard) {
        {
            let b = board::lock(shared);
            if b.revision() != self.seen_revision {
                self.seen_revision = b.revision();
                self.snapshot = b.clone();
            }
        }
        self.clamp_selection();
    }

    /// Opens the view for the latest request. Returns the alert to raise
    /// when that request failed.
    fn finish_fetch(&mut self, fetched: Fetched) -> Option<String> {
        let expected = match &fetched {
            Fetched::Output { task_id, .. } => Pending::Output(task_id.clone()),
            Fetched::Analysis { task_id, .. } => Pending::Analysis(task_id.clone()),
        };
        if self.pending.as_ref() != Some(&expected) {
            return None;
        }
        self.pending = None;
        self.notice = None;

        let next = match fetched {
            Fetched::Output { task_id, result } => match result {
                Ok(text) => Mode::Output(OutputView::new(format!("Task {task_id} output"), &text)),
                Err(e) => return Some(format!("Could not load output: {e}")),
            },
            Fetched::Analysis { task_id, result } => match result {
                Ok(a) => Mode::Analysis(AnalysisView::new(task_id, &a)),
                Err(ApiError::Rejected(m)) => return Some(format!("Error loading analysis: {m}")),
                Err(e) => return Some(format!("Could not fetch analysis data: {e}")),
            },
        };
        if matches!(self.mode, Mode::Normal) {
            self.mode = next;
        }
        None
    }

    fn follow_up(&mut self, task_id: &str, info: crate::api::types::ServiceInfo) -> Action {
        if self.follow_up_action.is_empty() {
            self.notice = Some("Set ui.follow_up_action to run follow-ups.".to_owned());
            return Action::None;
        }
        let target = info.host_ip.clone().unwrap_or_default();
        Action::FollowUp(FollowUpRequest {
            action_id: self.follow_up_action.clone(),
            service_info: info,
            original_nmap_target: target,
            original_nmap_task_id: task_id.to_owned(),
        })
    }

    fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        self.palette = Palette::for_theme(theme);
    }

    fn selected_index(&self) -> usize {
        self.table_state.selected().unwrap_or(0)
    }

    fn selected(&self) -> Option<&TaskRow> {
        self.snapshot.rows().get(self.selected_index())
    }

    fn clamp_selection(&mut self) {
        let len = self.snapshot.rows().len();
        let idx = self.selected_index().min(len.saturating_sub(1));
        self.table_state.select(Some(idx));
    }

    fn move_selection(&mut self, delta: i64) {
        let len = self.snapshot.rows().len();
        if len == 0 {
            return;
        }
        let cur = i64::try_from(self.selected_index()).unwrap_or(i64::MAX);
        let max = i64::try_from(len - 1).unwrap_or(i64::MAX);
        let next = usize::try_from((cur + delta).clamp(0, max)).unwrap_or(0);
        self.table_state.select(Some(next));
    }
}

fn handle_key(key: KeyEvent, app: &mut AppState) -> Action {
    if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
        return Action::Quit;
    }

    if matches!(app.mode, Mode::Normal) {
        return handle_normal_key(key, app);
    }
    if matches!(app.mode, Mode::Analysis(_))
        && key.code == KeyCode::Esc
        && app.snapshot.alert().is_some()
    {
        app.notice = None;
        return Action::DismissAlert;
    }
    match &mut app.mode {
        Mode::Analysis(view) => match view.handle_key(key) {
            analysis_view::KeyAction::Continue => Action::None,
            analysis_view::KeyAction::Close => {
                app.mode = Mode::Normal;
                app.notice = None;
                Action::None
            }
            analysis_view::KeyAction::Cancelled => Action::Quit,
            analysis_view::KeyAction::FollowUp(info) => {
                let task_id = view.task_id().to_owned();
                app.follow_up(&task_id, info)
            }
        },
        Mode::Output(view) => {
            match view.handle_key(key) {
                output_viewer::KeyAction::Continue => {}
                output_viewer::KeyAction::Close => app.mode = Mode::Normal,
                output_viewer::KeyAction::Cancelled => return Action::Quit,
            }
            Action::None
        }
        Mode::ConfirmStop(id) => match key.code {
            KeyCode::Char('y' | 'Y') => {
                let id = std::mem::take(id);
                app.mode = Mode::Normal;
                Action::Stop(id)
            }
            KeyCode::Char('n' | 'N' | 'q') | KeyCode::Esc => {
                app.mode = Mode::Normal;
                Action::None
            }
            _ => Action::None,
        },
        Mode::Normal => Action::None,
    }
}

fn handle_normal_key(key: KeyEvent, app: &mut AppState) -> Action {
    app.notice = None;
    let selected = app.selected().map(|r| r.id.clone());

    match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Esc => {
            if app.snapshot.alert().is_some() {
                Action::DismissAlert
            } else {
                Action::None
            }
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.move_selection(-1);
            Action::None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.move_selection(1);
            Action::None
        }
        KeyCode::PageUp => {
            app.move_selection(-10);
            Action::None
        }
        KeyCode::PageDown => {
            app.move_selection(10);
            Action::None
        }
        KeyCode::Enter | KeyCode::Char('p') => selected.map_or(Action::None, Action::TogglePreview),
        KeyCode::Char('o') => selected.map_or(Action::None, Action::OpenOutput),
        KeyCode::Char('a') => selected.map_or(Action::None, Action::OpenAnalysis),
        KeyCode::Char('s') => {
            let Some(id) = selected else {
                return Action::None;
            };
            let stoppable = app.selected().is_some_and(|r| r.stop_control().is_enabled());
            if stoppable {
                app.mode = Mode::ConfirmStop(id);
            } else {
                app.notice = Some(format!("Task {id} cannot be stopped."));
            }
            Action::None
        }
        KeyCode::Char('r') => Action::Refresh,
        KeyCode::Char('t') => Action::ToggleTheme,
        _ => Action::None,
    }
}

fn draw(f: &mut Frame<'_>, app: &mut AppState) {
    let area = f.area();
    match &mut app.mode {
        Mode::Output(view) => {
            view.draw(f, area, &app.palette);
            return;
        }
        Mode::Analysis(view) => {
            view.draw(f, area, &app.palette, app.notice.as_deref());
            if let Some(alert) = app.snapshot.alert() {
                draw_alert(f, alert, &app.palette);
            }
            return;
        }
        Mode::Normal | Mode::ConfirmStop(_) => {}
    }

    let outer = Block::default()
        .title(format!("scanwatch  {}", app.server))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.palette.border));
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(inner);

    draw_counters(f, chunks[0], app);
    if app.snapshot.preview().is_open() {
        let main = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        draw_table(f, main[0], app);
        draw_preview(f, main[1], app);
    } else {
        draw_table(f, chunks[1], app);
    }
    draw_footer(f, chunks[2], app);

    if let Mode::ConfirmStop(id) = &app.mode {
        draw_confirm(f, id, &app.palette);
    } else if let Some(alert) = app.snapshot.alert() {
        draw_alert(f, alert, &app.palette);
    }
}

fn draw_counters(f: &mut Frame<'_>, area: Rect, app: &AppState) {
    let c = app.snapshot.counters();
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let line = Line::from(vec![
        Span::styled("Running: ", bold),
        Span::styled(c.running.to_string(), app.palette.status(TaskStatus::Running)),
        Span::raw("   "),
        Span::styled("Completed: ", bold),
        Span::styled(
            c.completed.to_string(),
            app.palette.status(TaskStatus::Completed),
        ),
        Span::raw("   "),
        Span::styled("Failed: ", bold),
        Span::styled(c.failed.to_string(), app.palette.status(TaskStatus::Failed)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn status_cell(row: &TaskRow, icons: bool, palette: &Palette) -> Cell<'static> {
    let badge = row.badge();
    let mut spans = vec![Span::styled(
        format!("{} {}", badge.icon.glyph(icons), badge.text),
        palette.status(row.status()),
    )];
    if row.poll_error().is_some() {
        spans.push(Span::styled(" (status unavailable)", palette.muted()));
    }
    Cell::from(Line::from(spans))
}

fn draw_table(f: &mut Frame<'_>, area: Rect, app: &mut AppState) {
    let header = Row::new(vec!["ID", "NAME", "TOOL", "STATUS", "", "CREATED"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let now = OffsetDateTime::now_utc();
    let rows: Vec<Row<'static>> = app
        .snapshot
        .rows()
        .iter()
        .map(|r| {
            let stop = r.stop_control().label().unwrap_or_default();
            Row::new(vec![
                Cell::from(r.id.clone()),
                Cell::from(r.name.clone()),
                Cell::from(r.kind.clone()),
                status_cell(r, app.icons, &app.palette),
                Cell::from(stop).style(app.palette.muted()),
                Cell::from(format_age(r.created_at.as_deref(), now)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(8),
        Constraint::Percentage(30),
        Constraint::Length(12),
        Constraint::Length(24),
        Constraint::Length(12),
        Constraint::Length(14),
    ];

    let title = if rows.is_empty() { "Tasks (none)" } else { "Tasks" };
    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(app.palette.border)),
        )
        .style(Style::default().fg(app.palette.text))
        .row_highlight_style(app.palette.highlight())
        .highlight_symbol(">");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn draw_preview(f: &mut Frame<'_>, area: Rect, app: &AppState) {
    let pane = app.snapshot.preview();
    let title = pane
        .task_id()
        .map_or_else(|| "Preview".to_owned(), |id| format!("Preview: task {id}"));
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.palette.border));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let para = match pane.content() {
        PreviewContent::Output(lines) => {
            // Follow the tail.
            let skip = lines.len().saturating_sub(inner.height as usize);
            let text = Text::from(
                lines[skip..]
                    .iter()
                    .map(|l| Line::from(l.as_str()))
                    .collect::<Vec<_>>(),
            );
            Paragraph::new(text).style(Style::default().fg(app.palette.text))
        }
        other => {
            let msg = other.message().unwrap_or_default();
            let style = if matches!(other, PreviewContent::Error) {
                Style::default().fg(app.palette.alert)
            } else {
                app.palette.muted().add_modifier(Modifier::ITALIC)
            };
            Paragraph::new(msg).style(style).wrap(Wrap { trim: true })
        }
    };
    f.render_widget(para, inner);
}

fn draw_footer(f: &mut Frame<'_>, area: Rect, app: &AppState) {
    let keys =
        "q quit • j/k select • p preview • s stop • o output • a analysis • r refresh • t theme";
    let mut lines = vec![Line::from(vec![
        Span::styled("Polling: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("{} tasks", app.polling)),
        Span::raw("   "),
        Span::styled("Theme: ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(app.theme.as_str()),
    ])];
    if let Some(notice) = &app.notice {
        lines.push(Line::styled(notice.clone(), Style::default().fg(app.palette.alert)));
    } else {
        lines.push(Line::styled(keys, app.palette.muted()));
    }
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), area);
}

fn draw_confirm(f: &mut Frame<'_>, task_id: &str, palette: &Palette) {
    let area = tui::centered_rect(40, 20, f.area());
    f.render_widget(Clear, area);
    let p = Paragraph::new(vec![
        Line::from(format!("Stop task {task_id}? (y/n)")),
        Line::from(""),
        Line::styled("y confirm • n/Esc cancel", palette.muted()),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Confirm")
            .border_style(Style::default().fg(palette.alert)),
    )
    .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}

fn draw_alert(f: &mut Frame<'_>, alert: &str, palette: &Palette) {
    let area = tui::centered_rect(50, 20, f.area());
    f.render_widget(Clear, area);
    let p = Paragraph::new(vec![
        Line::styled(alert.to_owned(), Style::default().fg(palette.alert)),
        Line::from(""),
        Line::styled("Press Esc to dismiss.", palette.muted()),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Alert")
            .border_style(Style::default().fg(palette.alert)),
    )
    .wrap(Wrap { trim: false });
    f.render_widget(p, area);
}
