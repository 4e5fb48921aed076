#![forbid(unsafe_code)]

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::error::ScanwatchError;
use crate::tui::theme::Palette;
use crate::tui::{self, TerminalGuard};

/// Scrollable view over a task's full output.
#[derive(Debug, Clone)]
pub struct OutputView {
    title: String,
    lines: Vec<String>,
    scroll: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Continue,
    Close,
    Cancelled,
}

impl OutputView {
    #[must_use]
    pub fn new(title: impl Into<String>, content: &str) -> Self {
        Self {
            title: title.into(),
            lines: content.lines().map(str::to_owned).collect(),
            scroll: 0,
        }
    }

    #[must_use]
    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyAction {
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            return KeyAction::Cancelled;
        }

        let last = self.lines.len().saturating_sub(1);
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return KeyAction::Close,
            KeyCode::Char('j') | KeyCode::Down => self.scroll = (self.scroll + 1).min(last),
            KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
            KeyCode::PageDown => self.scroll = (self.scroll + 10).min(last),
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(10),
            KeyCode::Char('g') | KeyCode::Home => self.scroll = 0,
            KeyCode::Char('G') | KeyCode::End => self.scroll = last,
            _ => {}
        }
        KeyAction::Continue
    }

    pub fn draw(&mut self, f: &mut Frame<'_>, area: Rect, palette: &Palette) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(area);

        let block = Block::default()
            .title(self.title.as_str())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.border));
        let inner = block.inner(chunks[0]);
        f.render_widget(block, chunks[0]);

        let visible = inner.height as usize;
        self.scroll = self.scroll.min(self.lines.len().saturating_sub(visible));

        let text = if self.lines.is_empty() {
            Text::from(Line::styled("(no output)", palette.muted()))
        } else {
            Text::from(
                self.lines
                    .iter()
                    .map(|l| Line::from(l.as_str()))
                    .collect::<Vec<_>>(),
            )
        };
        let para = Paragraph::new(text)
            .scroll((u16::try_from(self.scroll).unwrap_or(u16::MAX), 0))
            .wrap(Wrap { trim: false })
            .style(Style::default().fg(palette.text));
        f.render_widget(para, inner);

        let help = Paragraph::new("q/Esc: close • j/k: scroll • PgUp/PgDn • g/G: top/bottom")
            .style(palette.muted().add_modifier(Modifier::ITALIC));
        f.render_widget(help, chunks[1]);
    }
}

/// Standalone viewer for `task output` on a terminal.
pub fn run(title: &str, content: &str, palette: &Palette) -> Result<(), ScanwatchError> {
    if !tui::is_tty() {
        return Err(ScanwatchError::Other("output viewer requires a TTY".to_owned()));
    }

    let mut view = OutputView::new(title, content);
    let mut guard = TerminalGuard::new(tui::init_terminal()?);

    loop {
        guard
            .terminal()?
            .draw(|f| {
                let area = f.area();
                view.draw(f, area, palette);
            })
            .map_err(|e| ScanwatchError::Other(format!("failed to draw output viewer: {e}")))?;

        if event::poll(Duration::from_millis(50))
            .map_err(|e| ScanwatchError::Other(format!("event poll failed: {e}")))?
            && let Event::Key(key) =
                event::read().map_err(|e| ScanwatchError::Other(format!("event read failed: {e}")))?
        {
            match view.handle_key(key) {
                KeyAction::Continue => {}
                KeyAction::Close => return Ok(()),
                KeyAction::Cancelled => return Err(ScanwatchError::Cancelled),
            }
        }
    }
}
