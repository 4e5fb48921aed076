#![forbid(unsafe_code)]

pub mod analysis_view;
pub mod board_view;
pub mod output_viewer;
pub mod theme;

use std::io;
use std::io::IsTerminal as _;

use ratatui::layout::{Constraint, Direction, Layout, Rect};

use crate::error::ScanwatchError;

pub type Term = ratatui::Terminal<ratatui::backend::CrosstermBackend<io::Stdout>>;

#[must_use]
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

pub fn init_terminal() -> Result<Term, ScanwatchError> {
    use crossterm::terminal::enable_raw_mode;
    use ratatui::backend::CrosstermBackend;

    enable_raw_mode()
        .map_err(|e| ScanwatchError::Other(format!("failed to enable raw mode: {e}")))?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)
        .map_err(|e| ScanwatchError::Other(format!("failed to enter alt screen: {e}")))?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = ratatui::Terminal::new(backend)
        .map_err(|e| ScanwatchError::Other(format!("failed to create terminal: {e}")))?;
    Ok(terminal)
}

pub fn restore_terminal(mut terminal: Term) -> Result<(), ScanwatchError> {
    use crossterm::terminal::disable_raw_mode;

    disable_raw_mode()
        .map_err(|e| ScanwatchError::Other(format!("failed to disable raw mode: {e}")))?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )
    .map_err(|e| ScanwatchError::Other(format!("failed to leave alt screen: {e}")))?;
    terminal
        .show_cursor()
        .map_err(|e| ScanwatchError::Other(format!("failed to show cursor: {e}")))?;
    Ok(())
}

/// Restores the terminal on every exit path, panics included.
pub struct TerminalGuard {
    terminal: Option<Term>,
}

impl TerminalGuard {
    #[must_use]
    pub fn new(terminal: Term) -> Self {
        Self {
            terminal: Some(terminal),
        }
    }

    pub fn terminal(&mut self) -> Result<&mut Term, ScanwatchError> {
        self.terminal
            .as_mut()
            .ok_or_else(|| ScanwatchError::Other("terminal unavailable".to_owned()))
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(terminal) = self.terminal.take() {
            let _ = restore_terminal(terminal);
        }
    }
}

pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
