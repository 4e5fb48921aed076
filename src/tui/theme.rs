#![forbid(unsafe_code)]

use ratatui::style::{Color, Modifier, Style};

use crate::config::Theme;
use crate::task::model::TaskStatus;

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub text: Color,
    pub muted: Color,
    pub border: Color,
    pub highlight_fg: Color,
    pub highlight_bg: Color,
    pub alert: Color,
    running: Color,
    completed: Color,
    failed: Color,
    stopped: Color,
    pending: Color,
}

impl Palette {
    #[must_use]
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Self {
                text: Color::Black,
                muted: Color::DarkGray,
                border: Color::Gray,
                highlight_fg: Color::White,
                highlight_bg: Color::Blue,
                alert: Color::Red,
                running: Color::Blue,
                completed: Color::Green,
                failed: Color::Red,
                stopped: Color::Magenta,
                pending: Color::DarkGray,
            },
            Theme::Dark => Self {
                text: Color::White,
                muted: Color::Gray,
                border: Color::DarkGray,
                highlight_fg: Color::Black,
                highlight_bg: Color::Cyan,
                alert: Color::LightRed,
                running: Color::LightCyan,
                completed: Color::LightGreen,
                failed: Color::LightRed,
                stopped: Color::LightMagenta,
                pending: Color::Gray,
            },
        }
    }

    #[must_use]
    pub fn status(&self, status: TaskStatus) -> Style {
        let fg = match status {
            TaskStatus::Starting | TaskStatus::Running => self.running,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed | TaskStatus::Error => self.failed,
            TaskStatus::Stopped => self.stopped,
            TaskStatus::Pending => self.pending,
        };
        Style::default().fg(fg).add_modifier(Modifier::BOLD)
    }

    #[must_use]
    pub fn highlight(&self) -> Style {
        Style::default()
            .fg(self.highlight_fg)
            .bg(self.highlight_bg)
            .add_modifier(Modifier::BOLD)
    }

    #[must_use]
    pub fn muted(&self) -> Style {
        Style::default().fg(self.muted)
    }
}
