#![forbid(unsafe_code)]

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState, Wrap};

use crate::api::types::{Analysis, NmapPort, ServiceInfo};
use crate::output::analysis;
use crate::tui::theme::Palette;

#[derive(Debug, Clone)]
struct PortEntry {
    host: String,
    host_ip: String,
    port: NmapPort,
}

/// Nmap results of one task, one selectable row per open port.
#[derive(Debug, Clone)]
pub struct AnalysisView {
    task_id: String,
    header: String,
    /// Shown instead of the table when there are no ports to pick.
    fallback: String,
    entries: Vec<PortEntry>,
    state: TableState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Continue,
    Close,
    Cancelled,
    FollowUp(ServiceInfo),
}

impl AnalysisView {
    #[must_use]
    pub fn new(task_id: impl Into<String>, analysis: &Analysis) -> Self {
        let entries: Vec<PortEntry> = analysis
            .hosts
            .iter()
            .flat_map(|h| {
                h.ports.iter().map(|p| PortEntry {
                    host: h.label(),
                    host_ip: if h.ip.is_empty() { h.host.clone() } else { h.ip.clone() },
                    port: p.clone(),
                })
            })
            .collect();
        let mut state = TableState::default();
        if !entries.is_empty() {
            state.select(Some(0));
        }
        Self {
            task_id: task_id.into(),
            header: analysis::source_line(analysis),
            fallback: analysis::render(analysis),
            entries,
            state,
        }
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    #[must_use]
    pub fn selected(&self) -> Option<usize> {
        self.state.selected()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyAction {
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            return KeyAction::Cancelled;
        }
        let last = self.entries.len().saturating_sub(1);
        let cur = self.state.selected().unwrap_or(0);
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return KeyAction::Close,
            KeyCode::Char('j') | KeyCode::Down if !self.entries.is_empty() => {
                self.state.select(Some((cur + 1).min(last)));
            }
            KeyCode::Char('k') | KeyCode::Up if !self.entries.is_empty() => {
                self.state.select(Some(cur.saturating_sub(1)));
            }
            KeyCode::Char('f') | KeyCode::Enter => {
                if let Some(e) = self.state.selected().and_then(|i| self.entries.get(i)) {
                    return KeyAction::FollowUp(e.port.service_info(&e.host_ip));
                }
            }
            _ => {}
        }
        KeyAction::Continue
    }

    pub fn draw(&mut self, f: &mut Frame<'_>, area: Rect, palette: &Palette, notice: Option<&str>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(area);

        f.render_widget(
            Paragraph::new(self.header.as_str()).style(palette.muted()),
            chunks[0],
        );

        let block = Block::default()
            .title(format!("Task {} analysis", self.task_id))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.border));

        if self.entries.is_empty() {
            let para = Paragraph::new(self.fallback.as_str())
                .block(block)
                .style(Style::default().fg(palette.text))
                .wrap(Wrap { trim: false });
            f.render_widget(para, chunks[1]);
        } else {
            let rows: Vec<Row<'_>> = self
                .entries
                .iter()
                .map(|e| {
                    Row::new(vec![
                        e.host.clone(),
                        format!("{}/{}", e.port.port, e.port.protocol),
                        e.port.service.clone().unwrap_or_else(|| "N/A".to_owned()),
                        e.port.product_version(),
                        e.port.cpe.clone().unwrap_or_default(),
                    ])
                })
                .collect();
            let widths = [
                Constraint::Percentage(25),
                Constraint::Length(10),
                Constraint::Length(14),
                Constraint::Percentage(30),
                Constraint::Min(10),
            ];
            let table = Table::new(rows, widths)
                .header(
                    Row::new(vec!["HOST", "PORT", "SERVICE", "PRODUCT/VERSION", "CPE"])
                        .style(Style::default().add_modifier(Modifier::BOLD)),
                )
                .block(block)
                .style(Style::default().fg(palette.text))
                .row_highlight_style(palette.highlight())
                .highlight_symbol(">");
            f.render_stateful_widget(table, chunks[1], &mut self.state);
        }

        let footer = match notice {
            Some(n) => Line::styled(n.to_owned(), Style::default().fg(palette.alert)),
            None => Line::styled(
                "q/Esc: close • j/k: select port • f/Enter: run follow-up",
                palette.muted().add_modifier(Modifier::ITALIC),
            ),
        };
        f.render_widget(Paragraph::new(footer), chunks[2]);
    }
}
