#![forbid(unsafe_code)]

//! Typed page state for the task board.
//!
//! Everything a poll tick, a stop request or the preview can touch lives
//! here, behind one [`SharedBoard`] lock. Mutating methods report whether
//! anything changed and bump [`Board::revision`] only when it did, so callers
//! can skip redraws for no-op polls.

pub mod counters;
pub mod preview;
pub mod row;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::task::model::{StatusReport, TaskStatus, TaskSummary};
pub use counters::Counters;
pub use preview::{PreviewContent, PreviewPane};
pub use row::{Badge, BadgeIcon, StopControl, TaskRow};

pub type SharedBoard = Arc<Mutex<Board>>;

/// Locks the board, recovering the guard if a previous holder panicked.
pub fn lock(board: &SharedBoard) -> MutexGuard<'_, Board> {
    board.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Board {
    rows: Vec<TaskRow>,
    counters: Counters,
    preview: PreviewPane,
    alert: Option<String>,
    revision: u64,
}

impl Board {
    #[must_use]
    pub fn new(preview_lines: usize) -> Self {
        Self {
            rows: Vec::new(),
            counters: Counters::default(),
            preview: PreviewPane::new(preview_lines),
            alert: None,
            revision: 0,
        }
    }

    #[must_use]
    pub fn from_tasks(tasks: &[TaskSummary], preview_lines: usize) -> Self {
        let mut board = Self::new(preview_lines);
        board.merge(tasks);
        board
    }

    #[must_use]
    pub fn shared(self) -> SharedBoard {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub fn rows(&self) -> &[TaskRow] {
        &self.rows
    }

    #[must_use]
    pub fn row(&self, task_id: &str) -> Option<&TaskRow> {
        self.rows.iter().find(|r| r.id == task_id)
    }

    #[must_use]
    pub fn contains(&self, task_id: &str) -> bool {
        self.row(task_id).is_some()
    }

    #[must_use]
    pub fn counters(&self) -> Counters {
        self.counters
    }

    #[must_use]
    pub fn preview(&self) -> &PreviewPane {
        &self.preview
    }

    #[must_use]
    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Ids of rows that still need a poll loop.
    #[must_use]
    pub fn pollable_ids(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| !r.status().is_terminal())
            .map(|r| r.id.clone())
            .collect()
    }

    fn row_mut(&mut self, task_id: &str) -> Option<&mut TaskRow> {
        self.rows.iter_mut().find(|r| r.id == task_id)
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn recount(&mut self) {
        self.counters = Counters::tally(self.rows.iter().map(TaskRow::status));
    }

    /// Reconciles the board with a fresh task list, in list order.
    ///
    /// Existing rows keep their badge unless the listed status moves them
    /// forward; rows missing from the list are dropped.
    pub fn merge(&mut self, tasks: &[TaskSummary]) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut old = std::mem::take(&mut self.rows);
        let mut changed = false;

        for task in tasks {
            if self.rows.iter().any(|r| r.id == task.id) {
                continue;
            }
            if let Some(pos) = old.iter().position(|r| r.id == task.id) {
                let mut row = old.swap_remove(pos);
                changed |= row.refresh_meta(task);
                changed |= row.transition(task.status).is_some();
                self.rows.push(row);
            } else {
                outcome.added.push(task.id.clone());
                self.rows.push(TaskRow::from_summary(task));
            }
        }
        outcome.removed = old.into_iter().map(|r| r.id).collect();

        if let Some(bound) = self.preview.task_id()
            && outcome.removed.iter().any(|id| id == bound)
        {
            self.preview.close();
        }

        if changed || !outcome.added.is_empty() || !outcome.removed.is_empty() {
            self.recount();
            self.touch();
        }
        outcome
    }

    /// Moves a row to `status` if that is a forward transition.
    ///
    /// Returns `None` (and writes nothing) for unknown rows, repeats, and
    /// regressions.
    pub fn apply_status(&mut self, task_id: &str, status: TaskStatus) -> Option<StatusChange> {
        let row = self.row_mut(task_id)?;
        let current = row.status();
        if current == status {
            return None;
        }
        let Some(from) = row.transition(status) else {
            debug!(task_id, from = %current, to = %status, "ignoring backward status");
            return None;
        };
        self.recount();
        self.touch();
        Some(StatusChange { from, to: status })
    }

    pub fn mark_poll_error(&mut self, task_id: &str, msg: impl Into<String>) {
        if let Some(row) = self.row_mut(task_id) {
            row.set_poll_error(msg.into());
            self.touch();
        }
    }

    /// Drops a stale "status unavailable" marker after a successful poll.
    pub fn clear_poll_error(&mut self, task_id: &str) {
        if self.row_mut(task_id).is_some_and(TaskRow::clear_poll_error) {
            self.touch();
        }
    }

    /// Disables the stop control; false when the row cannot be stopped now.
    pub fn begin_stop(&mut self, task_id: &str) -> bool {
        let started = self.row_mut(task_id).is_some_and(TaskRow::begin_stop);
        if started {
            self.touch();
        }
        started
    }

    pub fn settle_stop(&mut self, task_id: &str) {
        if self.row_mut(task_id).is_some_and(TaskRow::settle_stop) {
            self.touch();
        }
    }

    pub fn open_preview(&mut self, task_id: &str) -> bool {
        if !self.contains(task_id) {
            return false;
        }
        self.preview.open(task_id);
        self.touch();
        true
    }

    pub fn close_preview(&mut self) {
        if self.preview.is_open() {
            self.preview.close();
            self.touch();
        }
    }

    /// Applies a status response to the preview, if it is showing `task_id`.
    pub fn update_preview(&mut self, task_id: &str, report: &StatusReport) -> bool {
        if !self.preview.is_bound_to(task_id) || !self.preview.apply_report(report) {
            return false;
        }
        self.touch();
        true
    }

    pub fn show_in_preview(&mut self, task_id: &str, content: PreviewContent) -> bool {
        if !self.preview.is_bound_to(task_id) || !self.preview.show(content) {
            return false;
        }
        self.touch();
        true
    }

    pub fn set_alert(&mut self, msg: impl Into<String>) {
        self.alert = Some(msg.into());
        self.touch();
    }

    pub fn dismiss_alert(&mut self) -> Option<String> {
        let alert = self.alert.take();
        if alert.is_some() {
            self.touch();
        }
        alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, status: TaskStatus) -> TaskSummary {
        TaskSummary::new(id, status)
    }

    #[test]
    fn counters_follow_rows_after_a_batch_of_updates() {
        let mut b = Board::from_tasks(
            &[
                task("1", TaskStatus::Running),
                task("2", TaskStatus::Running),
                task("3", TaskStatus::Starting),
                task("4", TaskStatus::Pending),
            ],
            50,
        );
        assert_eq!(b.counters().running, 3);

        b.apply_status("1", TaskStatus::Completed);
        b.apply_status("2", TaskStatus::Error);
        b.apply_status("4", TaskStatus::Failed);

        let expected = Counters::tally(b.rows().iter().map(TaskRow::status));
        assert_eq!(b.counters(), expected);
        assert_eq!(
            b.counters(),
            Counters {
                running: 1,
                completed: 1,
                failed: 2,
            }
        );
    }

    #[test]
    fn repeated_status_leaves_revision_alone() {
        let mut b = Board::from_tasks(&[task("1", TaskStatus::Running)], 50);
        let rev = b.revision();
        assert!(b.apply_status("1", TaskStatus::Running).is_none());
        assert!(b.apply_status("missing", TaskStatus::Completed).is_none());
        assert_eq!(b.revision(), rev);
    }

    #[test]
    fn merge_reports_added_and_removed_and_closes_orphaned_preview() {
        let mut b = Board::from_tasks(
            &[task("1", TaskStatus::Running), task("2", TaskStatus::Running)],
            50,
        );
        assert!(b.open_preview("2"));

        let out = b.merge(&[task("3", TaskStatus::Pending), task("1", TaskStatus::Completed)]);
        assert_eq!(out.added, vec!["3".to_owned()]);
        assert_eq!(out.removed, vec!["2".to_owned()]);
        assert!(!b.preview().is_open());
        assert_eq!(
            b.rows().iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["3", "1"]
        );
        assert_eq!(b.row("1").map(TaskRow::status), Some(TaskStatus::Completed));
        assert_eq!(b.pollable_ids(), vec!["3".to_owned()]);
    }

    #[test]
    fn merge_with_same_list_is_a_no_op() {
        let tasks = [task("1", TaskStatus::Running), task("2", TaskStatus::Failed)];
        let mut b = Board::from_tasks(&tasks, 50);
        let rev = b.revision();
        assert_eq!(b.merge(&tasks), MergeOutcome::default());
        assert_eq!(b.revision(), rev);
    }

    #[test]
    fn preview_ignores_reports_for_other_tasks() {
        let mut b = Board::from_tasks(
            &[task("1", TaskStatus::Running), task("2", TaskStatus::Running)],
            50,
        );
        b.open_preview("1");
        let r = StatusReport::new(TaskStatus::Running).with_output(["hello"]);
        assert!(!b.update_preview("2", &r));
        assert!(b.update_preview("1", &r));
        let writes = b.preview().writes();
        assert!(!b.update_preview("1", &r));
        assert_eq!(b.preview().writes(), writes);
        assert!(!b.open_preview("nope"));
    }

    #[test]
    fn status_change_clears_stale_poll_error() {
        let mut b = Board::from_tasks(
            &[task("1", TaskStatus::Running), task("2", TaskStatus::Running)],
            50,
        );
        b.mark_poll_error("1", "down");
        b.mark_poll_error("2", "down");

        b.merge(&[task("1", TaskStatus::Completed), task("2", TaskStatus::Running)]);
        assert_eq!(b.row("1").and_then(TaskRow::poll_error), None);
        assert_eq!(b.row("2").and_then(TaskRow::poll_error), Some("down"));

        b.apply_status("2", TaskStatus::Stopped);
        assert_eq!(b.row("2").and_then(TaskRow::poll_error), None);
    }
}
