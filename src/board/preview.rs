#![forbid(unsafe_code)]

use crate::task::model::{StatusReport, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewContent {
    /// Nothing selected yet.
    Hint,
    Loading,
    Output(Vec<String>),
    Placeholder(TaskStatus),
    Error,
}

impl PreviewContent {
    /// Text shown for everything except `Output`.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        Some(match self {
            Self::Hint => "Select a task to view its preview.".to_owned(),
            Self::Loading => "Loading preview...".to_owned(),
            Self::Error => "Error loading preview.".to_owned(),
            Self::Output(_) => return None,
            Self::Placeholder(status) => match status {
                TaskStatus::Pending => "No recent output available for this task.".to_owned(),
                TaskStatus::Starting | TaskStatus::Running => "Task is running...".to_owned(),
                TaskStatus::Completed => "Task completed successfully.".to_owned(),
                TaskStatus::Failed | TaskStatus::Error => {
                    format!("Task ended with status: {}.", status.label())
                }
                TaskStatus::Stopped => "Task was stopped by the user.".to_owned(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewPane {
    task_id: Option<String>,
    content: PreviewContent,
    max_lines: usize,
    writes: u32,
}

impl PreviewPane {
    #[must_use]
    pub fn new(max_lines: usize) -> Self {
        Self {
            task_id: None,
            content: PreviewContent::Hint,
            max_lines: max_lines.max(1),
            writes: 0,
        }
    }

    #[must_use]
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.task_id.is_some()
    }

    #[must_use]
    pub fn is_bound_to(&self, task_id: &str) -> bool {
        self.task_id.as_deref() == Some(task_id)
    }

    #[must_use]
    pub fn content(&self) -> &PreviewContent {
        &self.content
    }

    #[must_use]
    pub fn writes(&self) -> u32 {
        self.writes
    }

    pub(crate) fn open(&mut self, task_id: &str) {
        self.task_id = Some(task_id.to_owned());
        self.set(PreviewContent::Loading);
    }

    pub(crate) fn close(&mut self) {
        self.task_id = None;
        self.set(PreviewContent::Hint);
    }

    /// Output lines win over placeholders; the window keeps the newest lines.
    pub(crate) fn apply_report(&mut self, report: &StatusReport) -> bool {
        let next = if report.recent_output.is_empty() {
            PreviewContent::Placeholder(report.status)
        } else {
            let skip = report.recent_output.len().saturating_sub(self.max_lines);
            PreviewContent::Output(report.recent_output[skip..].to_vec())
        };
        self.set(next)
    }

    pub(crate) fn show(&mut self, content: PreviewContent) -> bool {
        self.set(content)
    }

    fn set(&mut self, next: PreviewContent) -> bool {
        if self.content == next {
            return false;
        }
        self.content = next;
        self.writes += 1;
        true
    }
}

/// Lines of `next` that were not already visible at the end of `prev`.
///
/// Both are sliding windows over the same output, so the longest suffix of
/// `prev` that is a prefix of `next` is the overlap.
#[must_use]
pub fn fresh_tail<'a>(prev: &[String], next: &'a [String]) -> &'a [String] {
    let max = prev.len().min(next.len());
    for k in (1..=max).rev() {
        if prev[prev.len() - k..] == next[..k] {
            return &next[k..];
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn keeps_only_the_newest_lines() {
        let mut p = PreviewPane::new(2);
        p.open("1");
        let r = StatusReport::new(TaskStatus::Running).with_output(["a", "b", "c"]);
        assert!(p.apply_report(&r));
        assert_eq!(p.content(), &PreviewContent::Output(lines(&["b", "c"])));
        assert!(!p.apply_report(&r), "identical output must not rewrite");
    }

    #[test]
    fn placeholder_messages_follow_status() {
        let msg = |s| PreviewContent::Placeholder(s).message().unwrap();
        assert_eq!(msg(TaskStatus::Running), "Task is running...");
        assert_eq!(msg(TaskStatus::Error), "Task ended with status: Error.");
        assert_eq!(msg(TaskStatus::Stopped), "Task was stopped by the user.");
    }

    #[test]
    fn fresh_tail_finds_window_overlap() {
        let prev = lines(&["a", "b", "c"]);
        assert_eq!(fresh_tail(&prev, &lines(&["b", "c", "d", "e"])), lines(&["d", "e"]));
        assert!(fresh_tail(&prev, &prev).is_empty());
        assert_eq!(fresh_tail(&prev, &lines(&["x"])), lines(&["x"]));
        assert_eq!(fresh_tail(&[], &lines(&["a"])), lines(&["a"]));
    }
}
