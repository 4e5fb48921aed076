#![forbid(unsafe_code)]

use crate::task::model::{TaskStatus, TaskSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeIcon {
    Spinner,
    Check,
    Cross,
    Stop,
    Clock,
}

impl BadgeIcon {
    #[must_use]
    pub fn for_status(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Starting | TaskStatus::Running => Self::Spinner,
            TaskStatus::Completed => Self::Check,
            TaskStatus::Failed | TaskStatus::Error => Self::Cross,
            TaskStatus::Stopped => Self::Stop,
            TaskStatus::Pending => Self::Clock,
        }
    }

    #[must_use]
    pub fn glyph(self, unicode: bool) -> &'static str {
        match (self, unicode) {
            (Self::Spinner, true) => "◐",
            (Self::Check, true) => "✓",
            (Self::Cross, true) => "✗",
            (Self::Stop, true) => "■",
            (Self::Clock, true) => "◷",
            (Self::Spinner, false) => "*",
            (Self::Check, false) => "+",
            (Self::Cross, false) => "x",
            (Self::Stop, false) => "#",
            (Self::Clock, false) => ".",
        }
    }
}

/// Class, text and icon always change together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub class: String,
    pub text: &'static str,
    pub icon: BadgeIcon,
}

impl Badge {
    #[must_use]
    pub fn for_status(status: TaskStatus) -> Self {
        Self {
            class: format!("status-{}", status.as_str()),
            text: status.label(),
            icon: BadgeIcon::for_status(status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopControl {
    Absent,
    Ready,
    /// A stop request is in flight; the control is disabled.
    Stopping,
}

impl StopControl {
    #[must_use]
    pub fn for_status(status: TaskStatus) -> Self {
        if status.is_active() {
            Self::Ready
        } else {
            Self::Absent
        }
    }

    #[must_use]
    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::Absent => None,
            Self::Ready => Some("Stop"),
            Self::Stopping => Some("Stopping..."),
        }
    }

    #[must_use]
    pub fn is_enabled(self) -> bool {
        self == Self::Ready
    }
}

#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub created_at: Option<String>,
    status: TaskStatus,
    badge: Badge,
    stop: StopControl,
    poll_error: Option<String>,
    badge_writes: u32,
}

impl TaskRow {
    #[must_use]
    pub fn from_summary(task: &TaskSummary) -> Self {
        Self {
            id: task.id.clone(),
            name: task.display_name().to_owned(),
            kind: task.kind.clone(),
            created_at: task.created_at.clone(),
            status: task.status,
            badge: Badge::for_status(task.status),
            stop: StopControl::for_status(task.status),
            poll_error: None,
            badge_writes: 0,
        }
    }

    /// Last status applied to this row (the row's `data-status`).
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    #[must_use]
    pub fn badge(&self) -> &Badge {
        &self.badge
    }

    #[must_use]
    pub fn stop_control(&self) -> StopControl {
        self.stop
    }

    #[must_use]
    pub fn poll_error(&self) -> Option<&str> {
        self.poll_error.as_deref()
    }

    /// Times the badge was rewritten after the row was first rendered.
    #[must_use]
    pub fn badge_writes(&self) -> u32 {
        self.badge_writes
    }

    /// Returns the previous status when the row actually changed.
    pub(crate) fn transition(&mut self, next: TaskStatus) -> Option<TaskStatus> {
        if !self.status.can_transition_to(next) {
            return None;
        }
        let prev = self.status;
        self.status = next;
        self.badge = Badge::for_status(next);
        self.badge_writes += 1;
        self.poll_error = None;
        self.stop = match (self.stop, next.is_active()) {
            (StopControl::Stopping, true) => StopControl::Stopping,
            (_, true) => StopControl::Ready,
            (_, false) => StopControl::Absent,
        };
        Some(prev)
    }

    pub(crate) fn begin_stop(&mut self) -> bool {
        if self.stop != StopControl::Ready {
            return false;
        }
        self.stop = StopControl::Stopping;
        true
    }

    /// Puts the control back the way the current status wants it.
    pub(crate) fn settle_stop(&mut self) -> bool {
        let want = StopControl::for_status(self.status);
        if self.stop == want {
            return false;
        }
        self.stop = want;
        true
    }

    pub(crate) fn set_poll_error(&mut self, msg: String) {
        self.poll_error = Some(msg);
    }

    pub(crate) fn clear_poll_error(&mut self) -> bool {
        self.poll_error.take().is_some()
    }

    pub(crate) fn refresh_meta(&mut self, task: &TaskSummary) -> bool {
        let name = task.display_name();
        if self.name == name && self.kind == task.kind && self.created_at == task.created_at {
            return false;
        }
        name.clone_into(&mut self.name);
        self.kind.clone_from(&task.kind);
        self.created_at.clone_from(&task.created_at);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: TaskStatus) -> TaskRow {
        TaskRow::from_summary(&TaskSummary::new("7", status))
    }

    #[test]
    fn initial_render_does_not_count_as_a_write() {
        let r = row(TaskStatus::Running);
        assert_eq!(r.badge_writes(), 0);
        assert_eq!(r.badge().class, "status-running");
        assert_eq!(r.stop_control(), StopControl::Ready);
    }

    #[test]
    fn transition_replaces_badge_and_drops_stop_control() {
        let mut r = row(TaskStatus::Running);
        assert_eq!(r.transition(TaskStatus::Completed), Some(TaskStatus::Running));
        assert_eq!(
            r.badge(),
            &Badge {
                class: "status-completed".to_owned(),
                text: "Completed",
                icon: BadgeIcon::Check,
            }
        );
        assert_eq!(r.stop_control(), StopControl::Absent);
        assert_eq!(r.badge_writes(), 1);
    }

    #[test]
    fn regressions_and_repeats_are_ignored() {
        let mut r = row(TaskStatus::Running);
        assert_eq!(r.transition(TaskStatus::Running), None);
        assert_eq!(r.transition(TaskStatus::Starting), None);
        assert_eq!(r.badge_writes(), 0);
    }

    #[test]
    fn in_flight_stop_survives_starting_to_running() {
        let mut r = row(TaskStatus::Starting);
        assert!(r.begin_stop());
        assert!(!r.begin_stop());
        r.transition(TaskStatus::Running);
        assert_eq!(r.stop_control(), StopControl::Stopping);
        assert!(r.settle_stop());
        assert_eq!(r.stop_control(), StopControl::Ready);
    }
}
