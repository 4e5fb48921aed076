#![forbid(unsafe_code)]

use serde::Serialize;

use crate::task::model::TaskStatus;

/// Aggregate tallies shown above the task table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl Counters {
    /// Always a full recount; never adjusted incrementally.
    pub fn tally(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        let mut c = Self::default();
        for status in statuses {
            match status {
                TaskStatus::Starting | TaskStatus::Running => c.running += 1,
                TaskStatus::Completed => c.completed += 1,
                TaskStatus::Failed | TaskStatus::Error => c.failed += 1,
                TaskStatus::Pending | TaskStatus::Stopped => {}
            }
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_match_row_statuses() {
        let c = Counters::tally([
            TaskStatus::Running,
            TaskStatus::Starting,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Error,
            TaskStatus::Error,
            TaskStatus::Stopped,
            TaskStatus::Pending,
        ]);
        assert_eq!(
            c,
            Counters {
                running: 2,
                completed: 1,
                failed: 3,
            }
        );
    }
}
