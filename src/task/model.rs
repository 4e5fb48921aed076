#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TaskStatus {
    Pending,
    Starting,
    Running,
    Completed,
    Failed,
    Error,
    Stopped,
}

impl TaskStatus {
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Starting,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Error,
        Self::Stopped,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }

    /// Capitalised form used on badges ("Running", "Stopped").
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Error => "Error",
            Self::Stopped => "Stopped",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Error | Self::Stopped
        )
    }

    /// Work is underway on the server; these rows carry a stop control.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Starting => 1,
            Self::Running => 2,
            Self::Completed | Self::Failed | Self::Error | Self::Stopped => 3,
        }
    }

    /// Transitions only move forward; terminal states have no way out.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let want = s.trim();
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(want))
            .ok_or_else(|| format!("unknown task status '{want}'"))
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// One row of `GET /api/tasks`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSummary {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_output: Vec<String>,
}

impl TaskSummary {
    #[must_use]
    pub fn new(id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind: String::new(),
            status,
            created_at: None,
            updated_at: None,
            recent_output: Vec::new(),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Body of `GET /api/task/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    pub status: TaskStatus,
    #[serde(default)]
    pub recent_output: Vec<String>,
}

impl StatusReport {
    #[must_use]
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            recent_output: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_output<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recent_output = lines.into_iter().map(Into::into).collect();
        self
    }
}

/// Server ids are integers today but are treated as opaque strings.
pub(crate) fn id_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Num(i64),
    }

    Ok(match RawId::deserialize(d)? {
        RawId::Str(s) => s,
        RawId::Num(n) => n.to_string(),
    })
}

pub(crate) fn opt_id_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Num(i64),
    }

    Ok(Option::<RawId>::deserialize(d)?.map(|raw| match raw {
        RawId::Str(s) => s,
        RawId::Num(n) => n.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_case_insensitively() {
        assert_eq!("Running".parse::<TaskStatus>(), Ok(TaskStatus::Running));
        assert_eq!(" STOPPED ".parse::<TaskStatus>(), Ok(TaskStatus::Stopped));
        assert!("paused".parse::<TaskStatus>().is_err());
        assert_eq!(TaskStatus::try_from("Error".to_owned()), Ok(TaskStatus::Error));
        assert!(TaskStatus::try_from(String::new()).is_err());
    }

    #[test]
    fn terminal_statuses_accept_no_transitions() {
        for from in TaskStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in TaskStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Stopped));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Starting));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Running));
    }

    #[test]
    fn decodes_task_list_rows_with_numeric_ids() {
        let raw = r#"{"id": 42, "name": "nmap scan", "type": "nmap", "status": "Running",
                      "created_at": "2024-05-01T10:00:00", "updated_at": null}"#;
        let t: TaskSummary = serde_json::from_str(raw).unwrap();
        assert_eq!(t.id, "42");
        assert_eq!(t.kind, "nmap");
        assert_eq!(t.status, TaskStatus::Running);
        assert!(t.updated_at.is_none());
        assert!(t.recent_output.is_empty());
    }

    #[test]
    fn status_report_without_output_defaults_to_empty() {
        let r: StatusReport = serde_json::from_str(r#"{"status":"completed"}"#).unwrap();
        assert_eq!(r, StatusReport::new(TaskStatus::Completed));
        assert!(serde_json::from_str::<StatusReport>(r#"{"status":"bogus"}"#).is_err());
    }
}
