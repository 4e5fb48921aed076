#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::task::model::{id_string, opt_id_string};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

/// The `{status, message}` shape every mutating endpoint answers with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiReply {
    pub status: Outcome,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiReply {
    pub fn into_result(self) -> Result<String, ApiError> {
        let message = self.message.unwrap_or_default();
        match self.status {
            Outcome::Success => Ok(message),
            Outcome::Error => Err(ApiError::Rejected(message)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskOutput {
    pub status: Outcome,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub value: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub project_id: Option<String>,
}

/// Create/edit body for projects. `targets` is newline separated, the way the
/// server's form handler splits it.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ProjectDraft {
    pub name: String,
    pub description: String,
    pub targets: String,
    pub playbook_ids: Vec<String>,
}

impl ProjectDraft {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.targets = targets
            .into_iter()
            .map(|t| t.as_ref().trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        self
    }
}

/// Body of `GET /task/{id}/analyze_nmap`. Errors come back in the same shape,
/// usually with a 4xx/5xx code.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisReply {
    pub status: Outcome,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<AnalysisData>,
    /// `xml` or `text`.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisData {
    #[serde(default)]
    pub hosts: Vec<NmapHost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Parsed Nmap results for one finished scan.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Analysis {
    pub source: Option<String>,
    pub warning: Option<String>,
    pub hosts: Vec<NmapHost>,
}

impl AnalysisReply {
    pub fn into_result(self) -> Result<Analysis, ApiError> {
        match (self.status, self.data) {
            (Outcome::Success, Some(data)) => Ok(Analysis {
                source: self.source,
                warning: self.warning.or(data.warning),
                hosts: data.hosts,
            }),
            (Outcome::Success, None) => Err(ApiError::Decode(
                "analysis reply carries no data".to_owned(),
            )),
            (Outcome::Error, _) => Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| "Unknown error".to_owned()),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NmapHost {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ports: Vec<NmapPort>,
    #[serde(default)]
    pub osmatch: Vec<OsMatch>,
    #[serde(default)]
    pub host_cpes: Vec<String>,
}

impl NmapHost {
    /// `host (ip)`, or just one of them when they coincide.
    #[must_use]
    pub fn label(&self) -> String {
        match (self.host.is_empty(), self.ip.is_empty()) {
            (true, _) => self.ip.clone(),
            (false, false) if self.host != self.ip => format!("{} ({})", self.host, self.ip),
            _ => self.host.clone(),
        }
    }
}

/// Open port as reported by the parser; every text field may be null.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NmapPort {
    #[serde(deserialize_with = "id_string")]
    pub port: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub extrainfo: Option<String>,
    #[serde(default)]
    pub cpe: Option<String>,
}

impl NmapPort {
    /// `product (vversion) (extrainfo)`, skipping empty parts.
    #[must_use]
    pub fn product_version(&self) -> String {
        let mut out = non_empty(self.product.as_deref()).unwrap_or_default().to_owned();
        for extra in [
            non_empty(self.version.as_deref()).map(|v| format!("(v{v})")),
            non_empty(self.extrainfo.as_deref()).map(|e| format!("({e})")),
        ]
        .into_iter()
        .flatten()
        {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&extra);
        }
        out
    }

    /// What a follow-up scan needs to know about this port. A missing
    /// version falls back to the product name.
    #[must_use]
    pub fn service_info(&self, host_ip: &str) -> ServiceInfo {
        ServiceInfo {
            port: Some(self.port.clone()),
            protocol: non_empty(Some(self.protocol.as_str())).map(str::to_owned),
            service: non_empty(self.service.as_deref()).map(str::to_owned),
            version: non_empty(self.version.as_deref())
                .or_else(|| non_empty(self.product.as_deref()))
                .map(str::to_owned),
            cpe: non_empty(self.cpe.as_deref()).map(str::to_owned),
            host_ip: non_empty(Some(host_ip)).map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OsMatch {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub accuracy: Option<String>,
    #[serde(default)]
    pub cpe: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ServiceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
}

/// Body of `POST /task/run_follow_up`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FollowUpRequest {
    pub action_id: String,
    pub service_info: ServiceInfo,
    pub original_nmap_target: String,
    pub original_nmap_task_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowUpReply {
    pub status: Outcome,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub task_id: Option<String>,
}

/// A follow-up scan the server queued.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FollowUpStarted {
    pub task_id: String,
    pub message: String,
}

impl FollowUpReply {
    pub fn into_result(self) -> Result<FollowUpStarted, ApiError> {
        match self.status {
            Outcome::Success => {
                let task_id = self.task_id.ok_or_else(|| {
                    ApiError::Decode("follow-up reply carries no task_id".to_owned())
                })?;
                Ok(FollowUpStarted {
                    task_id,
                    message: self.message.unwrap_or_default(),
                })
            }
            Outcome::Error => Err(ApiError::Rejected(
                self.message
                    .unwrap_or_else(|| "Could not start follow-up task.".to_owned()),
            )),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_reply_becomes_rejected_with_message() {
        let r: ApiReply = serde_json::from_str(r#"{"status":"error","message":"busy"}"#).unwrap();
        match r.into_result() {
            Err(ApiError::Rejected(m)) => assert_eq!(m, "busy"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn text_fallback_analysis_keeps_its_warning() {
        let raw = r#"{"status":"success","source":"text","data":{
            "hosts":[{"host":"scanme","ip":"10.0.0.5","status":"up","ports":[
                {"port":"22","protocol":"tcp","service":"ssh","version":"OpenSSH 8.9"},
                {"port":80,"protocol":"tcp","service":null,"product":"nginx","extrainfo":"Ubuntu"}
            ]}],
            "warning":"Could not find or parse XML file."}}"#;
        let a = serde_json::from_str::<AnalysisReply>(raw).unwrap().into_result().unwrap();
        assert_eq!(a.source.as_deref(), Some("text"));
        assert_eq!(a.warning.as_deref(), Some("Could not find or parse XML file."));
        let host = &a.hosts[0];
        assert_eq!(host.label(), "scanme (10.0.0.5)");
        assert_eq!(host.ports[1].port, "80");
        assert_eq!(host.ports[1].product_version(), "nginx (Ubuntu)");
        assert_eq!(host.ports[0].product_version(), "(vOpenSSH 8.9)");
    }

    #[test]
    fn service_info_falls_back_to_product_for_version() {
        let port = NmapPort {
            port: "80".to_owned(),
            protocol: "tcp".to_owned(),
            product: Some("nginx".to_owned()),
            service: Some(String::new()),
            ..NmapPort::default()
        };
        let info = port.service_info("10.0.0.5");
        assert_eq!(info.version.as_deref(), Some("nginx"));
        assert_eq!(info.service, None);
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("service").is_none());
        assert_eq!(json["host_ip"], "10.0.0.5");
    }

    #[test]
    fn follow_up_reply_needs_a_task_id_on_success() {
        let ok: FollowUpReply =
            serde_json::from_str(r#"{"status":"success","message":"Started","task_id":12}"#).unwrap();
        assert_eq!(
            ok.into_result().unwrap(),
            FollowUpStarted {
                task_id: "12".to_owned(),
                message: "Started".to_owned()
            }
        );
        let bare: FollowUpReply = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(matches!(bare.into_result(), Err(ApiError::Decode(_))));
        let err: FollowUpReply = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        match err.into_result() {
            Err(ApiError::Rejected(m)) => assert_eq!(m, "Could not start follow-up task."),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn draft_targets_are_trimmed_and_joined() {
        let d = ProjectDraft::new("acme").with_targets([" 10.0.0.1 ", "", "example.org"]);
        assert_eq!(d.targets, "10.0.0.1\nexample.org");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["playbook_ids"], serde_json::json!([]));
    }
}
