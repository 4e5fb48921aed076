#![forbid(unsafe_code)]

pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{ApiError, ScanwatchError};
use crate::task::model::{StatusReport, TaskSummary};
use types::{
    Analysis, AnalysisReply, ApiReply, FollowUpReply, FollowUpRequest, FollowUpStarted, Project,
    ProjectDraft, Target, TaskOutput,
};

/// The slice of the server the poller depends on.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn task_status(&self, task_id: &str) -> Result<StatusReport, ApiError>;

    /// Returns the server's message on success; `ApiError::Rejected` when the
    /// server refuses.
    async fn stop_task(&self, task_id: &str) -> Result<String, ApiError>;

    async fn list_tasks(&self) -> Result<Vec<TaskSummary>, ApiError>;

    /// Queues a follow-up scan off an Nmap result; the new task id comes back.
    async fn run_follow_up(&self, req: &FollowUpRequest) -> Result<FollowUpStarted, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base: Url,
}

impl HttpApi {
    pub fn new(cfg: &ServerConfig) -> Result<Self, ScanwatchError> {
        let base = api_base(&cfg.base_url, &cfg.api_prefix)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(ApiError::from)?;
        Ok(Self { client, base })
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments);
        debug!(%url, "GET");
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("{url}: {e}, body: {}", truncate(&body, 200))))
    }

    /// Calls whose refusals arrive as `{status: "error"}`, often with a
    /// 4xx/5xx code: the body wins over the status line.
    async fn send_for<B, R>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<R, ApiError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(segments);
        debug!(%url, %method, "request");
        let mut req = self.client.request(method, url.clone());
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;
        match serde_json::from_str::<R>(&text) {
            Ok(reply) => Ok(reply),
            Err(_) if !status.is_success() => Err(ApiError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            Err(e) => Err(ApiError::Decode(format!(
                "{url}: {e}, body: {}",
                truncate(&text, 200)
            ))),
        }
    }

    async fn send_for_reply<B: Serialize + Sync>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<String, ApiError> {
        self.send_for::<B, ApiReply>(method, segments, body)
            .await?
            .into_result()
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        key: &str,
    ) -> Result<Vec<T>, ApiError> {
        let value: serde_json::Value = self.get_json(segments).await?;
        take_list(value, key)
    }

    pub async fn task_output(&self, task_id: &str) -> Result<String, ApiError> {
        let out: TaskOutput = self.get_json(&["task", task_id, "output"]).await?;
        match out.status {
            types::Outcome::Success => Ok(out.output),
            types::Outcome::Error => Err(ApiError::Rejected(
                out.message.unwrap_or_else(|| "Could not read task output.".to_owned()),
            )),
        }
    }

    /// Parsed Nmap results; the server refuses tasks of other tools.
    pub async fn task_analysis(&self, task_id: &str) -> Result<Analysis, ApiError> {
        self.send_for::<(), AnalysisReply>(Method::GET, &["task", task_id, "analyze_nmap"], None)
            .await?
            .into_result()
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        self.get_list(&["projects"], "projects").await
    }

    pub async fn list_targets(&self) -> Result<Vec<Target>, ApiError> {
        self.get_list(&["targets"], "targets").await
    }

    pub async fn create_project(&self, draft: &ProjectDraft) -> Result<String, ApiError> {
        self.send_for_reply(Method::POST, &["projects"], Some(draft))
            .await
    }

    pub async fn edit_project(
        &self,
        project_id: &str,
        draft: &ProjectDraft,
    ) -> Result<String, ApiError> {
        self.send_for_reply(Method::POST, &["projects", project_id, "edit"], Some(draft))
            .await
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<String, ApiError> {
        self.send_for_reply::<()>(Method::DELETE, &["projects", project_id], None)
            .await
    }

    pub async fn set_active_project(&self, project_id: &str) -> Result<String, ApiError> {
        let body = serde_json::json!({ "project_id": project_id });
        self.send_for_reply(Method::POST, &["projects", "set_active"], Some(&body))
            .await
    }
}

#[async_trait]
impl TaskApi for HttpApi {
    async fn task_status(&self, task_id: &str) -> Result<StatusReport, ApiError> {
        self.get_json(&["task", task_id, "status"]).await
    }

    async fn stop_task(&self, task_id: &str) -> Result<String, ApiError> {
        self.send_for_reply::<()>(Method::POST, &["task", task_id, "stop"], None)
            .await
    }

    async fn list_tasks(&self) -> Result<Vec<TaskSummary>, ApiError> {
        self.get_list(&["tasks"], "tasks").await
    }

    async fn run_follow_up(&self, req: &FollowUpRequest) -> Result<FollowUpStarted, ApiError> {
        self.send_for::<_, FollowUpReply>(Method::POST, &["task", "run_follow_up"], Some(req))
            .await?
            .into_result()
    }
}

fn api_base(base_url: &str, api_prefix: &str) -> Result<Url, ScanwatchError> {
    let mut url = Url::parse(base_url.trim())
        .map_err(|e| ScanwatchError::Config(format!("invalid server.base_url '{base_url}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(ScanwatchError::Config(format!(
            "server.base_url '{base_url}' cannot carry a path"
        )));
    }
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty()
            .extend(api_prefix.split('/').filter(|s| !s.is_empty()));
    }
    Ok(url)
}

/// Unwraps `{"status": "success", "<key>": [...]}`.
fn take_list<T: DeserializeOwned>(value: serde_json::Value, key: &str) -> Result<Vec<T>, ApiError> {
    let serde_json::Value::Object(mut map) = value else {
        return Err(ApiError::Decode(format!("expected an object carrying '{key}'")));
    };
    let status = map
        .get("status")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("success");
    if status != "success" {
        let message = map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        return Err(ApiError::Rejected(message));
    }
    let items = map.remove(key).unwrap_or(serde_json::Value::Array(Vec::new()));
    serde_json::from_value(items).map_err(|e| ApiError::Decode(format!("{key}: {e}")))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_url_and_prefix() {
        let url = api_base("http://127.0.0.1:5000", "/api").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5000/api");

        let url = api_base("https://scan.example.org/dash/", "api/v1/").unwrap();
        assert_eq!(url.as_str(), "https://scan.example.org/dash/api/v1");

        assert!(api_base("not a url", "/api").is_err());
    }

    #[test]
    fn endpoint_escapes_opaque_ids() {
        let api = HttpApi::new(&ServerConfig::default()).unwrap();
        let url = api.endpoint(&["task", "a/b c", "status"]);
        assert_eq!(url.path(), "/api/task/a%2Fb%20c/status");
    }

    #[test]
    fn take_list_checks_envelope_status() {
        let ok = serde_json::json!({"status": "success", "targets": [{"id": 1, "value": "10.0.0.1", "project_id": 3}]});
        let targets: Vec<Target> = take_list(ok, "targets").unwrap();
        assert_eq!(targets[0].id, "1");
        assert_eq!(targets[0].project_id.as_deref(), Some("3"));

        let err = serde_json::json!({"status": "error", "message": "no project"});
        match take_list::<Target>(err, "targets") {
            Err(ApiError::Rejected(m)) => assert_eq!(m, "no project"),
            other => panic!("unexpected {other:?}"),
        }

        let missing = serde_json::json!({"status": "success"});
        assert!(take_list::<Target>(missing, "targets").unwrap().is_empty());
    }
}
