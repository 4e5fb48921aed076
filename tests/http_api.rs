use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use scanwatch::api::types::{FollowUpRequest, ProjectDraft, ServiceInfo};
use scanwatch::api::{HttpApi, TaskApi as _};
use scanwatch::board::{self, Board, StopControl};
use scanwatch::config::ServerConfig;
use scanwatch::error::ApiError;
use scanwatch::poller::Poller;
use scanwatch::task::model::{TaskStatus, TaskSummary};

async fn serve(app: Router) -> HttpApi {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    HttpApi::new(&ServerConfig {
        base_url: format!("http://{addr}"),
        timeout_ms: 2_000,
        ..ServerConfig::default()
    })
    .unwrap()
}

async fn echo_status(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"status": "Running", "recent_output": [format!("id={id}")]}))
}

#[tokio::test]
async fn status_decodes_mixed_case_and_escapes_ids() {
    let api = serve(Router::new().route("/api/task/{id}/status", get(echo_status))).await;

    let report = api.task_status("a/b c").await.unwrap();
    assert_eq!(report.status, TaskStatus::Running);
    assert_eq!(report.recent_output, vec!["id=a/b c".to_owned()]);
}

#[tokio::test]
async fn stop_prefers_error_body_over_http_status() {
    let app = Router::new()
        .route(
            "/api/task/1/stop",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"status": "error", "message": "busy"})),
                )
            }),
        )
        .route(
            "/api/task/2/stop",
            post(|| async { Json(json!({"status": "success", "message": "Task stopped"})) }),
        )
        .route(
            "/api/task/3/stop",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>") }),
        );
    let api = serve(app).await;

    match api.stop_task("1").await {
        Err(ApiError::Rejected(m)) => assert_eq!(m, "busy"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(api.stop_task("2").await.unwrap(), "Task stopped");
    match api.stop_task("3").await {
        Err(ApiError::HttpStatus { status, .. }) => assert_eq!(status, 500),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn list_endpoints_unwrap_their_envelopes() {
    let app = Router::new()
        .route(
            "/api/tasks",
            get(|| async {
                Json(json!({"status": "success", "tasks": [
                    {"id": 7, "name": "nmap scan", "type": "nmap", "status": "running",
                     "created_at": "2024-05-01T10:00:00"},
                    {"id": "8", "name": "", "type": "nikto", "status": "Completed"}
                ]}))
            }),
        )
        .route(
            "/api/projects",
            get(|| async {
                Json(json!({"status": "success", "projects": [
                    {"id": 1, "name": "acme", "description": "", "is_active": true}
                ]}))
            }),
        )
        .route(
            "/api/targets",
            get(|| async { Json(json!({"status": "error", "message": "no active project"})) }),
        );
    let api = serve(app).await;

    let tasks = api.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, "7");
    assert_eq!(tasks[0].kind, "nmap");
    assert_eq!(tasks[1].display_name(), "8");
    assert_eq!(tasks[1].status, TaskStatus::Completed);

    let projects = api.list_projects().await.unwrap();
    assert!(projects[0].is_active);

    match api.list_targets().await {
        Err(ApiError::Rejected(m)) => assert_eq!(m, "no active project"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn project_mutations_send_form_shaped_bodies() {
    let app = Router::new()
        .route(
            "/api/projects",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "status": "success",
                    "message": format!("created {} with {}", body["name"].as_str().unwrap_or(""), body["targets"].as_str().unwrap_or("")),
                }))
            }),
        )
        .route(
            "/api/projects/set_active",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"status": "success", "message": format!("active {}", body["project_id"].as_str().unwrap_or(""))}))
            }),
        )
        .route(
            "/api/projects/{id}",
            delete(|Path(id): Path<String>| async move {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({"status": "error", "message": format!("Project {id} not found")})),
                )
            }),
        );
    let api = serve(app).await;

    let draft = ProjectDraft::new("web").with_targets(["10.0.0.1", "example.org"]);
    assert_eq!(
        api.create_project(&draft).await.unwrap(),
        "created web with 10.0.0.1\nexample.org"
    );
    assert_eq!(api.set_active_project("4").await.unwrap(), "active 4");
    match api.delete_project("9").await {
        Err(ApiError::Rejected(m)) => assert_eq!(m, "Project 9 not found"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn task_output_returns_full_text() {
    let app = Router::new().route(
        "/api/task/{id}/output",
        get(|Path(id): Path<String>| async move {
            Json(json!({"status": "success", "output": format!("line 1\nline 2 of {id}\n")}))
        }),
    );
    let api = serve(app).await;
    assert_eq!(api.task_output("5").await.unwrap(), "line 1\nline 2 of 5\n");
}

#[tokio::test]
async fn analysis_decodes_hosts_and_reports_rejections() {
    let app = Router::new()
        .route(
            "/api/task/4/analyze_nmap",
            get(|| async {
                Json(json!({
                    "status": "success",
                    "source": "text",
                    "data": {
                        "warning": "Parsed from plain text output.",
                        "hosts": [{
                            "host": "scanme", "ip": "10.0.0.5", "status": "up",
                            "ports": [{"port": 22, "protocol": "tcp", "service": "ssh",
                                       "product": "OpenSSH", "version": null, "cpe": null}],
                            "osmatch": [{"name": "Linux", "accuracy": 95, "cpe": []}]
                        }]
                    }
                }))
            }),
        )
        .route(
            "/api/task/5/analyze_nmap",
            get(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"status": "error", "message": "Analysis only for Nmap tasks"})),
                )
            }),
        );
    let api = serve(app).await;

    let analysis = api.task_analysis("4").await.unwrap();
    assert_eq!(analysis.source.as_deref(), Some("text"));
    assert_eq!(analysis.warning.as_deref(), Some("Parsed from plain text output."));
    let host = &analysis.hosts[0];
    assert_eq!(host.ports[0].port, "22");
    assert_eq!(host.osmatch[0].accuracy.as_deref(), Some("95"));
    assert_eq!(
        host.ports[0].service_info(&host.ip).version.as_deref(),
        Some("OpenSSH")
    );

    match api.task_analysis("5").await {
        Err(ApiError::Rejected(m)) => assert_eq!(m, "Analysis only for Nmap tasks"),
        other => panic!("unexpected {other:?}"),
    }
    match api.task_analysis("6").await {
        Err(ApiError::HttpStatus { status, .. }) => assert_eq!(status, 404),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn follow_up_posts_service_info_and_returns_new_task() {
    let app = Router::new().route(
        "/api/task/run_follow_up",
        post(|Json(body): Json<Value>| async move {
            if body["action_id"] != "searchsploit_service" {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"status": "error", "message": "Invalid follow-up action."})),
                );
            }
            let message = format!(
                "searchsploit for {}:{} from task {}",
                body["original_nmap_target"].as_str().unwrap_or(""),
                body["service_info"]["port"].as_str().unwrap_or(""),
                body["original_nmap_task_id"].as_str().unwrap_or(""),
            );
            (
                StatusCode::OK,
                Json(json!({"status": "success", "message": message, "task_id": 12})),
            )
        }),
    );
    let api = serve(app).await;

    let mut req = FollowUpRequest {
        action_id: "searchsploit_service".to_owned(),
        service_info: ServiceInfo {
            port: Some("22".to_owned()),
            host_ip: Some("10.0.0.5".to_owned()),
            ..ServiceInfo::default()
        },
        original_nmap_target: "10.0.0.5".to_owned(),
        original_nmap_task_id: "4".to_owned(),
    };
    let started = api.run_follow_up(&req).await.unwrap();
    assert_eq!(started.task_id, "12");
    assert_eq!(started.message, "searchsploit for 10.0.0.5:22 from task 4");

    req.action_id = "nope".to_owned();
    match api.run_follow_up(&req).await {
        Err(ApiError::Rejected(m)) => assert_eq!(m, "Invalid follow-up action."),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn poller_follows_a_task_to_completion_over_http() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/api/task/{id}/status",
            get(|State(hits): State<Arc<AtomicUsize>>| async move {
                let n = hits.fetch_add(1, Ordering::SeqCst);
                let status = if n < 2 { "running" } else { "completed" };
                Json(json!({"status": status}))
            }),
        )
        .with_state(Arc::clone(&hits));
    let api = Arc::new(serve(app).await);

    let board = Board::from_tasks(&[TaskSummary::new("1", TaskStatus::Running)], 20).shared();
    let poller = Poller::new(api, board, Duration::from_millis(20));
    assert!(poller.start_polling("1").unwrap());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while poller.is_polling("1") && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(!poller.is_polling("1"));
    let b = board::lock(poller.board());
    let row = b.row("1").unwrap();
    assert_eq!(row.status(), TaskStatus::Completed);
    assert_eq!(row.stop_control(), StopControl::Absent);
    assert_eq!(row.badge_writes(), 1);
    assert_eq!(b.counters().completed, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}
