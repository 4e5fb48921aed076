#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::io::IsTerminal as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{CommandFactory as _, Parser, Subcommand};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::api::types::{FollowUpRequest, Project, ProjectDraft, ServiceInfo, Target};
use crate::api::{HttpApi, TaskApi as _};
use crate::board::preview::fresh_tail;
use crate::board::{self, Board, SharedBoard, TaskRow};
use crate::config::{self, Config, ConfigPaths};
use crate::error::ApiError;
use crate::logging::{self, LogTarget};
use crate::output::table::{Align, Table};
use crate::output::{analysis, format_age};
use crate::poller::{self, Poller};
use crate::task::model::{TaskStatus, TaskSummary};
use crate::tui;
use crate::tui::board_view::{self, BoardViewOptions};
use crate::tui::output_viewer;
use crate::tui::theme::Palette;

#[derive(Debug, Parser)]
#[command(
    name = "scanwatch",
    version,
    about = "Terminal client for the scanning dashboard"
)]
pub struct Cli {
    /// Dashboard URL; overrides server.base_url
    #[arg(long = "server", global = true, env = "SCANWATCH_SERVER")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Live task board (default)
    Board,
    /// List tasks
    Tasks(TasksArgs),
    /// Inspect or control a single task
    Task(TaskArgs),
    #[command(alias = "project")]
    Projects(ProjectsArgs),
    Targets(TargetsArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
    Version,
}

#[derive(Debug, Parser)]
pub struct TasksArgs {
    /// Output in JSON format
    #[arg(long = "json", conflicts_with = "csv")]
    pub json: bool,
    /// Output as CSV
    #[arg(long = "csv")]
    pub csv: bool,
    /// Only tasks with this status
    #[arg(short = 'f', long = "filter")]
    pub filter: Option<TaskStatus>,
    /// Regex matched against task name and tool
    #[arg(short = 'm', long = "match")]
    pub pattern: Option<String>,
}

#[derive(Debug, Parser)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub cmd: TaskCmd,
}

#[derive(Debug, Subcommand)]
pub enum TaskCmd {
    Status(TaskStatusArgs),
    Stop(TaskStopArgs),
    Output(TaskOutputArgs),
    /// Print status changes and new output until the task finishes
    Follow(TaskIdArg),
    /// Hosts, OS matches and open ports of a finished Nmap task
    Analyze(TaskAnalyzeArgs),
    /// Queue a follow-up scan for a service an Nmap task found
    FollowUp(TaskFollowUpArgs),
}

#[derive(Debug, Parser)]
pub struct TaskAnalyzeArgs {
    pub id: String,
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct TaskFollowUpArgs {
    /// The Nmap task the service was found by
    pub id: String,
    /// Follow-up action id configured on the server
    #[arg(short = 'a', long = "action")]
    pub action: String,
    #[arg(long = "host-ip")]
    pub host_ip: String,
    #[arg(short = 'p', long = "port")]
    pub port: Option<String>,
    #[arg(long = "protocol", default_value = "tcp")]
    pub protocol: String,
    #[arg(long = "service")]
    pub service: Option<String>,
    /// Service version, or the product name when nmap found no version
    #[arg(long = "service-version")]
    pub version: Option<String>,
    #[arg(long = "cpe")]
    pub cpe: Option<String>,
    /// Target of the original scan; defaults to --host-ip
    #[arg(short = 't', long = "target")]
    pub target: Option<String>,
}

impl TaskFollowUpArgs {
    fn into_request(self) -> FollowUpRequest {
        let target = self.target.unwrap_or_else(|| self.host_ip.clone());
        FollowUpRequest {
            action_id: self.action,
            service_info: ServiceInfo {
                port: self.port,
                protocol: Some(self.protocol),
                service: self.service,
                version: self.version,
                cpe: self.cpe,
                host_ip: Some(self.host_ip),
            },
            original_nmap_target: target,
            original_nmap_task_id: self.id,
        }
    }
}

#[derive(Debug, Parser)]
pub struct TaskIdArg {
    pub id: String,
}

#[derive(Debug, Parser)]
pub struct TaskStatusArgs {
    pub id: String,
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct TaskStopArgs {
    pub id: String,
    /// Skip the confirmation prompt
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

#[derive(Debug, Parser)]
pub struct TaskOutputArgs {
    pub id: String,
    /// Print instead of opening the viewer
    #[arg(long = "plain")]
    pub plain: bool,
}

#[derive(Debug, Parser)]
pub struct ProjectsArgs {
    #[command(subcommand)]
    pub cmd: Option<ProjectsCmd>,
}

#[derive(Debug, Subcommand)]
pub enum ProjectsCmd {
    List(ListJsonArgs),
    Create(ProjectDraftArgs),
    Edit(ProjectEditArgs),
    #[command(alias = "rm")]
    Delete(ProjectDeleteArgs),
    /// Make a project the active one
    Activate(ProjectIdArg),
}

#[derive(Debug, Parser, Default)]
pub struct ListJsonArgs {
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ProjectDraftArgs {
    pub name: String,
    #[arg(short = 'd', long = "description", default_value = "")]
    pub description: String,
    /// Target host, range or URL (repeatable)
    #[arg(short = 't', long = "target")]
    pub targets: Vec<String>,
    /// Playbook id to attach (repeatable)
    #[arg(short = 'p', long = "playbook")]
    pub playbooks: Vec<String>,
}

impl ProjectDraftArgs {
    fn into_draft(self) -> ProjectDraft {
        let mut draft = ProjectDraft::new(self.name).with_targets(self.targets);
        draft.description = self.description;
        draft.playbook_ids = self.playbooks;
        draft
    }
}

#[derive(Debug, Parser)]
pub struct ProjectEditArgs {
    pub id: String,
    #[command(flatten)]
    pub draft: ProjectDraftArgs,
}

#[derive(Debug, Parser)]
pub struct ProjectDeleteArgs {
    pub id: String,
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

#[derive(Debug, Parser)]
pub struct ProjectIdArg {
    pub id: String,
}

#[derive(Debug, Parser)]
pub struct TargetsArgs {
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Set(ConfigSetArgs),
    Get(ConfigGetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cmd = match cli.cmd {
        Some(Commands::Completion(args)) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "scanwatch", &mut std::io::stdout());
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Config(args)) => return cmd_config(args),
        Some(Commands::Version) => return Ok(cmd_version()),
        Some(cmd) => cmd,
        None => Commands::Board,
    };

    let (cfg, paths) = load_cfg(cli.server).await?;
    let interactive = tui::is_tty()
        && (matches!(cmd, Commands::Board)
            || matches!(&cmd, Commands::Task(TaskArgs { cmd: TaskCmd::Output(a) }) if !a.plain));
    let target = if interactive {
        LogTarget::File(cfg.log_file(&paths))
    } else {
        LogTarget::Stderr
    };
    logging::init(&cfg.log, &target)?;
    debug!(server = %cfg.server.base_url, "configuration loaded");

    let ctx = Ctx {
        api: HttpApi::new(&cfg.server)?,
        cfg,
        paths,
    };

    match cmd {
        Commands::Board => cmd_board(ctx).await,
        Commands::Tasks(args) => cmd_tasks(&ctx, args).await,
        Commands::Task(args) => cmd_task(&ctx, args).await,
        Commands::Projects(args) => cmd_projects(&ctx, args).await,
        Commands::Targets(args) => cmd_targets(&ctx, &args).await,
        Commands::Config(_) | Commands::Completion(_) | Commands::Version => {
            Ok(ExitCode::SUCCESS)
        }
    }
}

struct Ctx {
    cfg: Config,
    paths: ConfigPaths,
    api: HttpApi,
}

async fn load_cfg(server: Option<String>) -> anyhow::Result<(Config, ConfigPaths)> {
    let (mut cfg, paths) = tokio::task::spawn_blocking(config::load).await??;
    if let Some(url) = server.filter(|s| !s.trim().is_empty()) {
        cfg.server.base_url = url;
        cfg.validate()?;
    }
    Ok((cfg, paths))
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<ExitCode> {
    match args.cmd {
        ConfigCmd::List => {
            print!("{}", config::list_resolved_toml()?);
        }
        ConfigCmd::Set(set) => {
            config::set_value_string(&set.key, &set.value)?;
            println!("Set {} = {}", set.key, set.value);
        }
        ConfigCmd::Get(get) => match config::get_value_string(&get.key)? {
            Some(v) => println!("{v}"),
            None => anyhow::bail!(
                "configuration key '{}' not found - use 'scanwatch config list' to see available keys",
                get.key
            ),
        },
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_board(ctx: Ctx) -> anyhow::Result<ExitCode> {
    let Ctx { cfg, paths, api } = ctx;
    let api = Arc::new(api);
    let tasks = api
        .list_tasks()
        .await
        .with_context(|| format!("failed to load tasks from {}", api.base()))?;

    let board = Board::from_tasks(&tasks, cfg.poll.preview_lines).shared();
    let poller = Poller::new(
        api.clone(),
        board,
        Duration::from_millis(cfg.poll.interval_ms),
    );

    if tui::is_tty() {
        board_view::run(BoardViewOptions {
            poller,
            api,
            icons: cfg.ui.icons,
            theme: cfg.ui.theme,
            follow_up_action: cfg.ui.follow_up_action.clone(),
            config_file: paths.config_file,
        })
        .await?;
        return Ok(ExitCode::SUCCESS);
    }

    board_watch_nontty(&poller, cfg.ui.icons).await
}

async fn board_watch_nontty(poller: &Poller, icons: bool) -> anyhow::Result<ExitCode> {
    poller.start_all();
    let mut ticker = tokio::time::interval(poller.interval());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                poller.shutdown();
                return Ok(ExitCode::SUCCESS);
            }
            _ = ticker.tick() => {
                print!("\x1b[H\x1b[2J");
                print!("{}", render_board(poller.board(), icons));
                println!("\n[Press Ctrl+C to exit]");
            }
        }
    }
}

fn render_board(shared: &SharedBoard, icons: bool) -> String {
    let b = board::lock(shared);
    let c = b.counters();
    let updated = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_owned());

    let mut out = String::new();
    let _ = writeln!(out, "Tasks - Updated: {updated}");
    let _ = writeln!(
        out,
        "Running: {} | Completed: {} | Failed: {}\n",
        c.running, c.completed, c.failed
    );
    if let Some(alert) = b.alert() {
        let _ = writeln!(out, "! {alert}\n");
    }

    let now = OffsetDateTime::now_utc();
    let mut t = Table::new(["ID", "NAME", "TOOL", "STATUS", "CREATED"]).max_width(40);
    for r in b.rows() {
        t.row([
            r.id.clone(),
            r.name.clone(),
            r.kind.clone(),
            plain_status(r, icons),
            format_age(r.created_at.as_deref(), now),
        ]);
    }
    if t.is_empty() {
        out.push_str("No tasks found\n");
    } else {
        out.push_str(&t.render());
    }
    out
}

fn plain_status(row: &TaskRow, icons: bool) -> String {
    let badge = row.badge();
    let mut s = format!("{} {}", badge.icon.glyph(icons), badge.text);
    if row.poll_error().is_some() {
        s.push_str(" (status unavailable)");
    }
    s
}

async fn cmd_tasks(ctx: &Ctx, args: TasksArgs) -> anyhow::Result<ExitCode> {
    let pattern = args
        .pattern
        .as_deref()
        .map(regex::Regex::new)
        .transpose()
        .context("invalid --match pattern")?;

    let tasks: Vec<TaskSummary> = ctx
        .api
        .list_tasks()
        .await?
        .into_iter()
        .filter(|t| args.filter.is_none_or(|s| t.status == s))
        .filter(|t| {
            pattern
                .as_ref()
                .is_none_or(|re| re.is_match(&t.name) || re.is_match(&t.kind))
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(ExitCode::SUCCESS);
    }

    let now = OffsetDateTime::now_utc();
    let mut t = Table::new(["ID", "NAME", "TOOL", "STATUS", "CREATED"]);
    for task in &tasks {
        let created = if args.csv {
            task.created_at.clone().unwrap_or_default()
        } else {
            format_age(task.created_at.as_deref(), now)
        };
        t.row([
            task.id.clone(),
            task.display_name().to_owned(),
            task.kind.clone(),
            task.status.as_str().to_owned(),
            created,
        ]);
    }

    if args.csv {
        t.print_csv()?;
    } else if tasks.is_empty() {
        println!("No tasks found");
    } else {
        t.print()?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_task(ctx: &Ctx, args: TaskArgs) -> anyhow::Result<ExitCode> {
    match args.cmd {
        TaskCmd::Status(a) => task_status(ctx, &a).await,
        TaskCmd::Stop(a) => task_stop(ctx, &a).await,
        TaskCmd::Output(a) => task_output(ctx, &a).await,
        TaskCmd::Follow(a) => task_follow(ctx, &a.id).await,
        TaskCmd::Analyze(a) => task_analyze(ctx, &a).await,
        TaskCmd::FollowUp(a) => task_follow_up(ctx, a).await,
    }
}

async fn task_analyze(ctx: &Ctx, args: &TaskAnalyzeArgs) -> anyhow::Result<ExitCode> {
    match ctx.api.task_analysis(&args.id).await {
        Ok(a) if args.json => println!("{}", serde_json::to_string_pretty(&a)?),
        Ok(a) => print!("{}", analysis::render(&a)),
        Err(ApiError::Rejected(m)) => {
            eprintln!("Error loading analysis: {m}");
            return Ok(ExitCode::from(1));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(ExitCode::SUCCESS)
}

async fn task_follow_up(ctx: &Ctx, args: TaskFollowUpArgs) -> anyhow::Result<ExitCode> {
    match ctx.api.run_follow_up(&args.into_request()).await {
        Ok(started) => {
            println!(
                "{} (task {})",
                or_default(started.message, "Follow-up task started."),
                started.task_id
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(ApiError::Rejected(m)) => {
            eprintln!("Error: {m}");
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e.into()),
    }
}

async fn task_status(ctx: &Ctx, args: &TaskStatusArgs) -> anyhow::Result<ExitCode> {
    let report = ctx.api.task_status(&args.id).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(ExitCode::SUCCESS);
    }
    println!("Task {}: {}", args.id, report.status.label());
    for line in &report.recent_output {
        println!("  {line}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn task_stop(ctx: &Ctx, args: &TaskStopArgs) -> anyhow::Result<ExitCode> {
    if !args.yes {
        if !std::io::stdin().is_terminal() {
            anyhow::bail!("refusing to stop task {} without --yes", args.id);
        }
        if !confirm(&format!("Stop task {}?", args.id))? {
            println!("Cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    match ctx.api.stop_task(&args.id).await {
        Ok(message) if message.trim().is_empty() => println!("Task {} stopped.", args.id),
        Ok(message) => println!("{message}"),
        Err(e) => {
            debug!(error = %e, "stop failed");
            eprintln!("{}", poller::stop_failure_alert(&e));
            return Ok(ExitCode::from(1));
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn task_output(ctx: &Ctx, args: &TaskOutputArgs) -> anyhow::Result<ExitCode> {
    let text = ctx.api.task_output(&args.id).await?;
    if args.plain || !tui::is_tty() {
        print!("{text}");
        if !text.ends_with('\n') && !text.is_empty() {
            println!();
        }
        return Ok(ExitCode::SUCCESS);
    }
    let palette = Palette::for_theme(ctx.cfg.ui.theme);
    output_viewer::run(&format!("Task {} output", args.id), &text, &palette)?;
    Ok(ExitCode::SUCCESS)
}

/// Exit status of `task follow` for the status the task ended in.
fn follow_exit_code(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Completed => 0,
        TaskStatus::Failed | TaskStatus::Error => 1,
        TaskStatus::Stopped => 2,
        TaskStatus::Pending | TaskStatus::Starting | TaskStatus::Running => 3,
    }
}

async fn task_follow(ctx: &Ctx, task_id: &str) -> anyhow::Result<ExitCode> {
    // A one-row board keeps transitions monotone here too.
    let mut board = Board::from_tasks(&[TaskSummary::new(task_id, TaskStatus::Pending)], 0);
    let mut seen: Vec<String> = Vec::new();
    let mut first = true;
    let mut ticker = tokio::time::interval(Duration::from_millis(ctx.cfg.poll.interval_ms));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                return Ok(ExitCode::from(130));
            }
            _ = ticker.tick() => {
                let report = ctx.api.task_status(task_id).await?;
                let change = board.apply_status(task_id, report.status);
                let current = board.row(task_id).map_or(report.status, TaskRow::status);
                if first || change.is_some() {
                    println!("[{}] status: {}", clock(), current.label());
                }
                first = false;

                for line in fresh_tail(&seen, &report.recent_output) {
                    println!("{line}");
                }
                seen = report.recent_output;

                if current.is_terminal() {
                    return Ok(ExitCode::from(follow_exit_code(current)));
                }
            }
        }
    }
}

fn clock() -> String {
    let fmt = time::macros::format_description!("[hour]:[minute]:[second]");
    OffsetDateTime::now_utc()
        .format(fmt)
        .unwrap_or_else(|_| "--:--:--".to_owned())
}

async fn cmd_projects(ctx: &Ctx, args: ProjectsArgs) -> anyhow::Result<ExitCode> {
    let cmd = args
        .cmd
        .unwrap_or_else(|| ProjectsCmd::List(ListJsonArgs::default()));
    let message = match cmd {
        ProjectsCmd::List(a) => {
            let projects = ctx.api.list_projects().await?;
            print_projects(&projects, a.json)?;
            return Ok(ExitCode::SUCCESS);
        }
        ProjectsCmd::Create(a) => ctx
            .api
            .create_project(&a.into_draft())
            .await
            .map(|m| or_default(m, "Project created.")),
        ProjectsCmd::Edit(a) => ctx
            .api
            .edit_project(&a.id, &a.draft.into_draft())
            .await
            .map(|m| or_default(m, "Project updated.")),
        ProjectsCmd::Delete(a) => {
            if !a.yes && !confirm(&format!("Delete project {}?", a.id))? {
                println!("Cancelled.");
                return Ok(ExitCode::SUCCESS);
            }
            ctx.api
                .delete_project(&a.id)
                .await
                .map(|m| or_default(m, "Project deleted."))
        }
        ProjectsCmd::Activate(a) => ctx
            .api
            .set_active_project(&a.id)
            .await
            .map(|m| or_default(m, "Active project changed.")),
    };

    match message {
        Ok(m) => {
            println!("{m}");
            Ok(ExitCode::SUCCESS)
        }
        Err(ApiError::Rejected(m)) => {
            eprintln!("{}", or_default(m, "The server rejected the request."));
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e.into()),
    }
}

fn or_default(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_owned()
    } else {
        message
    }
}

fn print_projects(projects: &[Project], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(projects)?);
        return Ok(());
    }
    if projects.is_empty() {
        println!("No projects found");
        return Ok(());
    }
    let now = OffsetDateTime::now_utc();
    let mut t = Table::new(["", "ID", "NAME", "DESCRIPTION", "CREATED"])
        .align(1, Align::Right)
        .max_width(48);
    for p in projects {
        t.row([
            if p.is_active { "*" } else { "" }.to_owned(),
            p.id.clone(),
            p.name.clone(),
            p.description.clone(),
            format_age(p.created_at.as_deref(), now),
        ]);
    }
    t.print()?;
    Ok(())
}

async fn cmd_targets(ctx: &Ctx, args: &TargetsArgs) -> anyhow::Result<ExitCode> {
    let targets: Vec<Target> = ctx.api.list_targets().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(ExitCode::SUCCESS);
    }
    if targets.is_empty() {
        println!("No targets found");
        return Ok(ExitCode::SUCCESS);
    }
    let mut t = Table::new(["ID", "TARGET", "PROJECT"]).align(0, Align::Right);
    for target in &targets {
        t.row([
            target.id.clone(),
            target.value.clone(),
            target.project_id.clone().unwrap_or_else(|| "-".to_owned()),
        ]);
    }
    t.print()?;
    Ok(ExitCode::SUCCESS)
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{question} (y/N): ");
    std::io::Write::flush(&mut std::io::stdout())?;
    let mut input = String::new();
    let _ = std::io::stdin().read_line(&mut input)?;
    let resp = input.trim().to_lowercase();
    Ok(resp == "y" || resp == "yes")
}

fn cmd_version() -> ExitCode {
    println!("scanwatch version {}", env!("CARGO_PKG_VERSION"));
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_board() {
        let cli = Cli::try_parse_from(["scanwatch", "--server", "http://scan:5000"]).unwrap();
        assert!(cli.cmd.is_none());
        assert_eq!(cli.server.as_deref(), Some("http://scan:5000"));
    }

    #[test]
    fn tasks_filter_parses_status_case_insensitively() {
        let cli = Cli::try_parse_from(["scanwatch", "tasks", "--filter", "Running"]).unwrap();
        match cli.cmd {
            Some(Commands::Tasks(a)) => assert_eq!(a.filter, Some(TaskStatus::Running)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["scanwatch", "tasks", "--filter", "paused"]).is_err());
        assert!(Cli::try_parse_from(["scanwatch", "tasks", "--json", "--csv"]).is_err());
    }

    #[test]
    fn follow_up_target_defaults_to_host_ip() {
        let cli = Cli::try_parse_from([
            "scanwatch", "task", "follow-up", "7", "--action", "searchsploit_service",
            "--host-ip", "10.0.0.5", "-p", "22", "--service", "ssh",
        ])
        .unwrap();
        let Some(Commands::Task(TaskArgs {
            cmd: TaskCmd::FollowUp(a),
        })) = cli.cmd
        else {
            panic!("expected task follow-up");
        };
        let req = a.into_request();
        assert_eq!(req.original_nmap_task_id, "7");
        assert_eq!(req.original_nmap_target, "10.0.0.5");
        assert_eq!(req.service_info.protocol.as_deref(), Some("tcp"));
        assert_eq!(req.service_info.port.as_deref(), Some("22"));
        assert_eq!(req.service_info.version, None);

        assert!(Cli::try_parse_from(["scanwatch", "task", "follow-up", "7", "--host-ip", "x"]).is_err());
    }

    #[test]
    fn project_create_collects_repeated_targets() {
        let cli = Cli::try_parse_from([
            "scanwatch", "projects", "create", "web", "-t", "10.0.0.1", "-t", "example.org",
            "-p", "3",
        ])
        .unwrap();
        let Some(Commands::Projects(ProjectsArgs {
            cmd: Some(ProjectsCmd::Create(a)),
        })) = cli.cmd
        else {
            panic!("expected projects create");
        };
        let draft = a.into_draft();
        assert_eq!(draft.name, "web");
        assert_eq!(draft.targets, "10.0.0.1\nexample.org");
        assert_eq!(draft.playbook_ids, vec!["3".to_owned()]);
    }

    #[test]
    fn follow_exit_codes_reflect_final_status() {
        assert_eq!(follow_exit_code(TaskStatus::Completed), 0);
        assert_eq!(follow_exit_code(TaskStatus::Error), 1);
        assert_eq!(follow_exit_code(TaskStatus::Stopped), 2);
    }

    #[test]
    fn plain_board_shows_counters_and_unavailable_marker() {
        let shared = Board::from_tasks(
            &[
                TaskSummary::new("1", TaskStatus::Running),
                TaskSummary::new("2", TaskStatus::Completed),
            ],
            10,
        )
        .shared();
        board::lock(&shared).mark_poll_error("1", "timeout");

        let out = render_board(&shared, false);
        assert!(out.contains("Running: 1 | Completed: 1 | Failed: 0"));
        assert!(out.contains("* Running (status unavailable)"));
        assert!(out.contains("+ Completed"));
    }
}
