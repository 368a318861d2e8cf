use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::{
    board::TaskBoard,
    error::{BoardError, GatewayError},
    export::{open_export, write_export},
    gateway::{AuthGateway, HttpGateway, HttpGatewayConfig, TaskGateway},
    notification::{BackendNotifier, NotificationBackend, Notifier},
    projector::{BoardStats, Column},
    reorder::ReorderOutcome,
    session::SessionContext,
    settings::Settings,
    types::{
        CreateTaskRequest, Credentials, RegisterPayload, Task, TaskId, TaskPriority, TaskStatus,
        UpdateTaskRequest,
    },
};

const SCHEMA_VERSION: &str = "cli.v1";

#[derive(Debug, Clone, Subcommand)]
pub enum RootCommand {
    /// Log in and keep the session for later commands
    Login(LoginArgs),
    /// Create an account and log in
    Register(RegisterArgs),
    Logout,
    Whoami,
    /// Show the board columns and a summary
    Board,
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Download the PDF report
    Export(ExportArgs),
    /// Show the settings, or change and save them
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Subcommand)]
pub enum TaskCommand {
    List(TaskListArgs),
    Create(TaskCreateArgs),
    Update(TaskUpdateArgs),
    Move(TaskMoveArgs),
    /// Move a task one column forward
    Advance(TaskIdArgs),
    Delete(TaskIdArgs),
}

#[derive(Debug, Clone, Args)]
pub struct LoginArgs {
    #[arg(long, value_name = "NAME")]
    pub username: String,

    #[arg(long, value_name = "PASSWORD", env = "TASKBOARD_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Clone, Args)]
pub struct RegisterArgs {
    #[arg(long, value_name = "NAME")]
    pub username: String,

    #[arg(long, value_name = "PASSWORD", env = "TASKBOARD_PASSWORD", hide_env_values = true)]
    pub password: String,

    #[arg(long, value_name = "TEXT")]
    pub full_name: String,

    #[arg(long, value_name = "EMAIL")]
    pub email: String,
}

#[derive(Debug, Clone, Args)]
pub struct TaskListArgs {
    #[arg(long, value_name = "STATUS", value_parser = parse_status)]
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Args)]
pub struct TaskCreateArgs {
    #[arg(long, value_name = "TEXT")]
    pub title: String,

    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub due: Option<NaiveDate>,

    #[arg(long, value_name = "PRIORITY", value_parser = parse_priority)]
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Clone, Args)]
pub struct TaskUpdateArgs {
    #[arg(long, value_name = "TASK_ID")]
    pub id: TaskId,

    #[arg(long, value_name = "TEXT")]
    pub title: Option<String>,

    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub due: Option<NaiveDate>,

    #[arg(long)]
    pub remove_due_date: bool,

    #[arg(long, value_name = "PRIORITY", value_parser = parse_priority)]
    pub priority: Option<TaskPriority>,

    #[arg(long, value_name = "STATUS", value_parser = parse_status)]
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Args)]
pub struct TaskMoveArgs {
    #[arg(long, value_name = "TASK_ID")]
    pub id: TaskId,

    #[arg(long, value_name = "STATUS", value_parser = parse_status)]
    pub status: TaskStatus,

    /// Zero-based slot in the target column; defaults to the end
    #[arg(long, value_name = "N")]
    pub position: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct TaskIdArgs {
    #[arg(long, value_name = "TASK_ID")]
    pub id: TaskId,
}

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Open the report in the default viewer
    #[arg(long)]
    pub open: bool,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    #[arg(long, value_name = "BACKEND", value_parser = parse_notification_backend)]
    pub notifications: Option<NotificationBackend>,

    /// Directory the PDF report is written to
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    #[arg(long, value_name = "DAYS")]
    pub due_soon_days: Option<u32>,
}

impl ConfigArgs {
    fn is_empty(&self) -> bool {
        self.api_url.is_none()
            && self.timeout_ms.is_none()
            && self.notifications.is_none()
            && self.export_dir.is_none()
            && self.due_soon_days.is_none()
    }

    fn apply(self, settings: &mut Settings) {
        if let Some(url) = self.api_url {
            settings.api_base_url = url;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings.request_timeout_ms = timeout_ms;
        }
        if let Some(backend) = self.notifications {
            settings.notification_backend = backend.as_str().to_string();
        }
        if let Some(dir) = self.export_dir {
            settings.export_dir = Some(dir);
        }
        if let Some(days) = self.due_soon_days {
            settings.due_soon_days = days;
        }
    }
}

fn parse_notification_backend(raw: &str) -> Result<NotificationBackend, String> {
    raw.parse::<NotificationBackend>()
        .map_err(|()| format!("unknown backend '{raw}' (expected none, terminal, system or both)"))
}

fn parse_status(raw: &str) -> Result<TaskStatus, String> {
    raw.parse::<TaskStatus>()
        .map_err(|()| format!("unknown status '{raw}' (expected TODO, IN_PROGRESS or DONE)"))
}

fn parse_priority(raw: &str) -> Result<TaskPriority, String> {
    raw.parse::<TaskPriority>()
        .map_err(|()| format!("unknown priority '{raw}' (expected LOW, MEDIUM or HIGH)"))
}

pub async fn run(
    settings: &Settings,
    session: Arc<SessionContext>,
    command: RootCommand,
    json_output: bool,
    quiet: bool,
) -> i32 {
    match execute(settings, session, command, json_output || quiet).await {
        Ok(output) => {
            print_success(output, json_output, quiet);
            0
        }
        Err(err) => {
            print_error(&err, json_output);
            err.exit_code
        }
    }
}

struct CommandOutput {
    command: &'static str,
    data: Value,
    text: String,
}

#[derive(Debug)]
struct CliError {
    exit_code: i32,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

type CliResult<T> = Result<T, CliError>;

struct Clients<'a> {
    settings: &'a Settings,
    session: Arc<SessionContext>,
    auth: Arc<dyn AuthGateway>,
    board: TaskBoard,
}

async fn execute(
    settings: &Settings,
    session: Arc<SessionContext>,
    command: RootCommand,
    silent: bool,
) -> CliResult<CommandOutput> {
    let gateway = HttpGateway::new(
        HttpGatewayConfig {
            base_url: settings.api_base_url.clone(),
            request_timeout: settings.request_timeout(),
        },
        Arc::clone(&session),
    )
    .map_err(runtime_error)?;
    let gateway = Arc::new(gateway);

    let backend = if silent {
        NotificationBackend::None
    } else {
        settings.notification_backend()
    };
    let notifier: Arc<dyn Notifier> = Arc::new(BackendNotifier::new(backend));
    let tasks: Arc<dyn TaskGateway> = gateway.clone();
    let clients = Clients {
        settings,
        board: TaskBoard::new(tasks, Arc::clone(&session), notifier),
        auth: gateway,
        session,
    };

    match command {
        RootCommand::Login(args) => login(&clients, args).await,
        RootCommand::Register(args) => register(&clients, args).await,
        RootCommand::Logout => logout(&clients),
        RootCommand::Whoami => whoami(&clients),
        RootCommand::Board => show_board(&clients).await,
        RootCommand::Task { command } => {
            require_login(&clients.session)?;
            execute_task_command(&clients, command).await
        }
        RootCommand::Export(args) => export(&clients, args).await,
        RootCommand::Config(args) => configure(clients.settings, args),
    }
}

async fn execute_task_command(
    clients: &Clients<'_>,
    command: TaskCommand,
) -> CliResult<CommandOutput> {
    match command {
        TaskCommand::List(args) => task_list(clients, args).await,
        TaskCommand::Create(args) => task_create(clients, args).await,
        TaskCommand::Update(args) => task_update(clients, args).await,
        TaskCommand::Move(args) => task_move(clients, args).await,
        TaskCommand::Advance(args) => task_advance(clients, args).await,
        TaskCommand::Delete(args) => task_delete(clients, args).await,
    }
}

async fn login(clients: &Clients<'_>, args: LoginArgs) -> CliResult<CommandOutput> {
    let credentials = Credentials {
        username: args.username.trim().to_string(),
        password: args.password,
    };
    credentials
        .validate()
        .map_err(|message| usage_error("INVALID_CREDENTIALS", message))?;

    let tokens = clients
        .auth
        .login(&credentials)
        .await
        .map_err(|err| auth_request_error(err, "login failed"))?;
    clients.session.establish(&tokens, credentials.username.clone());
    info!(username = %credentials.username, "logged in");

    Ok(session_output("login", clients.session.as_ref()))
}

async fn register(clients: &Clients<'_>, args: RegisterArgs) -> CliResult<CommandOutput> {
    let payload = RegisterPayload {
        username: args.username.trim().to_string(),
        password: args.password,
        full_name: args.full_name.trim().to_string(),
        email: args.email.trim().to_string(),
    };
    payload
        .validate()
        .map_err(|message| validation_error("INVALID_INPUT", message, None))?;

    let tokens = clients
        .auth
        .register(&payload)
        .await
        .map_err(|err| auth_request_error(err, "registration failed"))?;
    clients.session.establish(&tokens, payload.username.clone());
    info!(username = %payload.username, "registered and logged in");

    Ok(session_output("register", clients.session.as_ref()))
}

fn logout(clients: &Clients<'_>) -> CliResult<CommandOutput> {
    let ended = clients.session.logout();
    Ok(CommandOutput {
        command: "logout",
        data: json!({ "logged_out": ended }),
        text: if ended {
            "logged out".to_string()
        } else {
            "not logged in".to_string()
        },
    })
}

fn whoami(clients: &Clients<'_>) -> CliResult<CommandOutput> {
    require_login(&clients.session)?;
    Ok(session_output("whoami", clients.session.as_ref()))
}

fn session_output(command: &'static str, session: &SessionContext) -> CommandOutput {
    let username = session.username();
    let expires_at = session.expires_at();
    let who = username.clone().unwrap_or_else(|| "unknown user".to_string());
    let text = match expires_at {
        Some(expires_at) => format!(
            "logged in as {who} (session expires {})",
            expires_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        ),
        None => format!("logged in as {who}"),
    };

    CommandOutput {
        command,
        data: json!({
            "username": username,
            "expires_at": expires_at,
        }),
        text,
    }
}

async fn show_board(clients: &Clients<'_>) -> CliResult<CommandOutput> {
    require_login(&clients.session)?;

    let columns = clients.board.columns().await.map_err(board_error)?;
    let today = Local::now().date_naive();
    let stats = clients
        .board
        .stats(today, clients.settings.due_soon_days)
        .await
        .map_err(board_error)?;

    Ok(CommandOutput {
        command: "board",
        data: json!({
            "columns": columns,
            "stats": stats,
        }),
        text: render_board_text(&columns, &stats),
    })
}

async fn task_list(clients: &Clients<'_>, args: TaskListArgs) -> CliResult<CommandOutput> {
    let tasks = match args.status {
        Some(status) => clients
            .board
            .tasks_with_status(status)
            .await
            .map_err(board_error)?,
        None => clients
            .board
            .columns()
            .await
            .map_err(board_error)?
            .into_iter()
            .flat_map(|column| column.tasks)
            .collect(),
    };

    Ok(CommandOutput {
        command: "task list",
        data: json!({ "tasks": tasks }),
        text: render_task_list_text(&tasks),
    })
}

async fn task_create(clients: &Clients<'_>, args: TaskCreateArgs) -> CliResult<CommandOutput> {
    let request = CreateTaskRequest {
        title: args.title.trim().to_string(),
        description: args.description,
        due_date: args.due,
        priority: args.priority,
    };

    let created = clients.board.create(request).await.map_err(board_error)?;
    Ok(CommandOutput {
        command: "task create",
        data: json!({ "task": created }),
        text: format!("created task {} ({})", created.id, created.title),
    })
}

async fn task_update(clients: &Clients<'_>, args: TaskUpdateArgs) -> CliResult<CommandOutput> {
    let patch = UpdateTaskRequest {
        title: args.title.map(|title| title.trim().to_string()),
        description: args.description,
        due_date: args.due,
        remove_due_date: args.remove_due_date.then_some(true),
        priority: args.priority,
        status: args.status,
    };
    if patch.is_empty() {
        return Err(usage_error(
            "TASK_UPDATE_EMPTY",
            "provide at least one of --title, --description, --due, --remove-due-date, --priority, or --status",
        ));
    }

    let updated = clients
        .board
        .update(args.id, patch)
        .await
        .map_err(board_error)?;
    Ok(CommandOutput {
        command: "task update",
        data: json!({ "task": updated }),
        text: format!("updated task {}", updated.id),
    })
}

async fn task_move(clients: &Clients<'_>, args: TaskMoveArgs) -> CliResult<CommandOutput> {
    let outcome = clients
        .board
        .move_task(args.id, args.status, args.position)
        .await
        .map_err(board_error)?;
    Ok(move_output("task move", args.id, outcome))
}

async fn task_advance(clients: &Clients<'_>, args: TaskIdArgs) -> CliResult<CommandOutput> {
    let outcome = clients.board.advance(args.id).await.map_err(board_error)?;
    Ok(move_output("task advance", args.id, outcome))
}

fn move_output(command: &'static str, id: TaskId, outcome: ReorderOutcome) -> CommandOutput {
    match outcome {
        ReorderOutcome::Unchanged => CommandOutput {
            command,
            data: json!({ "moved": false, "task_id": id }),
            text: format!("task {id} unchanged"),
        },
        ReorderOutcome::Moved { task, refreshed } => CommandOutput {
            command,
            text: format!(
                "moved task {} to {} at position {}",
                task.id, task.status, task.position
            ),
            data: json!({ "moved": true, "refreshed": refreshed, "task": task }),
        },
    }
}

async fn task_delete(clients: &Clients<'_>, args: TaskIdArgs) -> CliResult<CommandOutput> {
    clients.board.delete(args.id).await.map_err(board_error)?;
    Ok(CommandOutput {
        command: "task delete",
        data: json!({ "deleted": true, "task_id": args.id }),
        text: format!("deleted task {}", args.id),
    })
}

async fn export(clients: &Clients<'_>, args: ExportArgs) -> CliResult<CommandOutput> {
    require_login(&clients.session)?;

    let bytes = clients.board.export_pdf().await.map_err(board_error)?;
    let dir = clients.settings.export_dir();
    let path = write_export(&dir, &bytes).map_err(|err| runtime_error(format!("{err:#}")))?;
    let opened = args.open && open_export(&path);

    Ok(CommandOutput {
        command: "export",
        data: json!({
            "path": path,
            "bytes": bytes.len(),
            "opened": opened,
        }),
        text: format!("exported {} bytes to {}", bytes.len(), path.display()),
    })
}

fn configure(current: &Settings, args: ConfigArgs) -> CliResult<CommandOutput> {
    let (settings, saved) = if args.is_empty() {
        (current.clone(), false)
    } else {
        let settings = Settings::update_saved(|settings| args.apply(settings))
            .map_err(|err| runtime_error(format!("{err:#}")))?;
        info!("settings saved");
        (settings, true)
    };
    let path = Settings::config_path();

    let rows = vec![
        vec!["api_base_url".to_string(), settings.api_base_url.clone()],
        vec![
            "request_timeout_ms".to_string(),
            settings.request_timeout_ms.to_string(),
        ],
        vec![
            "notification_backend".to_string(),
            settings.notification_backend.clone(),
        ],
        vec![
            "export_dir".to_string(),
            settings.export_dir().display().to_string(),
        ],
        vec!["due_soon_days".to_string(), settings.due_soon_days.to_string()],
    ];
    let mut text = render_text_table(&["Setting", "Value"], &rows);
    if saved && let Some(path) = path.as_ref() {
        text.push_str(&format!("\n\nsaved to {}", path.display()));
    }

    Ok(CommandOutput {
        command: "config",
        data: json!({
            "settings": settings,
            "path": path,
            "saved": saved,
        }),
        text,
    })
}

fn require_login(session: &SessionContext) -> CliResult<()> {
    if session.is_authenticated() {
        Ok(())
    } else {
        Err(auth_error(
            "NOT_LOGGED_IN",
            "not logged in; run `taskboard login` first",
        ))
    }
}

fn render_board_text(columns: &[Column], stats: &BoardStats) -> String {
    let mut sections = columns
        .iter()
        .map(|column| {
            let header = format!("{} ({})", column.title, column.len());
            if column.is_empty() {
                format!("{header}\n  (empty)")
            } else {
                format!("{header}\n{}", render_task_table(&column.tasks, false))
            }
        })
        .collect::<Vec<_>>();

    sections.push(format!(
        "{} tasks: {} to do, {} in progress, {} done, {} due soon",
        stats.total, stats.todo, stats.in_progress, stats.done, stats.due_soon
    ));
    sections.join("\n\n")
}

fn render_task_list_text(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks found.".to_string();
    }
    render_task_table(tasks, true)
}

fn render_task_table(tasks: &[Task], with_status: bool) -> String {
    let mut headers = vec!["ID"];
    if with_status {
        headers.push("Status");
    }
    headers.extend(["Pos", "Priority", "Due", "Title"]);

    let rows = tasks
        .iter()
        .map(|task| {
            let mut row = vec![task.id.to_string()];
            if with_status {
                row.push(task.status.to_string());
            }
            row.extend([
                task.position.to_string(),
                task.priority.as_str().to_string(),
                task.due_date
                    .map(|due| due.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                task.title.replace('\n', " "),
            ]);
            row
        })
        .collect::<Vec<_>>();

    render_text_table(&headers, &rows)
}

fn render_text_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            let width = cell.chars().count();
            if width > widths[index] {
                widths[index] = width;
            }
        }
    }

    let border = format!(
        "+{}+",
        widths
            .iter()
            .map(|width| "-".repeat(*width + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut lines = Vec::new();
    lines.push(border.clone());
    lines.push(format!(
        "| {} |",
        headers
            .iter()
            .enumerate()
            .map(|(index, header)| format!("{header:<width$}", width = widths[index]))
            .collect::<Vec<_>>()
            .join(" | ")
    ));
    lines.push(border.clone());

    for row in rows {
        lines.push(format!(
            "| {} |",
            row.iter()
                .enumerate()
                .map(|(index, cell)| format!("{cell:<width$}", width = widths[index]))
                .collect::<Vec<_>>()
                .join(" | ")
        ));
    }

    lines.push(border);
    lines.join("\n")
}

fn usage_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 2,
        code,
        message: message.into(),
        details: None,
    }
}

fn not_found_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 3,
        code,
        message: message.into(),
        details: None,
    }
}

fn auth_error(code: &'static str, message: impl Into<String>) -> CliError {
    CliError {
        exit_code: 4,
        code,
        message: message.into(),
        details: None,
    }
}

fn runtime_error(err: impl std::fmt::Display) -> CliError {
    CliError {
        exit_code: 5,
        code: "RUNTIME_ERROR",
        message: err.to_string(),
        details: None,
    }
}

fn validation_error(
    code: &'static str,
    message: impl Into<String>,
    details: Option<Value>,
) -> CliError {
    CliError {
        exit_code: 6,
        code,
        message: message.into(),
        details,
    }
}

fn board_error(err: BoardError) -> CliError {
    match err {
        BoardError::Gateway(err) => gateway_error(err, "request failed"),
        BoardError::SessionChanged => auth_error("SESSION_CHANGED", err.to_string()),
        BoardError::ReloadAborted => runtime_error(err),
    }
}

fn gateway_error(err: GatewayError, fallback: &str) -> CliError {
    match err {
        GatewayError::Auth(message) => auth_error(
            "AUTH_REQUIRED",
            format!("{message}; log in again with `taskboard login`"),
        ),
        GatewayError::NotFound(message) => not_found_error("NOT_FOUND", message),
        GatewayError::Validation { status, message } => validation_error(
            "VALIDATION_FAILED",
            non_blank(message, fallback),
            Some(json!({ "status": status })),
        ),
        GatewayError::InvalidInput(message) => validation_error("INVALID_INPUT", message, None),
        GatewayError::Network(message) => CliError {
            exit_code: 5,
            code: "NETWORK_ERROR",
            message: format!("{message}; check your connection and try again"),
            details: None,
        },
        GatewayError::Server { status, message } => CliError {
            exit_code: 5,
            code: "SERVER_ERROR",
            message: format!("server error ({status}): {message}; try again later"),
            details: Some(json!({ "status": status })),
        },
        GatewayError::Decode(message) => CliError {
            exit_code: 5,
            code: "UNEXPECTED_RESPONSE",
            message,
            details: None,
        },
    }
}

/// A 401 from the auth endpoints means bad credentials, not an ended session.
fn auth_request_error(err: GatewayError, fallback: &str) -> CliError {
    match err {
        GatewayError::Auth(message) => auth_error("LOGIN_FAILED", non_blank(message, fallback)),
        other => gateway_error(other, fallback),
    }
}

fn non_blank(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

fn print_success(output: CommandOutput, json_output: bool, quiet: bool) {
    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "command": output.command,
            "data": output.data
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => println!("{value}"),
            Err(_) => println!("{}", payload),
        }
        return;
    }

    if quiet {
        return;
    }

    if output.text.is_empty() {
        println!("ok");
    } else {
        println!("{}", output.text);
    }
}

fn print_error(err: &CliError, json_output: bool) {
    error!(
        code = err.code,
        message = %err.message,
        details = ?err.details,
        "cli command failed"
    );

    if json_output {
        let payload = json!({
            "schema_version": SCHEMA_VERSION,
            "error": {
                "code": err.code,
                "message": err.message,
                "details": err.details
            }
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(value) => eprintln!("{value}"),
            Err(_) => eprintln!("{}", payload),
        }
        return;
    }

    eprintln!("error[{}]: {}", err.code, err.message);
}
