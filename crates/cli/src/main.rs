//! railpilot CLI - ticket task client.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use railpilot_core::{
    AccountId, LogQuery, QrScanState, Synced, Task, TaskDraft, TaskFilter, TaskId, TaskPatch,
    TaskStatus,
};
use railpilot_gateway::{Ack, HttpGateway, HttpGatewayConfig};
use railpilot_session::SessionManager;
use railpilot_storage::JsonFileCache;
use railpilot_tasks::TaskLifecycleManager;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "railpilot")]
#[command(about = "Client for the railway ticket task service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Service root, including the API prefix
    #[arg(long, env = "RAILPILOT_BASE_URL", default_value = "http://127.0.0.1:8000/api/v1")]
    base_url: String,

    /// Local cache file
    #[arg(long, env = "RAILPILOT_CACHE", default_value = ".railpilot/cache.json")]
    cache: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, env = "RAILPILOT_TIMEOUT_SECS", default_value = "60")]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage accounts
    #[command(subcommand)]
    Accounts(AccountCommand),
    /// Show the selected account and its login status
    Status,
    /// QR code login for the selected account
    #[command(subcommand)]
    Login(LoginCommand),
    /// Manage tasks
    #[command(subcommand)]
    Tasks(TaskCommand),
}

#[derive(Subcommand)]
enum AccountCommand {
    /// List accounts
    List,
    /// Register an account
    Add {
        /// Account username
        username: String,
    },
    /// Select an account
    Use {
        /// Account ID
        id: AccountId,
    },
    /// End a session (the selected account by default)
    Logout {
        /// Account ID
        id: Option<AccountId>,
    },
    /// Delete an account
    Remove {
        /// Account ID
        id: AccountId,
    },
}

#[derive(Subcommand)]
enum LoginCommand {
    /// Request a login QR code
    Qr,
    /// Check a QR code's scan state
    Poll {
        /// QR code uuid
        uuid: String,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// List tasks
    List {
        /// Only this account's tasks
        #[arg(long)]
        account: Option<AccountId>,
        /// Filter by status
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Rows to skip
        #[arg(long)]
        skip: Option<u32>,
        /// Page size
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show task details
    Show {
        /// Task ID
        id: TaskId,
    },
    /// Show task logs
    Logs {
        /// Task ID
        id: TaskId,
        /// Only entries of this level
        #[arg(long)]
        level: Option<String>,
        /// Page size
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Create a task from a JSON draft
    Create {
        /// Draft file
        #[arg(long)]
        file: PathBuf,
        /// Owning account (the selected account by default)
        #[arg(long)]
        account: Option<AccountId>,
    },
    /// Update a task from a JSON patch
    Update {
        /// Task ID
        id: TaskId,
        /// Patch file
        #[arg(long)]
        file: PathBuf,
    },
    /// Start a task
    Start {
        /// Task ID
        id: TaskId,
    },
    /// Stop a task
    Stop {
        /// Task ID
        id: TaskId,
    },
    /// Cancel a task
    Cancel {
        /// Task ID
        id: TaskId,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: TaskId,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let gateway = Arc::new(HttpGateway::new(HttpGatewayConfig {
        base_url: cli.base_url.clone(),
        timeout: Duration::from_secs(cli.timeout_secs),
    })?);
    let cache = Arc::new(
        JsonFileCache::open(&cli.cache)
            .with_context(|| format!("opening cache {}", cli.cache.display()))?,
    );
    let session = SessionManager::new(gateway.clone(), cache);
    let tasks = TaskLifecycleManager::new(gateway);

    let restored = session.restore_session().await;
    note_stale(&restored);
    debug!(selected = ?restored.value.as_ref().map(|a| a.id), "session restored");

    match cli.command {
        Commands::Accounts(command) => accounts(&session, command).await?,
        Commands::Status => status(&session).await,
        Commands::Login(command) => login(&session, command).await?,
        Commands::Tasks(command) => task_command(&session, &tasks, command).await?,
    }

    Ok(())
}

async fn accounts(session: &SessionManager, command: AccountCommand) -> Result<()> {
    match command {
        AccountCommand::List => {
            let listed = session.list_accounts().await;
            note_stale(&listed);
            let selected = session.selected().await.map(|a| a.id);

            println!("Accounts ({})", listed.value.len());
            for account in listed.value {
                println!(
                    "  {} {} | {} | {}",
                    if Some(account.id) == selected { "*" } else { " " },
                    account.id,
                    account.username,
                    if account.is_logged_in { "logged in" } else { "logged out" },
                );
            }
        }
        AccountCommand::Add { username } => {
            let account = session.register_account(&username).await?;
            println!("Added account: {} - {}", account.id, account.username);
        }
        AccountCommand::Use { id } => {
            let listed = session.list_accounts().await;
            note_stale(&listed);
            let Some(account) = listed.value.into_iter().find(|a| a.id == id) else {
                bail!("account {id} not found");
            };
            let confirmed = session.select_account(account).await;
            note_stale(&confirmed);
            println!("Selected account {id}");
            print_login(confirmed.value.as_ref().map(|s| s.is_logged_in));
        }
        AccountCommand::Logout { id: None } => {
            let ended = session.end_session().await;
            note_stale(&ended);
            if ended.is_fresh() {
                println!("Logged out");
            }
        }
        AccountCommand::Logout { id: Some(id) } => {
            let listed = session.list_accounts().await;
            note_stale(&listed);
            let Some(account) = listed.value.into_iter().find(|a| a.id == id) else {
                bail!("account {id} not found");
            };
            session.end_session_for(&account).await?;
            println!("Logged out account {id}");
        }
        AccountCommand::Remove { id } => {
            if session.remove_account(id).await? {
                println!("Removed account {id}");
            } else {
                println!("Account {id} was not removed");
            }
        }
    }
    Ok(())
}

async fn status(session: &SessionManager) {
    let Some(account) = session.selected().await else {
        println!("No account selected");
        return;
    };
    let refreshed = session.refresh_login_status().await;
    note_stale(&refreshed);

    println!("Account: {} - {}", account.id, account.username);
    if let Some(railway) = &account.railway_username {
        println!("  Railway user: {railway}");
    }
    print_login(refreshed.value.as_ref().map(|s| s.is_logged_in));
    if let Some(expire) = refreshed.value.and_then(|s| s.expire_time) {
        println!("  Expires: {expire}");
    }
}

async fn login(session: &SessionManager, command: LoginCommand) -> Result<()> {
    match command {
        LoginCommand::Qr => {
            let code = session.request_login_qr().await?;
            println!("QR code: {}", code.uuid);
            println!("{}", code.image_base64);
        }
        LoginCommand::Poll { uuid } => {
            let poll = session.poll_login_qr(&uuid).await?;
            println!("QR {}: {}", poll.state(), poll.message);
            if poll.state() == QrScanState::Confirmed {
                print_login(session.login_status().await.map(|s| s.is_logged_in));
            }
        }
    }
    Ok(())
}

async fn task_command(
    session: &SessionManager,
    tasks: &TaskLifecycleManager,
    command: TaskCommand,
) -> Result<()> {
    match command {
        TaskCommand::List { account, status, skip, limit } => {
            let filter = TaskFilter { account_id: account, status, skip, limit };
            let listed = tasks.list_tasks(filter).await;
            note_stale(&listed);

            println!("Tasks ({} of {})", listed.value.len(), tasks.snapshot().await.total);
            for task in listed.value {
                print_row(&task);
            }
        }
        TaskCommand::Show { id } => {
            let detail = tasks.fetch_task_detail(id).await;
            note_stale(&detail);
            let Some(task) = detail.value.filter(|t| t.id == id) else {
                bail!("task {id} not found");
            };
            print_detail(&task);
        }
        TaskCommand::Logs { id, level, limit } => {
            let logs = tasks.fetch_task_logs(id, LogQuery { level, skip: None, limit }).await;
            note_stale(&logs);
            for entry in logs.value {
                let at = entry.created_at.map(|t| t.to_string()).unwrap_or_default();
                println!("  {at} [{}] {}", entry.level.to_uppercase(), entry.message);
            }
        }
        TaskCommand::Create { file, account } => {
            let draft: TaskDraft = read_json(&file)?;
            let account_id = match account {
                Some(id) => id,
                None => match session.selected().await {
                    Some(selected) => selected.id,
                    None => bail!("no account selected; pass --account"),
                },
            };
            let task = tasks.create_task(draft, account_id).await?;
            println!("Created task: {} - {}", task.id, task.name);
        }
        TaskCommand::Update { id, file } => {
            let patch: TaskPatch = read_json(&file)?;
            if patch.is_empty() {
                bail!("patch in {} changes nothing", file.display());
            }
            let task = tasks.update_task(id, patch).await?;
            println!("Updated task: {} - {}", task.id, task.name);
        }
        TaskCommand::Start { id } => print_ack(tasks.start_task(id).await?),
        TaskCommand::Stop { id } => print_ack(tasks.stop_task(id).await?),
        TaskCommand::Cancel { id } => print_ack(tasks.cancel_task(id).await?),
        TaskCommand::Delete { id } => print_ack(tasks.delete_task(id).await?),
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn note_stale<T>(synced: &Synced<T>) {
    if let Some(reason) = synced.stale_reason() {
        eprintln!("warning: showing cached data ({reason})");
    }
}

fn print_login(logged_in: Option<bool>) {
    match logged_in {
        Some(true) => println!("  Login: active"),
        Some(false) => println!("  Login: inactive"),
        None => println!("  Login: unknown"),
    }
}

fn print_ack(ack: Ack) {
    let outcome = if ack.success { "ok" } else { "declined" };
    println!("{outcome}: {}", ack.message);
}

fn format_status(status: TaskStatus) -> String {
    status.as_str().to_uppercase()
}

fn print_row(task: &Task) {
    println!(
        "  {} | {} | {} {} -> {} | {}",
        task.id,
        format_status(task.status),
        task.train_date,
        task.from_station,
        task.to_station,
        task.name,
    );
}

fn print_detail(task: &Task) {
    println!("Task: {}", task.id);
    println!("  Name: {}", task.name);
    println!("  Status: {}", format_status(task.status));
    println!("  Route: {} -> {} on {}", task.from_station, task.to_station, task.train_date);
    println!("  Seats: {}", task.seat_types);
    if let Some(codes) = &task.train_codes {
        println!("  Trains: {codes}");
    }
    if let Some(range) = &task.start_time_range {
        println!("  Departure window: {range}");
    }
    match task.passenger_list() {
        Ok(passengers) => {
            let names: Vec<&str> = passengers.iter().map(|p| p.passenger_name.as_str()).collect();
            println!("  Passengers: {}", names.join(", "));
        }
        Err(_) => println!("  Passengers: {}", task.passengers),
    }
    println!("  Interval: {}s", task.query_interval);
    println!("  Retries: {} / {}", task.retry_count, task.max_retry_count);
    if let Some(order) = &task.order_id {
        println!("  Order: {order}");
    }
    if let Some(message) = &task.result_message {
        println!("  Result: {message}");
    }
    if let Some(created) = task.created_at {
        println!("  Created: {created}");
    }
}
