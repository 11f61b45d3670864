//! servq CLI: operator interface to the worker lifecycle.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use servq::config::Config;
use servq::config::secrets::redact_url;
use servq::db::Db;
use servq::engine::{Roster, WorkerLifecycle};
use servq::model::*;
use servq::ports::{OperatingHours, QueueAccess, WorkerStore};
use servq::telemetry::{TelemetryConfig, init_telemetry};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "servq", about = "Service desk worker lifecycle")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Window operations
    Window {
        #[command(subcommand)]
        action: WindowAction,
    },
    /// Worker operations
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },
    /// Count windows currently staffed and list who is working
    Windows,
    /// Served tickets and mean service time for a worker
    Stats {
        /// Worker ID
        id: i64,
        /// Period start (RFC 3339)
        #[arg(long)]
        from: DateTime<Utc>,
        /// Period end (RFC 3339)
        #[arg(long)]
        to: DateTime<Utc>,
    },
    /// List worker statuses
    Statuses,
}

#[derive(Subcommand)]
enum WindowAction {
    /// Seat a user's worker at a window
    Select {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        window: i64,
    },
}

#[derive(Subcommand)]
enum WorkerAction {
    /// Send a worker on break, requeueing its waiting tickets
    Break { id: i64 },
    /// End a worker's shift, requeueing its waiting tickets
    Finish { id: i64 },
    /// Show a worker
    Show { id: i64 },
    /// Show the worker owned by a user
    Me {
        #[arg(long)]
        user: i64,
    },
    /// List workers
    List {
        /// Filter by status name
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Onboard a worker (starts in "not work")
    Create {
        #[arg(long)]
        user: i64,
    },
    /// Delete a worker
    Remove { id: i64 },
}

struct App {
    lifecycle: WorkerLifecycle,
    roster: Roster,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "servq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    tracing::debug!(database = %redact_url(&config.database_url), "connecting");
    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;

    let store: Arc<dyn WorkerStore> = db.clone();
    let queue: Arc<dyn QueueAccess> = db;
    let hours: Arc<dyn OperatingHours> = Arc::new(config.schedule());
    let lifecycle = WorkerLifecycle::new(store, queue, hours, config.lifecycle()).await?;
    let roster = lifecycle.roster();
    let app = App { lifecycle, roster };

    match cli.command {
        Command::Window {
            action: WindowAction::Select { user, window },
        } => {
            let worker = app
                .lifecycle
                .claim_window(UserId(user), WindowId(window))
                .await?;
            println!("Worker {} now at window {window}", worker.id);
        }
        Command::Worker { action } => cmd_worker(&app, action).await?,
        Command::Windows => cmd_windows(&app).await?,
        Command::Stats { id, from, to } => {
            let stats = app
                .roster
                .stats(WorkerId(id), ServicePeriod::new(from, to))
                .await?;
            println!("Served:     {}", stats.served);
            println!("Avg time:   {}s", stats.average_service_time.as_secs());
        }
        Command::Statuses => {
            for record in app.roster.statuses() {
                println!("{:<4}  {}", record.id, record.name);
            }
        }
    }

    Ok(())
}

async fn cmd_worker(app: &App, action: WorkerAction) -> anyhow::Result<()> {
    match action {
        WorkerAction::Break { id } => {
            let worker = app.lifecycle.go_on_break(WorkerId(id)).await?;
            println!("Worker {} is on break", worker.id);
        }
        WorkerAction::Finish { id } => {
            let worker = app.lifecycle.finish_shift(WorkerId(id)).await?;
            println!("Worker {} finished work", worker.id);
        }
        WorkerAction::Show { id } => {
            let worker = app.roster.get(WorkerId(id)).await?;
            print_worker(app, &worker);
        }
        WorkerAction::Me { user } => match app.roster.me(UserId(user)).await? {
            Some(worker) => print_worker(app, &worker),
            None => println!("No worker for user {user}."),
        },
        WorkerAction::List {
            status,
            offset,
            limit,
        } => {
            let mut filter = WorkerFilter::default();
            if let Some(name) = status {
                let record = app
                    .roster
                    .status_by_name(&name)
                    .ok_or_else(|| anyhow::anyhow!("invalid status: {name}"))?;
                filter.status_id = Some(record.id);
            }
            let workers = app
                .roster
                .list(&filter, Some(Page { offset, limit }))
                .await?;
            if workers.is_empty() {
                println!("No workers found.");
                return Ok(());
            }

            println!("{:<8}  {:<8}  {:<10}  WINDOW", "ID", "USER", "STATUS");
            println!("{}", "-".repeat(40));
            for worker in &workers {
                println!(
                    "{:<8}  {:<8}  {:<10}  {}",
                    worker.id,
                    worker.user_id,
                    status_name(app, worker.status_id),
                    window_display(worker.window_id)
                );
            }
            println!("\n{} worker(s)", workers.len());
        }
        WorkerAction::Create { user } => {
            let status_id = app
                .lifecycle
                .statuses()
                .resolve(WorkerStatus::NotWork)?;
            let worker = app
                .roster
                .create(NewWorker {
                    user_id: UserId(user),
                    status_id,
                    window_id: None,
                })
                .await?;
            println!("Created: worker {} for user {}", worker.id, worker.user_id);
        }
        WorkerAction::Remove { id } => {
            let removed = app.roster.remove(WorkerId(id)).await?;
            println!("Removed: worker {} (user {})", removed.id, removed.user_id);
        }
    }
    Ok(())
}

async fn cmd_windows(app: &App) -> anyhow::Result<()> {
    let active = app.roster.active_workers().await?;
    println!("Active windows: {}", app.roster.active_windows().await?);
    for worker in &active {
        println!(
            "  window {:<6}  worker {}",
            window_display(worker.window_id),
            worker.id
        );
    }
    Ok(())
}

fn print_worker(app: &App, worker: &Worker) {
    println!("ID:      {}", worker.id);
    println!("User:    {}", worker.user_id);
    println!("Status:  {}", status_name(app, worker.status_id));
    println!("Window:  {}", window_display(worker.window_id));
    println!("State:   {}", app.lifecycle.statuses().state_of(worker));
}

fn status_name(app: &App, id: StatusId) -> String {
    app.roster
        .status(id)
        .map(|r| r.name.clone())
        .unwrap_or_else(|| id.to_string())
}

fn window_display(window: Option<WindowId>) -> String {
    window.map(|w| w.to_string()).unwrap_or_else(|| "-".to_string())
}
