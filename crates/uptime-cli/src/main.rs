mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, EnvFilter};

use uptime_core::{
    notification_channel, EndpointState, EndpointStatus, HttpChecker, MonitorConfig,
    NotificationDispatcher, Notifier, Scheduler, SmtpMailer, TickSummary, WatchListFile,
};

use crate::config::AppConfig;

/// How long the notification dispatcher may keep draining after shutdown.
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP uptime monitor: watch a list of URLs and email on every up/down change.
#[derive(Parser)]
#[command(name = "uptime-monitor", version, about)]
struct Cli {
    /// Load environment variables from this file instead of ./.env.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Watch-list file. Overrides WATCH_LIST_PATH.
    #[arg(long, global = true)]
    watch_list: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor the watch list until interrupted (default).
    Run,
    /// Check every endpoint once, print the result and exit. Sends no email.
    Check {
        /// Print the result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let app_config = load_config(&cli);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_monitor(app_config).await,
        Commands::Check { json } => run_check(app_config, json).await,
    }
}

fn load_config(cli: &Cli) -> AppConfig {
    let env_file = match cli.env_file {
        Some(ref path) => match dotenvy::from_path(path) {
            Ok(()) => Some(path.clone()),
            Err(e) => {
                init_tracing("pretty");
                tracing::error!(path = %path.display(), error = %e, "Failed to load env file");
                std::process::exit(1);
            }
        },
        None => dotenvy::dotenv().ok(),
    };

    let mut app_config = match AppConfig::from_env() {
        Ok(c) => {
            init_tracing(&c.log_format);
            c
        }
        Err(e) => {
            init_tracing("pretty");
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = env_file {
        tracing::info!(path = %path.display(), "Loaded env file");
    }
    if let Some(ref path) = cli.watch_list {
        app_config.monitor = app_config.monitor.with_watch_list(path);
    }
    app_config
}

async fn prepare_watch_list(path: &Path) -> WatchListFile {
    let source = WatchListFile::new(path);
    if let Err(e) = source.ensure_exists().await {
        tracing::error!(error = %e, "Cannot prepare watch list");
        std::process::exit(1);
    }
    source
}

fn build_checker(monitor: &MonitorConfig) -> HttpChecker {
    match HttpChecker::from_config(monitor) {
        Ok(checker) => checker,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            std::process::exit(1);
        }
    }
}

async fn run_monitor(app_config: AppConfig) {
    let AppConfig {
        monitor,
        notify,
        smtp,
        ..
    } = app_config;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        watch_list = %monitor.watch_list.display(),
        interval_secs = monitor.interval.as_secs(),
        request_timeout_secs = monitor.request_timeout.as_secs(),
        request_retries = monitor.request_retries,
        method = %monitor.check_method,
        recipients = notify.recipients.len(),
        smtp = ?smtp,
        "Starting uptime monitor"
    );

    let source = prepare_watch_list(&monitor.watch_list).await;
    let checker = build_checker(&monitor);

    let mailer = match SmtpMailer::new(&smtp, &notify.sender, notify.send_timeout) {
        Ok(mailer) => mailer,
        Err(e) => {
            tracing::error!(error = %e, "Invalid SMTP configuration");
            std::process::exit(1);
        }
    };
    if smtp.verify_on_startup {
        if let Err(e) = mailer.verify().await {
            tracing::error!(host = %smtp.host, port = smtp.port, error = %e, "SMTP verification failed");
            std::process::exit(1);
        }
    } else {
        tracing::info!(host = %smtp.host, "Skipping SMTP verification");
    }
    if notify.recipients.is_empty() {
        tracing::warn!("EMAIL_RECIPIENTS is empty, status changes will only be logged");
    }

    let (notification_tx, notification_rx) = notification_channel();
    let notifier = Notifier::from_config(Arc::new(mailer), &notify);
    let dispatcher_handle = tokio::spawn(NotificationDispatcher::new(notification_rx, notifier).run());
    tracing::info!("Notification dispatcher started");

    let scheduler = Scheduler::new(
        monitor,
        notify,
        Arc::new(source),
        Arc::new(checker),
        Some(notification_tx),
    );

    // Returns on SIGINT/SIGTERM and drops the scheduler's sender on the way out.
    scheduler.run(shutdown_signal()).await;

    drain_dispatcher(dispatcher_handle, DISPATCHER_DRAIN_TIMEOUT).await;

    tracing::info!("Shutdown complete");
}

/// Wait for the dispatcher to deliver what is queued, aborting it after `limit`.
///
/// Returns whether it finished on its own.
async fn drain_dispatcher(handle: JoinHandle<()>, limit: Duration) -> bool {
    let abort = handle.abort_handle();
    match tokio::time::timeout(limit, handle).await {
        Ok(_) => {
            tracing::info!("Notification dispatcher shut down");
            true
        }
        Err(_) => {
            tracing::warn!("Notification dispatcher did not shut down in time, aborting");
            abort.abort();
            false
        }
    }
}

#[derive(Serialize)]
struct CheckReport<'a> {
    summary: &'a TickSummary,
    endpoints: &'a [EndpointState],
}

async fn run_check(app_config: AppConfig, json: bool) {
    let source = prepare_watch_list(&app_config.monitor.watch_list).await;
    let checker = build_checker(&app_config.monitor);
    let watch_list = app_config.monitor.watch_list.clone();

    let mut scheduler = Scheduler::new(
        app_config.monitor,
        app_config.notify,
        Arc::new(source),
        Arc::new(checker),
        None,
    );
    let summary = scheduler.poll_once().await;
    let endpoints = scheduler.endpoints();

    if json {
        let report = CheckReport {
            summary: &summary,
            endpoints: &endpoints,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize check report");
                std::process::exit(1);
            }
        }
    } else {
        print_report(&watch_list, &summary, &endpoints);
    }

    if summary.down > 0 {
        std::process::exit(2);
    }
}

fn print_report(watch_list: &Path, summary: &TickSummary, endpoints: &[EndpointState]) {
    println!(
        "{} {}",
        style("uptime-monitor").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!(
        "  {} {}",
        style("watch list:").dim(),
        style(watch_list.display()).bold()
    );
    println!();

    if endpoints.is_empty() {
        println!("  {}", style("Watch list is empty").dim());
        return;
    }

    for state in endpoints {
        let badge = format!("{:<4}", state.status().to_string().to_uppercase());
        let badge = match state.status() {
            EndpointStatus::Up => style(badge).green().bold(),
            EndpointStatus::Down => style(badge).red().bold(),
            EndpointStatus::Unknown => style(badge).dim(),
        };
        let detail = match (state.last_status_code(), state.last_error()) {
            (_, Some(error)) => style(error.to_string()).red(),
            (Some(code), None) => style(code.to_string()).dim(),
            (None, None) => style(String::new()),
        };
        println!("  {}  {}  {}", badge, state.endpoint(), detail);
    }

    println!();
    println!(
        "  {} up, {} down",
        style(summary.up).green(),
        style(summary.down).red()
    );
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
