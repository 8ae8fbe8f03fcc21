use anyhow::{Context, Result};
use attend_cli::config::ClientConfig;
use attend_cli::render;
use attend_cli::telemetry::{self, LogFormat};
use attend_gateway::{build_gateway, AuthApi, AuthenticatedGateway, EmployeeApi};
use attend_review::{ActionDispatcher, EmployeeId, LoadState, PendingFilter, ReviewSession, WsConnector};
use attend_session::FilePersistence;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "attend", version, about = "Attendance client: sessions, check-out and face verification review")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "ATTEND_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and keep the session on disk
    Login {
        username: String,
        #[arg(long, env = "ATTEND_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Session and today's attendance
    Status,
    /// Own attendance records
    History,
    /// Check out for today
    Checkout,
    /// Administrator review of pending verifications
    #[command(subcommand)]
    Review(ReviewCommand),
}

#[derive(Debug, Subcommand)]
enum ReviewCommand {
    /// Follow the review queue live until Ctrl-C
    Watch {
        /// Only list entries whose employee id or name contains this
        #[arg(long)]
        employee: Option<String>,
        /// Only list entries at or above this confidence (0.0 - 1.0)
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Approve one pending verification
    Approve {
        employee_id: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Reject one pending verification
    Reject {
        employee_id: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Approve several pending verifications in one request
    BatchApprove {
        #[arg(required = true)]
        employee_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(if cli.json_logs { LogFormat::Json } else { LogFormat::Compact });

    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let gateway = connect(&config)?;

    match cli.command {
        Command::Login { username, password } => {
            let profile = AuthApi::new(gateway)
                .login(&username, &password)
                .await
                .context("login failed")?;
            println!(
                "Signed in as {}{}",
                profile.username,
                if profile.is_admin { " (administrator)" } else { "" }
            );
        }
        Command::Logout => {
            AuthApi::new(gateway).logout();
            println!("Signed out");
        }
        Command::Status => status(gateway).await?,
        Command::History => {
            let records = EmployeeApi::new(gateway)
                .attendance_history()
                .await
                .context("fetching attendance history")?;
            for record in records {
                println!(
                    "{:>6}  {:<17} {:<17} {}",
                    record.id,
                    timestamp(record.check_in_time),
                    timestamp(record.check_out_time),
                    record.status
                );
            }
        }
        Command::Checkout => {
            let receipt = EmployeeApi::new(gateway).check_out().await.context("check-out failed")?;
            println!(
                "{} at {}",
                receipt.message.as_deref().unwrap_or("Checked out"),
                timestamp(receipt.check_out_time)
            );
        }
        Command::Review(command) => review(gateway, &config, command).await?,
    }
    Ok(())
}

fn connect(config: &ClientConfig) -> Result<Arc<AuthenticatedGateway>> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let session_file = config.session_path(home.as_deref())?;
    tracing::debug!("Session file: {}", session_file.display());
    build_gateway(&config.api(), Arc::new(FilePersistence::new(session_file)))
        .context("building HTTP client")
}

async fn status(gateway: Arc<AuthenticatedGateway>) -> Result<()> {
    let Some(session) = gateway.store().get() else {
        println!("Not signed in");
        return Ok(());
    };
    match session.access_expiry() {
        Some(expiry) if session.is_access_expired(Utc::now()) => {
            println!("Signed in; access token expired {expiry}, renews on next request");
        }
        Some(expiry) => println!("Signed in; access token valid until {expiry}"),
        None => println!("Signed in"),
    }

    let today = EmployeeApi::new(gateway)
        .today_status()
        .await
        .context("fetching today's status")?;
    if today.checked_out {
        println!("Checked out at {}", timestamp(today.check_out_time));
    } else if today.checked_in {
        println!("Checked in at {}", timestamp(today.check_in_time));
    } else {
        println!("Not checked in today");
    }
    Ok(())
}

async fn review(gateway: Arc<AuthenticatedGateway>, config: &ClientConfig, command: ReviewCommand) -> Result<()> {
    match command {
        ReviewCommand::Watch {
            employee,
            min_confidence,
        } => {
            let mut filter = PendingFilter::new();
            if let Some(needle) = employee {
                filter = filter.with_employee(needle);
            }
            if let Some(min) = min_confidence {
                filter = filter.with_min_confidence(min);
            }
            watch(gateway, config, &filter).await
        }
        ReviewCommand::Approve { employee_id, notes } => {
            let id = EmployeeId::new(employee_id);
            ActionDispatcher::detached(gateway)
                .approve(&id, &notes)
                .await
                .with_context(|| format!("approving {id}"))?;
            println!("Approved {id}");
            Ok(())
        }
        ReviewCommand::Reject { employee_id, notes } => {
            let id = EmployeeId::new(employee_id);
            ActionDispatcher::detached(gateway)
                .reject(&id, &notes)
                .await
                .with_context(|| format!("rejecting {id}"))?;
            println!("Rejected {id}");
            Ok(())
        }
        ReviewCommand::BatchApprove { employee_ids } => {
            let ids: Vec<EmployeeId> = employee_ids.into_iter().map(EmployeeId::new).collect();
            let report = ActionDispatcher::detached(gateway)
                .batch_approve(&ids)
                .await
                .context("batch approval failed")?;
            println!(
                "Approved {} of {}",
                report.approved_count.unwrap_or(report.approved.len()),
                ids.len()
            );
            for skipped in &report.skipped {
                println!("  skipped {skipped} (no pending record)");
            }
            Ok(())
        }
    }
}

async fn watch(gateway: Arc<AuthenticatedGateway>, config: &ClientConfig, filter: &PendingFilter) -> Result<()> {
    let connector = Arc::new(WsConnector::new(config.stream.clone()));
    let session = ReviewSession::open(gateway, connector, &config.review, config.stream.reconnect.clone());
    let mut views = session.subscribe();
    let mut shown = views.borrow_and_update().clone();
    println!("{}", render::status_line(&shown));

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = views.borrow_and_update().clone();
                if current.load() == &LoadState::Ready && shown.load() != &LoadState::Ready {
                    println!("{}", render::status_line(&current));
                    for item in current.filtered_pending(filter) {
                        println!("  {}", render::pending_row(item));
                    }
                    for alert in current.anomalies() {
                        println!("  {}", render::anomaly_row(alert));
                    }
                } else {
                    for line in render::changes(&shown, &current) {
                        println!("{line}");
                    }
                }
                shown = current;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                break;
            }
        }
    }

    session.close().await;
    Ok(())
}

fn timestamp(at: Option<chrono::DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}
