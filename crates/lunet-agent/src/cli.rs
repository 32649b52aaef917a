//! CLI entry point.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::collector::run_collector;
use crate::config::{AgentConfig, load_config, validate_config};
use crate::error::AgentError;
use crate::node::{EdgeNode, IdentityRef, ProvisionRequest, ResetScope};
use crate::overrides::{CliOverrides, apply_overrides};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "lunet-rs",
    version,
    about = "Edge node agent: keeps xray users in sync with the registry and accounts their traffic"
)]
pub struct AgentArgs {
    /// Config file path (TOML, JSON/JSONC or YAML by extension).
    #[arg(short, long, global = true, env = "LUNET_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: CliOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Startup sync, then refresh the ledger periodically until SIGINT/SIGTERM.
    Run,
    /// Provision every active identity of the server.
    Sync,
    /// Add one user to the live proxy.
    AddUser {
        #[arg(long)]
        email: Option<String>,
        /// Registry user id; derives the email when none is given.
        #[arg(long)]
        user_id: Option<i64>,
        /// Account UUID; generated when absent.
        #[arg(long)]
        uuid: Option<String>,
        #[arg(long)]
        level: Option<u32>,
    },
    /// Remove one user from the live proxy.
    RemoveUser {
        #[arg(long, conflicts_with = "user_id", required_unless_present = "user_id")]
        email: Option<String>,
        #[arg(long)]
        user_id: Option<i64>,
    },
    /// Live traffic merged into the ledger, for one identity or all.
    Traffic {
        #[arg(long, conflicts_with = "email")]
        user_id: Option<i64>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Online state of every active identity.
    Online,
    /// Node-wide aggregate.
    Summary,
    /// Reset live counters and/or ledger history.
    Reset {
        #[arg(long, value_enum, default_value = "users")]
        scope: ResetScope,
        /// Restrict to these user ids (repeatable or comma-separated).
        #[arg(long = "user-id", num_args = 1.., value_delimiter = ',')]
        user_ids: Option<Vec<i64>>,
    },
    /// Persisted totals of one user.
    Totals {
        #[arg(long)]
        user_id: i64,
    },
    /// Create the ledger database and schema.
    InitLedger,
}

impl Command {
    /// Only the long-running agent serves the metrics endpoint.
    pub fn is_daemon(&self) -> bool {
        matches!(self, Command::Run)
    }
}

/// Resolve the effective configuration: file (or defaults), then overrides.
pub fn resolve_config(args: &AgentArgs) -> Result<AgentConfig, AgentError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => AgentConfig::default(),
    };
    apply_overrides(&mut config, &args.overrides);
    validate_config(&config)?;
    Ok(config)
}

pub async fn run(args: AgentArgs) -> Result<(), AgentError> {
    let config = resolve_config(&args)?;

    init_tracing(config.log_level.as_deref().unwrap_or("info"));

    if args.command.is_daemon()
        && let Some(listen) = config.metrics.listen.as_deref()
        && let Err(e) = lunet_metrics::init_prometheus(listen)
    {
        warn!(listen, error = %e, "metrics exporter not started");
    }

    let node = EdgeNode::from_config(config).await?;

    match args.command {
        Command::Run => serve(Arc::new(node)).await,
        Command::Sync => print_json(&node.resync().await?),
        Command::AddUser {
            email,
            user_id,
            uuid,
            level,
        } => print_json(
            &node
                .provision_identity(ProvisionRequest {
                    email,
                    user_id,
                    uuid,
                    level,
                })
                .await?,
        ),
        Command::RemoveUser { email, user_id } => {
            print_json(&node.remove_identity(target(email, user_id)?).await?)
        }
        Command::Traffic { user_id, email } => {
            if user_id.is_none() && email.is_none() {
                print_json(&node.traffic().await?)
            } else {
                print_json(&node.user_traffic(target(email, user_id)?).await?)
            }
        }
        Command::Online => print_json(&node.online().await?),
        Command::Summary => print_json(&node.summary().await?),
        Command::Reset { scope, user_ids } => {
            print_json(&node.reset_traffic(scope, user_ids).await?)
        }
        Command::Totals { user_id } => print_json(&node.ledger_totals(user_id).await?),
        Command::InitLedger => {
            info!(url = %node.config().ledger.url, "ledger ready");
            Ok(())
        }
    }
}

async fn serve(node: Arc<EdgeNode>) -> Result<(), AgentError> {
    info!(
        version = lunet_core::VERSION,
        server_id = node.server_id(),
        "lunet agent starting"
    );

    let shutdown = CancellationToken::new();
    let shutdown_trigger = shutdown.clone();
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        info!(signal, "shutdown signal received");
        shutdown_trigger.cancel();
    });

    tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        _ = node.startup_sync() => {}
    }

    match node.config().collector.interval() {
        Some(interval) => run_collector(node, interval, shutdown).await,
        None => {
            info!("collector disabled");
            shutdown.cancelled().await;
        }
    }
    info!("lunet agent stopped");
    Ok(())
}

fn target(email: Option<String>, user_id: Option<i64>) -> Result<IdentityRef, AgentError> {
    match (email, user_id) {
        (Some(email), _) => Ok(IdentityRef::Email(email)),
        (None, Some(user_id)) => Ok(IdentityRef::UserId(user_id)),
        (None, None) => Err(AgentError::InvalidArgument(
            "--email or --user-id is required".into(),
        )),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AgentError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Name of the first termination signal delivered.
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            name = interrupted() => name,
            _ = term.recv() => "SIGTERM",
        },
        Err(e) => {
            warn!(error = %e, "SIGTERM handler not installed");
            interrupted().await
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    interrupted().await
}

/// Never resolves when the Ctrl+C handler cannot be installed.
async fn interrupted() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "SIGINT handler not installed");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}
