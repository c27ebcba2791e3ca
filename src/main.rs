// ABOUTME: CLI entry point for crm-sync-bridge
// ABOUTME: Parses commands and routes to appropriate handlers

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crm_sync_bridge::commands;
use crm_sync_bridge::{BridgeConfig, ChangeKind, EntityKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crm-sync-bridge")]
#[command(about = "Bidirectional contact and company sync between two CRMs", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to a bridge TOML config file
    #[arg(long = "config", env = "BRIDGE_CONFIG", global = true)]
    config_path: Option<PathBuf>,
    /// Override the sync state file location
    #[arg(long = "state-file", global = true)]
    state_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push new and changed System B records to System A's webhooks
    Poll {
        /// Only poll one entity kind (person or company)
        #[arg(long)]
        kind: Option<EntityKind>,
    },
    /// Apply a System A change event to System B
    Apply {
        /// Entity kind of the event (person or company)
        #[arg(long)]
        kind: EntityKind,
        /// Change kind of the event (new or update)
        #[arg(long)]
        change: ChangeKind,
        /// JSON payload file; reads stdin when omitted or "-"
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Append a System A note to the matching System B person
    Note {
        /// JSON payload file; reads stdin when omitted or "-"
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List System B's current snapshot for one entity kind
    Snapshot {
        #[arg(long)]
        kind: EntityKind,
        /// Include the normalized records in the output
        #[arg(long)]
        json: bool,
    },
    /// Report configuration health and System B reachability
    Status,
    /// Inspect or reset the reconciliation state
    State {
        #[command(flatten)]
        args: commands::StateArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config =
        BridgeConfig::load(cli.config_path.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = cli.state_file {
        config.state.path = path;
    }

    match cli.command {
        Commands::Poll { kind } => {
            let report = commands::poll(&config, kind).await?;
            if !report.is_success() {
                bail!(
                    "Poll finished with errors (status: {:?}, people: {}, companies: {})",
                    report.status,
                    report.people.errors,
                    report.companies.errors
                );
            }
            Ok(())
        }
        Commands::Apply { kind, change, file } => {
            let payload = commands::read_payload(file.as_deref())?;
            let response = commands::apply(&config, kind, change, payload).await?;
            if response.is_error() {
                bail!("Failed to apply {}/{} event", kind, change.as_str());
            }
            Ok(())
        }
        Commands::Note { file } => {
            let payload = commands::read_payload(file.as_deref())?;
            let response = commands::note(&config, payload).await?;
            if response.is_error() {
                bail!("Failed to append note");
            }
            Ok(())
        }
        Commands::Snapshot { kind, json } => commands::snapshot(&config, kind, json).await,
        Commands::Status => {
            commands::status(&config).await?;
            Ok(())
        }
        Commands::State { args } => commands::state(args, &config).await,
    }
}
