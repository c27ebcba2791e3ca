// ABOUTME: State command - inspect or reset the persisted reconciliation state
// ABOUTME: Reset asks for confirmation unless --yes is given

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use crate::config::BridgeConfig;
use crate::sync::SyncState;

#[derive(Args)]
pub struct StateArgs {
    #[command(subcommand)]
    command: StateCommands,
}

#[derive(Subcommand)]
enum StateCommands {
    /// Show tracked records and recent-sync marks
    Show {
        /// Print the raw state document as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget every fingerprint and mark (the next poll re-delivers everything)
    Reset {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub async fn command(args: StateArgs, config: &BridgeConfig) -> Result<()> {
    let reconciler = config.build_reconciler()?;
    let path = config.state.path.display().to_string();

    match args.command {
        StateCommands::Show { json } => {
            let state = reconciler
                .current_state()
                .await
                .context("Failed to read sync state")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print!("{}", describe_state(&path, &state));
            }
        }
        StateCommands::Reset { yes } => {
            if !yes && !confirm_reset(&path)? {
                bail!("Reset cancelled");
            }
            reconciler
                .reset_state()
                .await
                .context("Failed to reset sync state")?;
            println!("Sync state reset: {}", path);
        }
    }
    Ok(())
}

fn confirm_reset(path: &str) -> Result<bool> {
    use dialoguer::{theme::ColorfulTheme, Confirm};

    println!("Resetting {} makes the next poll re-deliver every record.", path);
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Reset sync state?")
        .default(false)
        .interact()?;
    Ok(confirmed)
}

pub fn describe_state(path: &str, state: &SyncState) -> String {
    let last_poll = state
        .last_poll
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());

    format!(
        "State file: {}\n\
         Last poll: {}\n\
         Tracked people: {}\n\
         Tracked companies: {}\n\
         Recent-sync marks: {}\n",
        path,
        last_poll,
        state.people.len(),
        state.companies.len(),
        state.recent_syncs.len()
    )
}
