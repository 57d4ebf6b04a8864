//! Konoha CLI - check attendees in from the command line
//!
//! Feeds scanned QR payloads through the check-in engine and reconciles the
//! local queue with the attendance store.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands, SyncCommands, TokenCommands};
use crate::commands::attendance::run_attendance;
use crate::commands::common::{resolve_db_path, CliContext};
use crate::commands::completions::run_completions;
use crate::commands::link::run_link;
use crate::commands::reset::run_reset;
use crate::commands::scan::run_scan;
use crate::commands::sync::{run_sync, run_sync_conflicts};
use crate::commands::token::{run_token_inspect, run_token_issue};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("konoha=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = CliContext {
        db_path: resolve_db_path(cli.db_path),
        config_path: cli.config,
        snapshot: cli.snapshot,
        offline: cli.offline,
    };

    match cli.command {
        Commands::Scan { event, input, sync } => {
            run_scan(&event, input.as_deref(), sync, &context).await?;
        }
        Commands::Sync { command } => match command {
            None => run_sync(&context).await?,
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &context).await?;
            }
        },
        Commands::Attendance { event, json } => run_attendance(&event, json, &context).await?,
        Commands::Token { command } => match command {
            TokenCommands::Issue {
                event,
                attendee,
                issued_at,
            } => run_token_issue(&event, &attendee, issued_at, &context)?,
            TokenCommands::Inspect { payload } => run_token_inspect(&payload, &context)?,
        },
        Commands::Link { event_id } => run_link(&event_id)?,
        Commands::Reset { event, yes } => run_reset(&event, yes, &context).await?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
