use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "konoha")]
#[command(about = "Validate event check-ins and sync them with the attendance store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional JSON engine config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Use a JSON snapshot file as the remote store
    #[arg(long, global = true, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Simulate a disconnected remote store (snapshot mode only)
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan check-in payloads, one per line, from a file or stdin
    Scan {
        /// Event to check attendees in to
        #[arg(long, value_name = "ID")]
        event: String,
        /// Read payloads from a file instead of stdin
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,
        /// Run a sync pass after the input is exhausted
        #[arg(long)]
        sync: bool,
    },
    /// Push pending check-ins to the remote store
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Show attendance for an event
    Attendance {
        #[arg(long, value_name = "ID")]
        event: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Issue or inspect check-in tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Print the promotional link of an event
    Link {
        /// Event ID
        event_id: String,
    },
    /// Delete every check-in of an event, locally and remotely
    Reset {
        #[arg(long, value_name = "ID")]
        event: String,
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recently resolved check-in conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a signed check-in token and print its QR payload
    Issue {
        #[arg(long, value_name = "ID")]
        event: String,
        #[arg(long, value_name = "ID")]
        attendee: String,
        /// Issue time in Unix milliseconds (defaults to now)
        #[arg(long, value_name = "MS")]
        issued_at: Option<i64>,
    },
    /// Decode a payload and check its signature
    Inspect {
        /// Raw QR payload
        payload: String,
    },
}
