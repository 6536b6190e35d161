//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Backfill issues present in the beads `SQLite` store but missing from the JSONL log
#[derive(Parser, Debug)]
#[command(name = "br-backfill", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Beads directory (default: $BEADS_DIR, else nearest .beads/ above the CWD)
    #[arg(long, global = true)]
    pub beads_dir: Option<PathBuf>,

    /// Database path (default: from .beads/metadata.json)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// JSONL log path (default: from .beads/metadata.json)
    #[arg(long, global = true)]
    pub jsonl: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// `SQLite` busy timeout in ms
    #[arg(long, global = true)]
    pub lock_timeout: Option<u64>,

    /// Skip the history backup before modifying the log
    #[arg(long, global = true)]
    pub no_history: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show which store issues are missing from the log (read-only)
    Status,

    /// Write missing issues to a separate file; the log is not modified
    Export(ExportArgs),

    /// Append missing issues to the log
    ///
    /// The log is re-read right before writing. If any ID to be written is
    /// already present, nothing is written and the command fails.
    #[command(long_about = "Append missing issues to the log.

SAFETY GUARANTEES:
  • Existing log lines are never modified
  • The log is re-read right before writing; if any ID to be written is
    already present (e.g. another writer got there first), nothing is written
  • A timestamped backup of the log is kept in .beads/.backfill_history/
    unless --no-history is given

EXAMPLES:
  br-backfill status        See what would be appended
  br-backfill append -v     Append with progress logging")]
    Append,

    /// Normalize timestamps in the existing log to RFC3339 UTC
    FixTimestamps,
}

/// Arguments for the export command.
#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
    /// Output file (default: missing_issues.jsonl in the working directory)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}
