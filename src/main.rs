use beads_backfill::cli::commands;
use beads_backfill::cli::{Cli, Commands};
use beads_backfill::config;
use beads_backfill::logging::init_logging;
use beads_backfill::output::OutputContext;
use beads_backfill::{BackfillError, StructuredError};
use clap::Parser;
use std::io::{self, IsTerminal};

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if let Err(e) = init_logging(cli.verbose, cli.quiet, None) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let overrides = build_cli_overrides(&cli);
    let ctx = OutputContext::from_flags(cli.json, cli.quiet);
    let beads_dir = cli.beads_dir.as_deref();

    let result = match &cli.command {
        Commands::Status => commands::status::execute(beads_dir, &overrides, &ctx),
        Commands::Export(args) => commands::export::execute(args, beads_dir, &overrides, &ctx),
        Commands::Append => commands::append::execute(beads_dir, &overrides, &ctx),
        Commands::FixTimestamps => commands::fix_timestamps::execute(beads_dir, &overrides, &ctx),
    };

    if let Err(e) = result {
        handle_error(&e, cli.json);
    }
}

/// Handle errors with structured output support.
///
/// When --json is set or stdout is not a TTY, outputs structured JSON to stderr.
/// Otherwise, outputs human-readable error with optional color.
fn handle_error(err: &BackfillError, json_mode: bool) -> ! {
    let structured = StructuredError::from_error(err);
    let exit_code = structured.code.exit_code();

    let use_json = json_mode || !io::stdout().is_terminal();

    if use_json {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let use_color = io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}

fn build_cli_overrides(cli: &Cli) -> config::CliOverrides {
    config::CliOverrides {
        db: cli.db.clone(),
        jsonl: cli.jsonl.clone(),
        output: None,
        lock_timeout: cli.lock_timeout,
        no_history: cli.no_history,
    }
}
