//! Logging setup.
//!
//! Initializes a `tracing` subscriber on stderr with:
//! - `RUST_LOG` environment filter support (wins over flags)
//! - Verbosity from `-v` / `-vv` / `-q`
//! - JSON output when `BACKFILL_LOG_FORMAT=json`
//! - Optional log file instead of stderr

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Pick the default directive for a verbosity level.
#[must_use]
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is
/// already installed.
pub fn init_logging(
    verbose: u8,
    quiet: bool,
    log_file: Option<&Path>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let is_json = std::env::var("BACKFILL_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose > 1)
        .with_file(false)
        .with_line_number(false);

    match (log_file, is_json) {
        (Some(path), json) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            if json {
                builder.json().try_init()
            } else {
                builder.try_init()
            }
        }
        (None, true) => builder.with_writer(std::io::stderr).json().try_init(),
        (None, false) => builder.with_writer(std::io::stderr).try_init(),
    }
}

/// Install a test-friendly subscriber. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
