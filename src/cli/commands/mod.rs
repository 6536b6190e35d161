//! Command implementations.

pub mod append;
pub mod export;
pub mod fix_timestamps;
pub mod status;

use crate::backfill::BackfillContext;
use crate::config::{BackfillConfig, CliOverrides};
use crate::error::Result;
use crate::gap::GapReport;
use crate::output::OutputContext;
use crate::storage::SqliteStore;
use std::path::Path;

/// Load configuration and build the run context.
///
/// # Errors
///
/// Returns an error if the beads dir cannot be found or config is malformed.
pub fn load_context(
    beads_dir: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<(BackfillConfig, BackfillContext)> {
    let config = BackfillConfig::load(beads_dir, overrides)?;
    let ctx = BackfillContext::new(
        &config.paths.beads_dir,
        &config.paths.jsonl_path,
        config.history.clone(),
    );
    Ok((config, ctx))
}

/// Open the store, run `f`, and release the connection on every path.
///
/// # Errors
///
/// Returns the error from opening the store, from `f`, or from closing.
pub fn with_store<T>(
    config: &BackfillConfig,
    f: impl FnOnce(&SqliteStore) -> Result<T>,
) -> Result<T> {
    let store = config.open_store()?;
    let value = f(&store)?;
    store.close()?;
    Ok(value)
}

/// Print the count preamble shared by status/export/append.
pub(crate) fn print_counts(report: &GapReport, ctx: &OutputContext) {
    ctx.print(&format!("JSONL entries: {}", report.log_count));
    ctx.print(&format!("SQLite entries: {}", report.store_count));
    ctx.print(&format!("Missing: {}", report.missing.len()));
}
