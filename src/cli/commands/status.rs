//! Status command implementation.

use super::{load_context, print_counts, with_store};
use crate::config::CliOverrides;
use crate::error::Result;
use crate::output::OutputContext;
use std::path::Path;

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if config, the store, or the log cannot be read.
pub fn execute(beads_dir: Option<&Path>, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let (config, run) = load_context(beads_dir, cli)?;
    let report = with_store(&config, |store| run.status(store))?;

    if ctx.is_json() {
        return ctx.json_pretty(&report);
    }

    print_counts(&report, ctx);
    for id in &report.missing {
        ctx.print(&format!("  {id}"));
    }
    Ok(())
}
