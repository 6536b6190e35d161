//! Append command implementation.

use super::{load_context, print_counts, with_store};
use crate::backfill::Target;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::output::OutputContext;
use std::path::Path;

/// Execute the append command.
///
/// # Errors
///
/// Returns `DuplicateIdentifierDetected` if the log gained any of the missing
/// IDs since it was first read, or an error from any other stage.
pub fn execute(beads_dir: Option<&Path>, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let (config, run) = load_context(beads_dir, cli)?;
    let outcome = with_store(&config, |store| run.run(store, &Target::Log))?;

    if ctx.is_json() {
        return ctx.json_pretty(&outcome);
    }

    print_counts(&outcome.gap, ctx);
    match &outcome.write {
        Some(write) => {
            ctx.success(&format!(
                "Appended {} entries to {}",
                write.written,
                write.path.display()
            ));
            if let Some(backup) = &outcome.backup {
                ctx.print(&format!("Backup: {}", backup.display()));
            }
        }
        None => ctx.print("Nothing to export."),
    }
    Ok(())
}
