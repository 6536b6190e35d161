//! Export command implementation.

use super::{load_context, print_counts, with_store};
use crate::backfill::Target;
use crate::cli::ExportArgs;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::output::OutputContext;
use std::path::Path;

/// Execute the export command.
///
/// # Errors
///
/// Returns an error from any run stage. The log is never modified.
pub fn execute(
    args: &ExportArgs,
    beads_dir: Option<&Path>,
    cli: &CliOverrides,
    ctx: &OutputContext,
) -> Result<()> {
    let overrides = CliOverrides {
        output: args.output.clone().or_else(|| cli.output.clone()),
        ..cli.clone()
    };
    let (config, run) = load_context(beads_dir, &overrides)?;
    let target = Target::File(config.output.clone());
    let outcome = with_store(&config, |store| run.run(store, &target))?;

    if ctx.is_json() {
        return ctx.json_pretty(&outcome);
    }

    print_counts(&outcome.gap, ctx);
    match &outcome.write {
        Some(write) => ctx.success(&format!(
            "Written {} entries to {}",
            write.written,
            write.path.display()
        )),
        None => ctx.print("Nothing to export."),
    }
    Ok(())
}
