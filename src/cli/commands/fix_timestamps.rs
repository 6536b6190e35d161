//! Fix-timestamps command implementation.

use super::load_context;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::output::OutputContext;
use serde_json::json;
use std::path::Path;

/// Execute the fix-timestamps command. Does not open the store.
///
/// # Errors
///
/// Returns `LogNotFound` or `LogUnparseable`; the log is unchanged then.
pub fn execute(beads_dir: Option<&Path>, cli: &CliOverrides, ctx: &OutputContext) -> Result<()> {
    let (_, run) = load_context(beads_dir, cli)?;
    let (report, backup) = run.fix_timestamps()?;

    if ctx.is_json() {
        return ctx.json_pretty(&json!({
            "changed": report.changed,
            "total": report.total,
            "path": report.write.path,
            "content_hash": report.write.content_hash,
            "backup": backup,
        }));
    }

    ctx.success(&format!(
        "Fixed timestamps in {} entries ({} total)",
        report.changed, report.total
    ));
    Ok(())
}
