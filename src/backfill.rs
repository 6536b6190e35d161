//! Run orchestration: read log, read store, compute gap, reconstruct, guard,
//! write.
//!
//! Every failure before the write stage leaves the log and the store exactly
//! as they were. The store handle is borrowed from the caller, who owns its
//! lifetime.

use crate::error::{BackfillError, Result};
use crate::gap::{GapReport, detect_gap, guard_no_overlap};
use crate::history::{HistoryConfig, backup_log};
use crate::model::CanonicalRecord;
use crate::reconstruct::reconstruct_records;
use crate::storage::SqliteStore;
use crate::writer::{self, FixReport, WriteReport};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    ReadLog,
    ReadStore,
    ComputeGap,
    Reconstruct,
    Normalize,
    GuardRecheck,
    Write,
    Stop,
}

/// Where missing records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Append to the log itself.
    Log,
    /// Write to a separate file; the log is not touched.
    File(PathBuf),
}

/// Result of a backfill run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Last stage completed before stopping.
    pub reached: RunState,
    pub gap: GapReport,
    /// `None` when the gap was empty and nothing was written.
    pub write: Option<WriteReport>,
    /// Backup taken before appending, if any.
    pub backup: Option<PathBuf>,
}

impl RunOutcome {
    /// Number of records written.
    #[must_use]
    pub fn written(&self) -> usize {
        self.write.as_ref().map_or(0, |w| w.written)
    }
}

/// Paths and settings shared by every command.
#[derive(Debug, Clone)]
pub struct BackfillContext {
    pub beads_dir: PathBuf,
    pub log_path: PathBuf,
    pub history: HistoryConfig,
}

impl BackfillContext {
    #[must_use]
    pub fn new(beads_dir: &Path, log_path: &Path, history: HistoryConfig) -> Self {
        Self {
            beads_dir: beads_dir.to_path_buf(),
            log_path: log_path.to_path_buf(),
            history,
        }
    }

    /// Read-only gap report.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is unparseable or the store query fails.
    pub fn status(&self, store: &SqliteStore) -> Result<GapReport> {
        detect_gap(store, &self.log_path)
    }

    /// Export missing records to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error from any stage; nothing is written if a stage before
    /// the write fails.
    pub fn run(&self, store: &SqliteStore, target: &Target) -> Result<RunOutcome> {
        if let Target::File(output) = target {
            ensure_distinct(output, &self.log_path)?;
        }

        tracing::debug!(state = ?RunState::ReadLog, log = %self.log_path.display(), "Run started");
        let gap = detect_gap(store, &self.log_path)?;

        if gap.is_empty() {
            tracing::info!("Nothing to export");
            return Ok(RunOutcome {
                reached: RunState::ComputeGap,
                gap,
                write: None,
                backup: None,
            });
        }

        tracing::debug!(state = ?RunState::Reconstruct, count = gap.missing.len(), "Reconstructing");
        let records = reconstruct_records(store, &gap.missing)?;

        let (write, backup) = match target {
            Target::Log => self.append_to_log(&records)?,
            Target::File(output) => (writer::export_records(output, &records)?, None),
        };

        Ok(RunOutcome {
            reached: RunState::Write,
            gap,
            write: Some(write),
            backup,
        })
    }

    /// Guard, back up, then append. A tripped guard leaves no backup behind;
    /// `append_records` checks again right before writing.
    fn append_to_log(
        &self,
        records: &[CanonicalRecord],
    ) -> Result<(WriteReport, Option<PathBuf>)> {
        tracing::debug!(state = ?RunState::GuardRecheck, "Checking for overlap");
        guard_no_overlap(&self.log_path, records)?;
        let backup = backup_log(&self.beads_dir, &self.history, &self.log_path)?;
        let write = writer::append_records(&self.log_path, records)?;
        Ok((write, backup))
    }

    /// Normalize timestamps in the existing log, backing it up first.
    ///
    /// # Errors
    ///
    /// Returns `LogNotFound` if the log is missing, `LogUnparseable` for a
    /// malformed line, or an I/O error.
    pub fn fix_timestamps(&self) -> Result<(FixReport, Option<PathBuf>)> {
        if !self.log_path.is_file() {
            return Err(BackfillError::LogNotFound {
                path: self.log_path.clone(),
            });
        }
        let backup = backup_log(&self.beads_dir, &self.history, &self.log_path)?;
        let report = writer::rewrite_log_normalized(&self.log_path)?;
        Ok((report, backup))
    }
}

fn ensure_distinct(output: &Path, log_path: &Path) -> Result<()> {
    if resolve_target(output) == resolve_target(log_path) {
        tracing::warn!(
            output = %output.display(),
            log = %log_path.display(),
            "Export target resolves to the log"
        );
        return Err(BackfillError::Config(format!(
            "export output '{}' is the log itself; use append instead",
            output.display()
        )));
    }
    Ok(())
}

/// Real path of a file that may not exist yet: canonicalize the file, else
/// its parent plus the file name, else fall back to the absolute path.
fn resolve_target(path: &Path) -> PathBuf {
    if let Ok(real) = path.canonicalize() {
        return real;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(real_parent), Some(name)) => real_parent.join(name),
        _ => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
    }
}
