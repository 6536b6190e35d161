//! Gap detection and the pre-write duplicate guard.
//!
//! The gap is the list of issue IDs present in the store but absent from the
//! log, in store creation order. The guard re-reads the log from disk right
//! before a write and refuses to add any ID that is already there.

use crate::error::{BackfillError, Result};
use crate::model::{CanonicalRecord, ID_KEY};
use crate::storage::SqliteStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// How many colliding IDs to carry in a duplicate error.
const OVERLAP_SAMPLE_SIZE: usize = 10;

/// Result of comparing the store against the log.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GapReport {
    pub log_path: PathBuf,
    /// Distinct IDs found in the log.
    pub log_count: usize,
    /// Issues in the store.
    pub store_count: usize,
    /// Store issues already present in the log.
    pub already_logged: usize,
    /// Store-only IDs, in creation order.
    pub missing: Vec<String>,
}

impl GapReport {
    /// True if nothing needs exporting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Read every issue ID from a JSONL log.
///
/// A missing file is an empty set. Blank lines are skipped; lines without a
/// string `id` contribute nothing.
///
/// # Errors
///
/// Returns `LogUnparseable` for the first line that is not valid UTF-8 JSON,
/// or `FileIo` if the file cannot be read.
pub fn load_log_ids(path: &Path) -> Result<HashSet<String>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Log missing; treating as empty");
            return Ok(HashSet::new());
        }
        Err(e) => return Err(BackfillError::file_io(path, e)),
    };

    let reader = BufReader::with_capacity(2 * 1024 * 1024, file);
    let mut ids = HashSet::new();

    for (line_num, raw) in reader.split(b'\n').enumerate() {
        let raw = raw.map_err(|e| BackfillError::file_io(path, e))?;
        let Some(value) = parse_log_line(path, line_num + 1, &raw)? else {
            continue;
        };

        if let Some(id) = value.get(ID_KEY).and_then(Value::as_str) {
            ids.insert(id.to_string());
        }
    }

    tracing::debug!(path = %path.display(), count = ids.len(), "Loaded log IDs");
    Ok(ids)
}

/// Parse one raw log line (without its `\n`). `None` for a blank line.
///
/// # Errors
///
/// Returns `LogUnparseable` if the bytes are not UTF-8 or not valid JSON.
pub(crate) fn parse_log_line(path: &Path, line: usize, raw: &[u8]) -> Result<Option<Value>> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.trim_ascii().is_empty() {
        return Ok(None);
    }

    let unparseable = |reason: String| BackfillError::LogUnparseable {
        path: path.to_path_buf(),
        line,
        reason,
    };
    let text = std::str::from_utf8(raw).map_err(|e| unparseable(format!("invalid UTF-8: {e}")))?;
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| unparseable(e.to_string()))
}

/// Store IDs not present in the log, keeping the store order.
#[must_use]
pub fn compute_gap(store_ids: &[String], log_ids: &HashSet<String>) -> Vec<String> {
    store_ids
        .iter()
        .filter(|id| !log_ids.contains(*id))
        .cloned()
        .collect()
}

/// Compare the store with the log at `log_path`. Read-only.
///
/// # Errors
///
/// Returns an error if the log is unparseable or the store query fails.
pub fn detect_gap(store: &SqliteStore, log_path: &Path) -> Result<GapReport> {
    let log_ids = load_log_ids(log_path)?;
    let store_ids = store.issue_ids_by_created_at()?;
    let missing = compute_gap(&store_ids, &log_ids);

    let report = GapReport {
        log_path: log_path.to_path_buf(),
        log_count: log_ids.len(),
        store_count: store_ids.len(),
        already_logged: store_ids.len() - missing.len(),
        missing,
    };

    tracing::info!(
        store_path = %store.path().display(),
        log = report.log_count,
        store = report.store_count,
        missing = report.missing.len(),
        "Computed gap"
    );
    Ok(report)
}

/// Reject a batch that repeats an ID within itself.
///
/// # Errors
///
/// Returns `DuplicateIdentifierDetected` naming `target` if any ID repeats.
pub fn ensure_unique_batch(records: &[CanonicalRecord], target: &Path) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut repeated: Vec<String> = records
        .iter()
        .map(CanonicalRecord::id)
        .filter(|id| !seen.insert(*id))
        .map(ToString::to_string)
        .collect();

    if repeated.is_empty() {
        return Ok(());
    }

    repeated.sort();
    repeated.dedup();
    Err(duplicate_error(repeated, target))
}

/// Re-read the log and fail if any new record's ID is already in it.
///
/// Must run immediately before the first byte is written. The log is always
/// read fresh from disk; an earlier [`detect_gap`] result is never reused.
///
/// # Errors
///
/// Returns `DuplicateIdentifierDetected` with the overlap count, or any
/// error from reading the log.
pub fn guard_no_overlap(log_path: &Path, records: &[CanonicalRecord]) -> Result<()> {
    ensure_unique_batch(records, log_path)?;

    let existing = load_log_ids(log_path)?;
    let mut overlap: Vec<String> = records
        .iter()
        .map(CanonicalRecord::id)
        .filter(|id| existing.contains(*id))
        .map(ToString::to_string)
        .collect();

    if overlap.is_empty() {
        tracing::debug!(
            path = %log_path.display(),
            new = records.len(),
            "Duplicate guard passed"
        );
        return Ok(());
    }

    overlap.sort();
    tracing::error!(
        path = %log_path.display(),
        overlap = overlap.len(),
        "Duplicate guard tripped; log changed since the gap was computed"
    );
    Err(duplicate_error(overlap, log_path))
}

fn duplicate_error(ids: Vec<String>, path: &Path) -> BackfillError {
    BackfillError::DuplicateIdentifierDetected {
        count: ids.len(),
        path: path.to_path_buf(),
        sample: ids.into_iter().take(OVERLAP_SAMPLE_SIZE).collect(),
    }
}
