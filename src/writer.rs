//! JSONL output: append to the log, export to a separate file, or rewrite the
//! log with normalized timestamps.
//!
//! Records are always serialized into memory first so a serialization failure
//! can never leave a half-written line behind.

use crate::error::{BackfillError, Result};
use crate::gap::{ensure_unique_batch, guard_no_overlap, parse_log_line};
use crate::model::CanonicalRecord;
use crate::normalize::normalize_value;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Which output mode produced a [`WriteReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    Append,
    ExportFile,
    Rewrite,
}

/// Outcome of a single write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub mode: WriteMode,
    /// Lines written (new records for append/export, all records for rewrite).
    pub written: usize,
    pub path: PathBuf,
    /// SHA-256 (hex) of the bytes this write produced.
    pub content_hash: String,
}

/// Outcome of a fix-timestamps pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixReport {
    /// Lines whose content changed.
    pub changed: usize,
    /// Non-blank lines in the log.
    pub total: usize,
    pub write: WriteReport,
}

/// Serialize records to newline-terminated JSON lines.
///
/// # Errors
///
/// Returns an error if any record fails to serialize.
pub fn serialize_records(records: &[CanonicalRecord]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(records.len() * 512);
    for record in records {
        buf.extend_from_slice(record.to_line()?.as_bytes());
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Append records to the log after the duplicate guard passes.
///
/// Existing lines are left untouched. If the log does not end with a newline,
/// one is written before the first new record.
///
/// # Errors
///
/// Returns `DuplicateIdentifierDetected` (nothing written) if any ID is
/// already in the log, or an I/O error.
pub fn append_records(log_path: &Path, records: &[CanonicalRecord]) -> Result<WriteReport> {
    let payload = serialize_records(records)?;

    // Last check before the first byte goes out.
    guard_no_overlap(log_path, records)?;

    let io_err = |e| BackfillError::file_io(log_path, e);
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| BackfillError::file_io(parent, e))?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(log_path)
        .map_err(io_err)?;

    let mut hasher = Sha256::new();
    if needs_separator(&mut file).map_err(io_err)? {
        tracing::debug!(path = %log_path.display(), "Log lacks trailing newline; adding one");
        file.write_all(b"\n").map_err(io_err)?;
        hasher.update(b"\n");
    }

    file.write_all(&payload).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    hasher.update(&payload);

    tracing::info!(
        path = %log_path.display(),
        count = records.len(),
        "Appended records to log"
    );

    Ok(WriteReport {
        mode: WriteMode::Append,
        written: records.len(),
        path: log_path.to_path_buf(),
        content_hash: format!("{:x}", hasher.finalize()),
    })
}

/// Write records to a standalone file, replacing it atomically.
///
/// # Errors
///
/// Returns `DuplicateIdentifierDetected` if the batch repeats an ID, or an
/// I/O error.
pub fn export_records(output_path: &Path, records: &[CanonicalRecord]) -> Result<WriteReport> {
    ensure_unique_batch(records, output_path)?;
    let payload = serialize_records(records)?;
    let content_hash = write_atomic(output_path, &payload, None)?;

    tracing::info!(
        path = %output_path.display(),
        count = records.len(),
        "Exported records"
    );

    Ok(WriteReport {
        mode: WriteMode::ExportFile,
        written: records.len(),
        path: output_path.to_path_buf(),
        content_hash,
    })
}

/// Normalize timestamps on every line of an existing log, in place.
///
/// Lines that do not change are kept byte-for-byte; changed lines are
/// re-serialized. Blank lines are dropped. The whole file is replaced via a
/// temp file and rename, so a failure leaves the original intact.
///
/// # Errors
///
/// Returns `LogNotFound` if the log is missing, `LogUnparseable` for the
/// first malformed line, or an I/O error.
pub fn rewrite_log_normalized(log_path: &Path) -> Result<FixReport> {
    let contents = match fs::read(log_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BackfillError::LogNotFound {
                path: log_path.to_path_buf(),
            });
        }
        Err(e) => return Err(BackfillError::file_io(log_path, e)),
    };
    let permissions = fs::metadata(log_path)
        .map_err(|e| BackfillError::file_io(log_path, e))?
        .permissions();

    let mut payload = Vec::with_capacity(contents.len() + 64);
    let mut changed = 0;
    let mut total = 0;

    for (line_num, raw) in contents.split(|b| *b == b'\n').enumerate() {
        let line = raw.strip_suffix(b"\r").unwrap_or(raw);
        let Some(mut value) = parse_log_line(log_path, line_num + 1, line)? else {
            continue;
        };

        total += 1;
        if normalize_value(&mut value) {
            changed += 1;
            payload.extend_from_slice(serde_json::to_string(&value)?.as_bytes());
        } else {
            payload.extend_from_slice(line);
        }
        payload.push(b'\n');
    }

    let content_hash = write_atomic(log_path, &payload, Some(permissions))?;

    tracing::info!(
        path = %log_path.display(),
        changed,
        total,
        "Rewrote log with normalized timestamps"
    );

    Ok(FixReport {
        changed,
        total,
        write: WriteReport {
            mode: WriteMode::Rewrite,
            written: total,
            path: log_path.to_path_buf(),
            content_hash,
        },
    })
}

/// True if the file is non-empty and its last byte is not `\n`.
fn needs_separator(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Write `payload` to a sibling temp file, sync, then rename over `path`.
/// Returns the hex SHA-256 of the payload.
///
/// The result gets `keep` permissions when given (an existing file being
/// replaced), otherwise owner-only on unix.
fn write_atomic(path: &Path, payload: &[u8], keep: Option<fs::Permissions>) -> Result<String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| BackfillError::file_io(parent, e))?;
    }

    let temp_path = path.with_extension("jsonl.tmp");
    tracing::debug!(temp = %temp_path.display(), target = %path.display(), "Writing temp file");

    let staged = write_and_sync(&temp_path, payload)
        .and_then(|()| apply_permissions(&temp_path, keep))
        .map_err(|e| BackfillError::file_io(&temp_path, e))
        .and_then(|()| fs::rename(&temp_path, path).map_err(|e| BackfillError::file_io(path, e)));
    if let Err(err) = staged {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    let mut hasher = Sha256::new();
    hasher.update(payload);
    Ok(format!("{:x}", hasher.finalize()))
}

fn write_and_sync(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(payload)?;
    writer.flush()?;
    writer.into_inner().map_err(io::IntoInnerError::into_error)?.sync_all()
}

fn apply_permissions(path: &Path, keep: Option<fs::Permissions>) -> io::Result<()> {
    if let Some(perms) = keep {
        return fs::set_permissions(path, perms);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use tempfile::TempDir;

    fn record(id: &str, created_at: &str) -> CanonicalRecord {
        let mut scalars = Map::new();
        scalars.insert("title".into(), json!(format!("Issue {id}")));
        scalars.insert("created_at".into(), json!(created_at));
        CanonicalRecord::assemble(id, scalars, vec![], vec![], vec![]).unwrap()
    }

    fn read_ids(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_append_preserves_existing_lines() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("issues.jsonl");
        let existing = "{\"id\":\"bd-a\",\"title\":\"keep me exactly\"}\n";
        fs::write(&log, existing).unwrap();

        let report = append_records(&log, &[record("bd-b", "2026-01-01T00:00:00Z")]).unwrap();

        assert_eq!(report.mode, WriteMode::Append);
        assert_eq!(report.written, 1);
        let contents = fs::read_to_string(&log).unwrap();
        assert!(contents.starts_with(existing));
        assert!(contents.ends_with('\n'));
        assert_eq!(read_ids(&log), vec!["bd-a", "bd-b"]);
    }

    #[test]
    fn test_append_adds_separator_when_newline_missing() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("issues.jsonl");
        fs::write(&log, "{\"id\":\"bd-a\"}").unwrap();

        append_records(&log, &[record("bd-b", "x")]).unwrap();

        let contents = fs::read_to_string(&log).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert_eq!(read_ids(&log), vec!["bd-a", "bd-b"]);
    }

    #[test]
    fn test_append_creates_missing_log() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("nested").join("issues.jsonl");
        append_records(&log, &[record("bd-a", "x"), record("bd-b", "y")]).unwrap();
        assert_eq!(read_ids(&log), vec!["bd-a", "bd-b"]);
    }

    #[test]
    fn test_append_rejected_in_full_on_overlap() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("issues.jsonl");
        let existing = "{\"id\":\"bd-a\"}\n";
        fs::write(&log, existing).unwrap();

        let err = append_records(&log, &[record("bd-b", "x"), record("bd-a", "y")]).unwrap_err();
        assert!(matches!(
            err,
            BackfillError::DuplicateIdentifierDetected { count: 1, .. }
        ));
        assert_eq!(fs::read_to_string(&log).unwrap(), existing);
    }

    #[test]
    fn test_export_writes_separate_file_and_hash() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("missing_issues.jsonl");
        let records = [record("bd-a", "x"), record("bd-b", "y")];

        let report = export_records(&out, &records).unwrap();

        assert_eq!(report.mode, WriteMode::ExportFile);
        assert_eq!(report.written, 2);
        assert_eq!(read_ids(&out), vec!["bd-a", "bd-b"]);
        let mut hasher = Sha256::new();
        hasher.update(fs::read(&out).unwrap());
        assert_eq!(report.content_hash, format!("{:x}", hasher.finalize()));
        assert!(!out.with_extension("jsonl.tmp").exists());
    }

    #[test]
    fn test_export_empty_batch_writes_empty_file() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out.jsonl");
        let report = export_records(&out, &[]).unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(fs::read(&out).unwrap(), b"");
    }

    #[test]
    fn test_non_ascii_written_verbatim() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out.jsonl");
        let mut scalars = Map::new();
        scalars.insert("title".into(), json!("Überprüfung ✓"));
        let rec = CanonicalRecord::assemble("bd-u", scalars, vec![], vec![], vec![]).unwrap();

        export_records(&out, &[rec]).unwrap();
        assert!(fs::read_to_string(&out).unwrap().contains("Überprüfung ✓"));
    }

    #[test]
    fn test_rewrite_counts_changed_and_keeps_others_verbatim() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("issues.jsonl");
        let untouched = "{\"title\":\"t\",\"id\":\"bd-a\",\"created_at\":\"2026-01-01T00:00:00Z\"}";
        fs::write(
            &log,
            format!(
                "{untouched}\n\n{{\"id\":\"bd-b\",\"created_at\":\"2026-01-02 03:04:05\",\"comments\":[{{\"created_at\":\"2026-01-02T03:04:05\"}}]}}\n"
            ),
        )
        .unwrap();

        let report = rewrite_log_normalized(&log).unwrap();

        assert_eq!(report.changed, 1);
        assert_eq!(report.total, 2);
        let contents = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], untouched);
        let fixed: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(fixed["created_at"], "2026-01-02T03:04:05Z");
        assert_eq!(fixed["comments"][0]["created_at"], "2026-01-02T03:04:05Z");

        let again = rewrite_log_normalized(&log).unwrap();
        assert_eq!(again.changed, 0);
        assert_eq!(fs::read_to_string(&log).unwrap(), contents);
    }

    #[test]
    fn test_rewrite_invalid_utf8_is_unparseable() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("issues.jsonl");
        let mut original = b"{\"id\":\"a\",\"created_at\":\"2026-01-01 00:00:00\"}\n{\"id\":\"".to_vec();
        original.extend_from_slice(&[0xff, 0xfe]);
        original.extend_from_slice(b"\"}\n");
        fs::write(&log, &original).unwrap();

        let err = rewrite_log_normalized(&log).unwrap_err();
        assert!(matches!(err, BackfillError::LogUnparseable { line: 2, .. }), "{err}");
        assert_eq!(fs::read(&log).unwrap(), original);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_keeps_log_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let log = temp.path().join("issues.jsonl");
        fs::write(&log, "{\"id\":\"a\",\"created_at\":\"2026-01-01 00:00:00\"}\n").unwrap();
        fs::set_permissions(&log, fs::Permissions::from_mode(0o644)).unwrap();

        rewrite_log_normalized(&log).unwrap();

        let mode = fs::metadata(&log).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_export_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out.jsonl");
        export_records(&out, &[record("bd-a", "x")]).unwrap();

        let mode = fs::metadata(&out).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_export_into_file_parent_reports_path() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let out = blocker.join("out.jsonl");

        match export_records(&out, &[record("bd-a", "x")]).unwrap_err() {
            BackfillError::FileIo { path, .. } => assert_eq!(path, blocker),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rewrite_missing_log_is_error() {
        let temp = TempDir::new().unwrap();
        let err = rewrite_log_normalized(&temp.path().join("nope.jsonl")).unwrap_err();
        assert!(matches!(err, BackfillError::LogNotFound { .. }));
    }

    #[test]
    fn test_rewrite_malformed_line_leaves_log_intact() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("issues.jsonl");
        let original = "{\"id\":\"a\",\"created_at\":\"2026-01-01 00:00:00\"}\n{broken\n";
        fs::write(&log, original).unwrap();

        let err = rewrite_log_normalized(&log).unwrap_err();
        assert!(matches!(err, BackfillError::LogUnparseable { line: 2, .. }));
        assert_eq!(fs::read_to_string(&log).unwrap(), original);
    }
}
