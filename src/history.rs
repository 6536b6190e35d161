//! Local history backups of the JSONL log.
//!
//! This module handles:
//! - Creating a timestamped copy of the log before it is appended to or rewritten
//! - Skipping the copy when the log matches the newest backup
//! - Rotating backups based on count and age

use crate::error::{BackfillError, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Directory (inside the beads dir) holding backups.
pub const HISTORY_DIR_NAME: &str = ".backfill_history";

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Configuration for history backups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub max_count: usize,
    pub max_age_days: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_count: 20,
            max_age_days: 30,
        }
    }
}

/// Backup entry metadata.
#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

/// Path of the history directory for a beads dir.
#[must_use]
pub fn history_dir(beads_dir: &Path) -> PathBuf {
    beads_dir.join(HISTORY_DIR_NAME)
}

/// Copy the log into the history directory before it is modified.
///
/// Returns the backup path, or `None` when history is disabled, the log does
/// not exist yet, or the log is identical to the newest backup.
///
/// # Errors
///
/// Returns an error if the backup cannot be created or rotation fails.
pub fn backup_log(
    beads_dir: &Path,
    config: &HistoryConfig,
    log_path: &Path,
) -> Result<Option<PathBuf>> {
    if !config.enabled || !log_path.is_file() {
        return Ok(None);
    }

    let history_dir = history_dir(beads_dir);
    fs::create_dir_all(&history_dir).map_err(|e| BackfillError::file_io(&history_dir, e))?;

    let file_stem = log_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("issues");

    if let Some(latest) = get_latest_backup(&history_dir, file_stem)? {
        if file_digest(log_path)? == file_digest(&latest.path)? {
            tracing::debug!(
                latest = %latest.path.display(),
                "Skipping backup: log identical to latest backup"
            );
            return Ok(None);
        }
    }

    let timestamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT);
    let backup_path = history_dir.join(format!("{file_stem}.{timestamp}.jsonl"));
    fs::copy(log_path, &backup_path).map_err(|e| BackfillError::file_io(&backup_path, e))?;
    tracing::info!(backup = %backup_path.display(), "Backed up log");

    rotate_history(&history_dir, config)?;

    Ok(Some(backup_path))
}

/// Delete backups beyond `max_count` or older than `max_age_days`.
fn rotate_history(history_dir: &Path, config: &HistoryConfig) -> Result<usize> {
    let backups = list_backups(history_dir)?;
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(config.max_age_days));

    let mut deleted_count = 0;
    for (idx, entry) in backups.iter().enumerate() {
        if idx >= config.max_count || entry.timestamp < cutoff {
            fs::remove_file(&entry.path).map_err(|e| BackfillError::file_io(&entry.path, e))?;
            deleted_count += 1;
        }
    }

    if deleted_count > 0 {
        tracing::debug!("Pruned {} old backup(s)", deleted_count);
    }

    Ok(deleted_count)
}

/// List available backups sorted by date (newest first).
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_backups(history_dir: &Path) -> Result<Vec<BackupEntry>> {
    if !history_dir.exists() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();

    let io_err = |e| BackfillError::file_io(history_dir, e);
    for entry in fs::read_dir(history_dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        // <stem>.YYYYMMDD_HHMMSS.jsonl
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() < 3 || parts[parts.len() - 1] != "jsonl" {
            continue;
        }

        let Ok(dt) = NaiveDateTime::parse_from_str(parts[parts.len() - 2], BACKUP_TIMESTAMP_FORMAT)
        else {
            continue;
        };

        backups.push(BackupEntry {
            path,
            timestamp: Utc.from_utc_datetime(&dt),
        });
    }

    backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Ok(backups)
}

fn get_latest_backup(history_dir: &Path, stem: &str) -> Result<Option<BackupEntry>> {
    let prefix = format!("{stem}.");
    Ok(list_backups(history_dir)?.into_iter().find(|b| {
        b.path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&prefix))
    }))
}

fn file_digest(path: &Path) -> Result<Vec<u8>> {
    let io_err = |e| BackfillError::file_io(path, e);
    let mut reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}
