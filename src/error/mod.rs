//! Error types and handling for `beads_backfill`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Store and log failures are global and abort the run before any write
//! - Duplicate identifiers get their own variant so callers can tell a
//!   concurrent writer (or an earlier partial run) apart from other failures
//! - Provides structured JSON output via [`StructuredError`]

mod structured;

pub use structured::{ErrorCode, StructuredError};

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `beads_backfill` operations.
#[derive(Error, Debug)]
pub enum BackfillError {
    // === Store Errors ===
    /// The relational store cannot be opened.
    #[error("Store unavailable at '{path}': {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    /// `SQLite` query error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A query against a specific store failed.
    #[error("Database error on '{path}': {source}")]
    StoreQuery {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    // === Log Errors ===
    /// A line in the existing JSONL log is not valid JSON.
    #[error("Unparseable log '{path}' at line {line}: {reason}")]
    LogUnparseable {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The log is required but does not exist.
    #[error("Log not found at '{path}'")]
    LogNotFound { path: PathBuf },

    /// Writing would introduce identifiers that already exist.
    #[error("{count} overlapping ID(s) would cause duplicates in '{path}' (e.g. {sample:?})")]
    DuplicateIdentifierDetected {
        count: usize,
        path: PathBuf,
        sample: Vec<String>,
    },

    // === Configuration Errors ===
    /// Configuration file or option error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No `.beads` directory could be found.
    #[error("Beads directory not found: pass --beads-dir or set BEADS_DIR")]
    NotInitialized,

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error on a known file (log, export target, backup).
    #[error("I/O error on '{path}': {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackfillError {
    /// Build a store-unavailable error from any displayable cause.
    #[must_use]
    pub fn store_unavailable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Attach the file path to an I/O error.
    #[must_use]
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run from a directory containing .beads/ or pass --beads-dir"),
            Self::StoreUnavailable { .. } => Some("Check that beads.db exists or pass --db"),
            Self::LogUnparseable { .. } => {
                Some("Repair or restore the log from .beads/.backfill_history before retrying")
            }
            Self::DuplicateIdentifierDetected { .. } => Some(
                "Another writer touched the log since the gap was computed; re-run to recompute the gap",
            ),
            Self::LogNotFound { .. } => Some("Check the log path or pass --beads-dir"),
            _ => None,
        }
    }
}

/// Result type using `BackfillError`.
pub type Result<T> = std::result::Result<T, BackfillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_duplicate() {
        let err = BackfillError::DuplicateIdentifierDetected {
            count: 2,
            path: PathBuf::from(".beads/issues.jsonl"),
            sample: vec!["bd-1".to_string(), "bd-2".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "2 overlapping ID(s) would cause duplicates in '.beads/issues.jsonl' (e.g. [\"bd-1\", \"bd-2\"])"
        );
    }

    #[test]
    fn test_error_display_unparseable() {
        let err = BackfillError::LogUnparseable {
            path: PathBuf::from("issues.jsonl"),
            line: 3,
            reason: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unparseable log 'issues.jsonl' at line 3: expected value"
        );
    }

    #[test]
    fn test_suggestion() {
        let err = BackfillError::DuplicateIdentifierDetected {
            count: 1,
            path: PathBuf::from("issues.jsonl"),
            sample: vec![],
        };
        assert!(err.suggestion().unwrap().contains("re-run"));
        assert_eq!(BackfillError::Config("x".into()).suggestion(), None);
    }

    #[test]
    fn test_file_io_names_path() {
        let err = BackfillError::file_io(
            ".beads/issues.jsonl",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "I/O error on '.beads/issues.jsonl': denied");
    }
}
