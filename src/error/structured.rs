//! Structured error output.
//!
//! Provides machine-parseable error information with:
//! - Error codes for categorization
//! - Hints for self-correction
//! - Retryability flags
//! - Context (paths, counts) for diagnosis without re-running verbosely

use crate::error::BackfillError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Machine-readable error codes.
///
/// These codes are stable and can be used for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === Store Errors (exit code 2) ===
    /// Store file missing or cannot be opened
    StoreUnavailable,
    /// Store query failed
    DatabaseError,

    // === Log Errors (exit code 6) ===
    /// A log line is not valid JSON
    LogUnparseable,
    /// Log file missing where one is required
    LogNotFound,
    /// Write would duplicate identifiers already in the log
    DuplicateIdentifier,

    // === Config Errors (exit code 7) ===
    /// Configuration error
    ConfigError,
    /// No `.beads` directory found
    NotInitialized,

    // === I/O Errors (exit code 8) ===
    /// File I/O error
    IoError,
    /// JSON serialization error
    JsonError,
    /// YAML parsing error
    YamlError,

    // === Internal Errors (exit code 1) ===
    /// Unexpected internal error
    InternalError,
}

impl ErrorCode {
    /// Get the string representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::LogUnparseable => "LOG_UNPARSEABLE",
            Self::LogNotFound => "LOG_NOT_FOUND",
            Self::DuplicateIdentifier => "DUPLICATE_IDENTIFIER",
            Self::ConfigError => "CONFIG_ERROR",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// A duplicate-identifier failure means another writer raced us; a fresh
    /// run recomputes the gap and usually succeeds.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DuplicateIdentifier | Self::DatabaseError)
    }

    /// Get the exit code for this error category.
    ///
    /// - 1: Internal/unknown errors
    /// - 2: Store errors
    /// - 6: Log errors
    /// - 7: Config errors
    /// - 8: I/O errors
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::StoreUnavailable | Self::DatabaseError => 2,
            Self::LogUnparseable | Self::LogNotFound | Self::DuplicateIdentifier => 6,
            Self::ConfigError | Self::NotInitialized => 7,
            Self::IoError | Self::JsonError | Self::YamlError => 8,
            Self::InternalError => 1,
        }
    }
}

/// Structured error for machine-parseable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional hint for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether the operation can be retried
    pub retryable: bool,
    /// Additional context data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StructuredError {
    /// Create a new structured error from a `BackfillError`.
    #[must_use]
    pub fn from_error(err: &BackfillError) -> Self {
        let (code, context) = Self::extract_code_and_context(err);
        let hint = Self::generate_hint(err);

        Self {
            code,
            message: err.to_string(),
            hint,
            retryable: code.is_retryable(),
            context,
        }
    }

    /// Serialize to JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
                "context": self.context,
            }
        })
    }

    /// Format for human-readable output.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let mut output = String::new();

        if color {
            output.push_str("\x1b[31mError:\x1b[0m ");
        } else {
            output.push_str("Error: ");
        }

        output.push_str(&self.message);

        if let Some(hint) = &self.hint {
            output.push('\n');
            if color {
                output.push_str("\x1b[33mHint:\x1b[0m ");
            } else {
                output.push_str("Hint: ");
            }
            output.push_str(hint);
        }

        output
    }

    fn extract_code_and_context(err: &BackfillError) -> (ErrorCode, Option<Value>) {
        match err {
            BackfillError::StoreUnavailable { path, reason } => (
                ErrorCode::StoreUnavailable,
                Some(json!({"path": path.display().to_string(), "reason": reason})),
            ),
            BackfillError::Database(_) => (ErrorCode::DatabaseError, None),
            BackfillError::StoreQuery { path, source } => (
                ErrorCode::DatabaseError,
                Some(json!({"path": path.display().to_string(), "reason": source.to_string()})),
            ),
            BackfillError::LogUnparseable { path, line, reason } => (
                ErrorCode::LogUnparseable,
                Some(json!({
                    "path": path.display().to_string(),
                    "line": line,
                    "reason": reason,
                })),
            ),
            BackfillError::LogNotFound { path } => (
                ErrorCode::LogNotFound,
                Some(json!({"path": path.display().to_string()})),
            ),
            BackfillError::DuplicateIdentifierDetected {
                count,
                path,
                sample,
            } => (
                ErrorCode::DuplicateIdentifier,
                Some(json!({
                    "path": path.display().to_string(),
                    "overlap_count": count,
                    "sample_ids": sample,
                })),
            ),
            BackfillError::Config(_) => (ErrorCode::ConfigError, None),
            BackfillError::NotInitialized => (ErrorCode::NotInitialized, None),
            BackfillError::Io(_) => (ErrorCode::IoError, None),
            BackfillError::FileIo { path, source } => (
                ErrorCode::IoError,
                Some(json!({
                    "path": path.display().to_string(),
                    "kind": format!("{:?}", source.kind()),
                    "reason": source.to_string(),
                })),
            ),
            BackfillError::Json(_) => (ErrorCode::JsonError, None),
            BackfillError::Yaml(_) => (ErrorCode::YamlError, None),
            BackfillError::Other(_) => (ErrorCode::InternalError, None),
        }
    }

    fn generate_hint(err: &BackfillError) -> Option<String> {
        if let Some(suggestion) = err.suggestion() {
            return Some(suggestion.to_string());
        }

        match err {
            BackfillError::Yaml(_) => Some("Check .beads/config.yaml for syntax errors.".to_string()),
            _ => None,
        }
    }
}
