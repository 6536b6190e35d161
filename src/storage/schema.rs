//! Known shape of the beads `SQLite` store.
//!
//! The store is external and read-only here. This module enumerates the
//! `issues` columns once and derives the exported field set from it, so no
//! per-record code decides which columns leave the store.

use rusqlite::{Connection, Result};

/// Every `issues` column this tool knows about, across beads schema versions.
pub const ISSUE_FIELDS: &[&str] = &[
    "id",
    "content_hash",
    "title",
    "description",
    "design",
    "acceptance_criteria",
    "notes",
    "status",
    "priority",
    "issue_type",
    "assignee",
    "owner",
    "estimated_minutes",
    "created_at",
    "created_by",
    "updated_at",
    "closed_at",
    "close_reason",
    "closed_by_session",
    "due_at",
    "defer_until",
    "external_ref",
    "spec_id",
    "source_system",
    "source_repo",
    "deleted_at",
    "deleted_by",
    "delete_reason",
    "original_type",
    "compaction_level",
    "compacted_at",
    "compacted_at_commit",
    "original_size",
    "sender",
    "ephemeral",
    "wisp_type",
    "pinned",
    "is_template",
    "crystallizes",
    "mol_type",
    "work_type",
    "quality_score",
    "await_type",
    "await_id",
    "timeout_ns",
    "waiters",
    "hook_bead",
    "role_bead",
    "agent_state",
    "last_activity",
    "role_type",
    "rig",
    "event_kind",
    "actor",
    "target",
    "payload",
    "metadata",
];

/// Store-internal bookkeeping that never leaves the store.
pub const INTERNAL_FIELDS: &[&str] = &[
    "content_hash",
    "compaction_level",
    "compacted_at",
    "compacted_at_commit",
    "original_size",
    "ephemeral",
    "pinned",
    "is_template",
    "crystallizes",
];

/// Column holding the JSON metadata blob; exported by its own rule.
pub const METADATA_FIELD: &str = "metadata";

/// Column used for deterministic export ordering.
pub const CREATED_AT_FIELD: &str = "created_at";

/// True if `column` is one of the known `issues` columns.
#[must_use]
pub fn is_known_field(column: &str) -> bool {
    ISSUE_FIELDS.contains(&column)
}

/// True if `column` is internal bookkeeping.
#[must_use]
pub fn is_internal_field(column: &str) -> bool {
    INTERNAL_FIELDS.contains(&column)
}

/// Scalar fields eligible for export: enumeration minus denylist minus metadata.
#[must_use]
pub fn exported_scalar_fields() -> Vec<&'static str> {
    ISSUE_FIELDS
        .iter()
        .copied()
        .filter(|field| !is_internal_field(field) && *field != METADATA_FIELD)
        .collect()
}

/// Build the column list to `SELECT` from a store's actual `issues` columns.
///
/// Keeps the store's column order. Internal and unknown columns are left out;
/// `metadata` is kept so the reconstructor can apply its own rule.
#[must_use]
pub fn select_columns(store_columns: &[String]) -> Vec<String> {
    let exported = exported_scalar_fields();
    store_columns
        .iter()
        .filter(|col| exported.contains(&col.as_str()) || col.as_str() == METADATA_FIELD)
        .cloned()
        .collect()
}

/// Schema of a beads store, used to build fixtures in tests and benchmarks.
///
/// Mirrors the columns a real store carries, internal ones included.
pub const FIXTURE_SCHEMA_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS issues (
        id TEXT PRIMARY KEY,
        content_hash TEXT,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        design TEXT NOT NULL DEFAULT '',
        acceptance_criteria TEXT NOT NULL DEFAULT '',
        notes TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'open',
        priority INTEGER NOT NULL DEFAULT 2,
        issue_type TEXT NOT NULL DEFAULT 'task',
        assignee TEXT,
        owner TEXT NOT NULL DEFAULT '',
        estimated_minutes INTEGER,
        created_at TEXT NOT NULL,
        created_by TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL,
        closed_at TEXT,
        close_reason TEXT NOT NULL DEFAULT '',
        external_ref TEXT,
        compaction_level INTEGER DEFAULT 0,
        compacted_at TEXT,
        compacted_at_commit TEXT,
        original_size INTEGER DEFAULT 0,
        ephemeral INTEGER DEFAULT 0,
        pinned INTEGER DEFAULT 0,
        is_template INTEGER DEFAULT 0,
        crystallizes INTEGER DEFAULT 0,
        metadata TEXT NOT NULL DEFAULT '{}'
    );
    CREATE INDEX IF NOT EXISTS idx_issues_created_at ON issues(created_at);

    CREATE TABLE IF NOT EXISTS dependencies (
        issue_id TEXT NOT NULL,
        depends_on_id TEXT NOT NULL,
        type TEXT NOT NULL DEFAULT 'blocks',
        created_at TEXT NOT NULL,
        created_by TEXT,
        PRIMARY KEY (issue_id, depends_on_id)
    );

    CREATE TABLE IF NOT EXISTS labels (
        issue_id TEXT NOT NULL,
        label TEXT NOT NULL,
        PRIMARY KEY (issue_id, label)
    );

    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id TEXT NOT NULL,
        author TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_comments_issue_id ON comments(issue_id);
";

/// Create the fixture schema on a writable connection.
///
/// # Errors
///
/// Returns an error if the SQL execution fails.
pub fn apply_fixture_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(FIXTURE_SCHEMA_SQL)
}
