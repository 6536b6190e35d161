//! Read-only access to the beads `SQLite` store.

pub mod schema;
mod sqlite;

pub use sqlite::{IssueRow, SqliteStore};
