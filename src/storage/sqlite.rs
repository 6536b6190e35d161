//! `SQLite` store access.
//!
//! The store is opened read-only and held for exactly one run; dropping the
//! [`SqliteStore`] (or calling [`SqliteStore::close`]) releases the
//! connection on every path.

use crate::error::{BackfillError, Result};
use crate::model::{Comment, Dependency};
use crate::storage::schema::{self, CREATED_AT_FIELD};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, Row, ToSql};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SQLite has a finite variable limit (default 999). Chunk to stay under it.
const SQLITE_VAR_LIMIT: usize = 900;

/// One `issues` row restricted to the exportable columns.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRow {
    pub id: String,
    /// `(column, value)` pairs in store column order, `id` included.
    pub values: Vec<(String, SqlValue)>,
}

#[cfg(test)]
impl IssueRow {
    /// Value of one column, if selected.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

/// Read-only handle on a beads `SQLite` store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
    issue_columns: Vec<String>,
    queries: Cell<usize>,
}

impl SqliteStore {
    /// Open the store at `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the file is missing, cannot be opened, or
    /// has no `issues` table.
    pub fn open(path: &Path, lock_timeout_ms: Option<u64>) -> Result<Self> {
        if !path.is_file() {
            return Err(BackfillError::store_unavailable(path, "file not found"));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| BackfillError::store_unavailable(path, e))?;

        if let Some(timeout) = lock_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))
                .map_err(|e| BackfillError::store_unavailable(path, e))?;
        }

        tracing::debug!(path = %path.display(), "Opened store read-only");
        Self::with_connection(conn, path.to_path_buf())
    }

    /// Wrap an existing connection (e.g. an in-memory fixture).
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the connection has no `issues` table.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        Self::with_connection(conn, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        // The first real query is where "file is not a database" surfaces.
        let issue_columns = load_table_columns(&conn, "issues")
            .map_err(|e| BackfillError::store_unavailable(&path, e))?;
        if issue_columns.is_empty() {
            return Err(BackfillError::store_unavailable(&path, "no issues table"));
        }

        let unknown: Vec<&str> = issue_columns
            .iter()
            .map(String::as_str)
            .filter(|col| !schema::is_known_field(col))
            .collect();
        if !unknown.is_empty() {
            tracing::warn!(
                columns = ?unknown,
                "Store has issue columns this tool does not export"
            );
        }

        Ok(Self {
            conn,
            path,
            issue_columns,
            queries: Cell::new(0),
        })
    }

    /// Path the store was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of SQL statements prepared so far.
    #[must_use]
    pub fn queries_executed(&self) -> usize {
        self.queries.get()
    }

    /// Release the connection, surfacing any close error.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` fails to close the connection.
    pub fn close(self) -> Result<()> {
        let Self { conn, path, .. } = self;
        conn.close()
            .map_err(|(_, source)| BackfillError::StoreQuery { path, source })
    }

    fn query_error(&self, source: rusqlite::Error) -> BackfillError {
        BackfillError::StoreQuery {
            path: self.path.clone(),
            source,
        }
    }

    fn prepare(&self, sql: &str) -> Result<rusqlite::Statement<'_>> {
        self.queries.set(self.queries.get() + 1);
        tracing::trace!(sql, "prepare");
        self.conn.prepare(sql).map_err(|e| self.query_error(e))
    }

    /// All issue IDs ordered by creation time (ties broken by ID).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn issue_ids_by_created_at(&self) -> Result<Vec<String>> {
        let order = if self.issue_columns.iter().any(|c| c == CREATED_AT_FIELD) {
            "ORDER BY created_at, id"
        } else {
            "ORDER BY id"
        };
        let mut stmt = self.prepare(&format!("SELECT id FROM issues {order}"))?;
        stmt.query_map([], |row| row.get(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<String>>>())
            .map_err(|e| self.query_error(e))
    }

    /// Fetch exportable columns for the given issues, in the order of `ids`.
    ///
    /// IDs with no row (deleted since the gap was computed) are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn get_issue_rows(&self, ids: &[String]) -> Result<Vec<IssueRow>> {
        let columns = schema::select_columns(&self.issue_columns);
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut by_id = self.query_by_issue_ids(
            &format!("SELECT {column_list} FROM issues WHERE id IN ({{}})"),
            ids,
            |row| {
                let mut values = Vec::with_capacity(columns.len());
                for (idx, name) in columns.iter().enumerate() {
                    values.push((name.clone(), row.get::<_, SqlValue>(idx)?));
                }
                let id = match values.iter().find(|(name, _)| name == "id") {
                    Some((_, SqlValue::Text(id))) => id.clone(),
                    _ => String::new(),
                };
                Ok((id.clone(), IssueRow { id, values }))
            },
        )?;

        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            match by_id.remove(id).and_then(|mut found| found.pop()) {
                Some(row) => rows.push(row),
                None => tracing::warn!(id = %id, "Issue vanished from store; skipping"),
            }
        }
        Ok(rows)
    }

    /// Labels for the given issues, keyed by issue ID, sorted by label.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn labels_for_issues(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        self.query_by_issue_ids(
            "SELECT issue_id, label FROM labels WHERE issue_id IN ({}) ORDER BY issue_id, label",
            ids,
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
    }

    /// Outgoing dependencies for the given issues, keyed by issue ID.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn dependencies_for_issues(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<Dependency>>> {
        self.query_by_issue_ids(
            "SELECT issue_id, depends_on_id, type, created_at, created_by
             FROM dependencies
             WHERE issue_id IN ({})
             ORDER BY issue_id, depends_on_id",
            ids,
            |row| {
                let dep = Dependency {
                    issue_id: row.get(0)?,
                    depends_on_id: row.get(1)?,
                    dep_type: row.get(2)?,
                    created_at: row.get(3)?,
                    created_by: row.get(4)?,
                };
                Ok((dep.issue_id.clone(), dep))
            },
        )
    }

    /// Comments for the given issues, keyed by issue ID, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn comments_for_issues(&self, ids: &[String]) -> Result<HashMap<String, Vec<Comment>>> {
        self.query_by_issue_ids(
            "SELECT issue_id, id, author, text, created_at
             FROM comments
             WHERE issue_id IN ({})
             ORDER BY issue_id, created_at, id",
            ids,
            |row| {
                Ok((
                    row.get(0)?,
                    Comment {
                        id: row.get(1)?,
                        author: row.get(2)?,
                        text: row.get(3)?,
                        created_at: row.get(4)?,
                    },
                ))
            },
        )
    }

    /// Run `sql_template` (with `{}` standing in for the placeholder list) once
    /// per chunk of IDs and group the mapped rows by issue ID.
    fn query_by_issue_ids<T, F>(
        &self,
        sql_template: &str,
        ids: &[String],
        map_row: F,
    ) -> Result<HashMap<String, Vec<T>>>
    where
        F: Fn(&Row<'_>) -> rusqlite::Result<(String, T)>,
    {
        let mut map: HashMap<String, Vec<T>> = HashMap::new();
        if ids.is_empty() {
            return Ok(map);
        }

        for chunk in ids.chunks(SQLITE_VAR_LIMIT) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = sql_template.replace("{}", &placeholders);
            let params: Vec<&dyn ToSql> = chunk.iter().map(|s| s as &dyn ToSql).collect();

            let mut stmt = self.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), &map_row)
                .map_err(|e| self.query_error(e))?;
            for row in rows {
                let (issue_id, item) = row.map_err(|e| self.query_error(e))?;
                map.entry(issue_id).or_default().push(item);
            }
        }

        Ok(map)
    }
}

fn load_table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    stmt.query_map([table], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_fixture_schema;
    use tempfile::TempDir;

    fn fixture() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        apply_fixture_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO issues (id, title, created_at, updated_at, content_hash)
                 VALUES ('bd-b', 'B', '2026-01-02 00:00:00', '2026-01-02 00:00:00', 'h1');
             INSERT INTO issues (id, title, created_at, updated_at)
                 VALUES ('bd-a', 'A', '2026-01-01 00:00:00', '2026-01-01 00:00:00');
             INSERT INTO issues (id, title, created_at, updated_at)
                 VALUES ('bd-c', 'C', '2026-01-02 00:00:00', '2026-01-02 00:00:00');
             INSERT INTO labels VALUES ('bd-b', 'urgent'), ('bd-b', 'backend');
             INSERT INTO dependencies VALUES ('bd-b', 'bd-a', 'blocks', '2026-01-02 00:00:00', NULL);
             INSERT INTO comments (issue_id, author, text, created_at)
                 VALUES ('bd-c', 'bob', 'second', '2026-01-03 00:00:00'),
                        ('bd-c', 'amy', 'first', '2026-01-02 12:00:00');",
        )
        .unwrap();
        SqliteStore::from_connection(conn).unwrap()
    }

    #[test]
    fn test_open_missing_file_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let err = SqliteStore::open(&temp.path().join("beads.db"), None).unwrap_err();
        assert!(matches!(err, BackfillError::StoreUnavailable { .. }));
    }

    #[test]
    fn test_open_garbage_file_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("beads.db");
        std::fs::write(&path, b"this is definitely not sqlite, just some bytes....").unwrap();
        let err = SqliteStore::open(&path, Some(100)).unwrap_err();
        assert!(matches!(err, BackfillError::StoreUnavailable { .. }), "{err}");
    }

    #[test]
    fn test_open_without_issues_table_is_unavailable() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteStore::from_connection(conn).unwrap_err();
        assert!(err.to_string().contains("no issues table"));
    }

    #[test]
    fn test_ids_ordered_by_created_at_then_id() {
        let store = fixture();
        assert_eq!(
            store.issue_ids_by_created_at().unwrap(),
            vec!["bd-a", "bd-b", "bd-c"]
        );
    }

    #[test]
    fn test_issue_rows_skip_internal_columns() {
        let store = fixture();
        let rows = store
            .get_issue_rows(&["bd-b".to_string(), "bd-a".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "bd-b");
        assert_eq!(rows[1].id, "bd-a");
        assert!(rows[0].get("content_hash").is_none());
        assert!(rows[0].get("pinned").is_none());
        assert_eq!(
            rows[0].get("title"),
            Some(&SqlValue::Text("B".to_string()))
        );
        assert!(rows[0].get("metadata").is_some());
    }

    #[test]
    fn test_issue_rows_skip_vanished_ids() {
        let store = fixture();
        let rows = store
            .get_issue_rows(&["bd-zzz".to_string(), "bd-c".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "bd-c");
    }

    #[test]
    fn test_relations_are_batched() {
        let store = fixture();
        let ids = vec!["bd-a".to_string(), "bd-b".to_string(), "bd-c".to_string()];
        let before = store.queries_executed();

        let labels = store.labels_for_issues(&ids).unwrap();
        let deps = store.dependencies_for_issues(&ids).unwrap();
        let comments = store.comments_for_issues(&ids).unwrap();

        assert_eq!(store.queries_executed() - before, 3);
        assert_eq!(labels["bd-b"], vec!["backend", "urgent"]);
        assert!(!labels.contains_key("bd-a"));
        assert_eq!(deps["bd-b"].len(), 1);
        assert_eq!(deps["bd-b"][0].depends_on_id, "bd-a");
        assert_eq!(deps["bd-b"][0].created_by, None);
        let texts: Vec<&str> = comments["bd-c"].iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_relations_chunk_large_id_sets() {
        let store = fixture();
        let mut ids: Vec<String> = (0..2000).map(|i| format!("bd-x{i}")).collect();
        ids.push("bd-b".to_string());
        let before = store.queries_executed();

        let labels = store.labels_for_issues(&ids).unwrap();

        assert_eq!(store.queries_executed() - before, 3);
        assert_eq!(labels["bd-b"].len(), 2);
    }

    #[test]
    fn test_empty_id_set_runs_no_query() {
        let store = fixture();
        let before = store.queries_executed();
        assert!(store.comments_for_issues(&[]).unwrap().is_empty());
        assert_eq!(store.queries_executed(), before);
    }

    #[test]
    fn test_query_failure_names_store_path() {
        let conn = Connection::open_in_memory().unwrap();
        apply_fixture_schema(&conn).unwrap();
        conn.execute_batch("DROP TABLE labels;").unwrap();
        let store = SqliteStore::from_connection(conn).unwrap();

        let err = store.labels_for_issues(&["bd-a".to_string()]).unwrap_err();
        match err {
            BackfillError::StoreQuery { path, .. } => assert_eq!(path, PathBuf::from(":memory:")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_open_reads_file_store() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("beads.db");
        {
            let conn = Connection::open(&path).unwrap();
            apply_fixture_schema(&conn).unwrap();
            conn.execute(
                "INSERT INTO issues (id, title, created_at, updated_at) VALUES ('bd-1', 'x', '2026-01-01', '2026-01-01')",
                [],
            )
            .unwrap();
        }
        let store = SqliteStore::open(&path, Some(1000)).unwrap();
        assert_eq!(store.path(), path.as_path());
        assert_eq!(store.issue_ids_by_created_at().unwrap(), vec!["bd-1"]);
        store.close().unwrap();
    }
}
