#![allow(dead_code)]

use beads_backfill::storage::schema::FIXTURE_SCHEMA_SQL;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use std::sync::Once;
use std::time::Instant;
use tempfile::TempDir;
use tracing::info;

pub mod cli;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        beads_backfill::logging::init_test_logging();
    });
}

pub struct TestLogGuard {
    name: String,
    start: Instant,
}

impl TestLogGuard {
    fn new(name: &str) -> Self {
        init_test_logging();
        info!("{name}: starting");
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for TestLogGuard {
    fn drop(&mut self) {
        info!(
            "{}: assertions passed (elapsed {:?})",
            self.name,
            self.start.elapsed()
        );
    }
}

pub fn test_log(name: &str) -> TestLogGuard {
    TestLogGuard::new(name)
}

/// A temp project with `.beads/beads.db` and `.beads/issues.jsonl`.
pub struct Workspace {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub beads_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_path: PathBuf,
}

impl Workspace {
    /// Create the directory layout and an empty store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let root = temp_dir.path().to_path_buf();
        let beads_dir = root.join(".beads");
        fs::create_dir_all(&beads_dir).expect("beads dir");
        let db_path = beads_dir.join("beads.db");
        let log_path = beads_dir.join("issues.jsonl");

        let conn = Connection::open(&db_path).expect("create db");
        conn.execute_batch(FIXTURE_SCHEMA_SQL).expect("schema");

        Self {
            temp_dir,
            root,
            beads_dir,
            db_path,
            log_path,
        }
    }

    /// Run SQL against the store.
    pub fn sql(&self, sql: &str) {
        let conn = Connection::open(&self.db_path).expect("open db");
        conn.execute_batch(sql).expect("fixture sql");
    }

    pub fn write_log(&self, contents: &str) {
        fs::write(&self.log_path, contents).expect("write log");
    }

    pub fn read_log(&self) -> String {
        fs::read_to_string(&self.log_path).expect("read log")
    }

    /// Parsed log lines, blank lines skipped.
    pub fn log_records(&self) -> Vec<serde_json::Value> {
        parse_lines(&self.read_log())
    }

    /// Store with A (no children), B (2 labels, 1 dep), C (3 comments).
    pub fn seed_scenario(&self) {
        self.sql(
            "INSERT INTO issues (id, title, created_at, updated_at) VALUES
                 ('bd-a', 'Alpha', '2026-02-10 08:00:00', '2026-02-10 08:00:00'),
                 ('bd-b', 'Bravo', '2026-02-10 09:00:00', '2026-02-10 09:00:00'),
                 ('bd-c', 'Charlie', '2026-02-10 10:00:00', '2026-02-10T10:00:00');
             INSERT INTO labels (issue_id, label) VALUES ('bd-b', 'backend'), ('bd-b', 'urgent');
             INSERT INTO dependencies (issue_id, depends_on_id, type, created_at, created_by)
                 VALUES ('bd-b', 'bd-a', 'blocks', '2026-02-10 09:00:00', 'alice');
             INSERT INTO comments (issue_id, author, text, created_at) VALUES
                 ('bd-c', 'alice', 'first', '2026-02-10 10:01:00'),
                 ('bd-c', 'bob', 'second', '2026-02-10 10:02:00'),
                 ('bd-c', 'carol', 'third', '2026-02-10 10:03:00');",
        );
    }
}

pub fn parse_lines(contents: &str) -> Vec<serde_json::Value> {
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect()
}
