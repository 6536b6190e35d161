//! `beads_backfill`: recover issues that exist in the beads `SQLite` store but
//! never made it into the JSONL log.
//!
//! The pipeline reads the log's IDs, computes the store-only gap, rebuilds
//! full records (labels, dependencies, comments) for the gap, normalizes
//! timestamps, and writes them either to a separate file or appended to the
//! log behind a fresh duplicate check.

pub mod backfill;
pub mod cli;
pub mod config;
pub mod error;
pub mod gap;
pub mod history;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod output;
pub mod reconstruct;
pub mod storage;
pub mod writer;

pub use error::{BackfillError, ErrorCode, Result, StructuredError};
