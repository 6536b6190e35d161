//! Rebuild canonical log records for issues missing from the log.
//!
//! Child relations are fetched in one batched query each for the whole gap,
//! then joined onto each issue in memory.

use crate::error::Result;
use crate::model::{CanonicalRecord, METADATA_KEY};
use crate::normalize::normalize_value;
use crate::storage::schema::METADATA_FIELD;
use crate::storage::{IssueRow, SqliteStore};
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Number, Value};

/// Build one normalized record per ID in `gap`, preserving order.
///
/// # Errors
///
/// Returns an error if any store query fails; no records are returned then.
pub fn reconstruct_records(store: &SqliteStore, gap: &[String]) -> Result<Vec<CanonicalRecord>> {
    if gap.is_empty() {
        return Ok(Vec::new());
    }

    let rows = store.get_issue_rows(gap)?;
    let mut labels = store.labels_for_issues(gap)?;
    let mut dependencies = store.dependencies_for_issues(gap)?;
    let mut comments = store.comments_for_issues(gap)?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id.clone();
        let mut record = CanonicalRecord::assemble(
            &id,
            scalar_fields(row),
            labels.remove(&id).unwrap_or_default(),
            dependencies.remove(&id).unwrap_or_default(),
            comments.remove(&id).unwrap_or_default(),
        )?;

        for value in record.fields_mut().values_mut() {
            normalize_value(value);
        }
        records.push(record);
    }

    tracing::info!(
        requested = gap.len(),
        built = records.len(),
        "Reconstructed records"
    );
    Ok(records)
}

/// Turn a row into exported scalar fields plus parsed metadata.
fn scalar_fields(row: IssueRow) -> Map<String, Value> {
    let IssueRow { id, values } = row;
    let mut fields = Map::new();

    for (column, value) in values {
        if column == METADATA_FIELD {
            if let Some(metadata) = parse_metadata(&id, &value) {
                fields.insert(METADATA_KEY.to_string(), metadata);
            }
            continue;
        }
        if let Some(json) = scalar_to_json(value) {
            fields.insert(column, json);
        }
    }

    fields
}

/// Convert a scalar column, dropping empty values (NULL, "", "{}", 0).
#[must_use]
pub fn scalar_to_json(value: SqlValue) -> Option<Value> {
    match value {
        SqlValue::Null => None,
        SqlValue::Integer(0) => None,
        SqlValue::Integer(n) => Some(Value::from(n)),
        SqlValue::Real(f) if f == 0.0 => None,
        SqlValue::Real(f) => Number::from_f64(f).map(Value::Number),
        SqlValue::Text(s) if s.is_empty() || s == "{}" => None,
        SqlValue::Text(s) => Some(Value::String(s)),
        SqlValue::Blob(bytes) if bytes.is_empty() => None,
        SqlValue::Blob(bytes) => Some(Value::String(String::from_utf8_lossy(&bytes).into_owned())),
    }
}

/// Parse the metadata column. `None` means "omit the field".
///
/// Only an absent value, empty text and an empty object count as "no
/// metadata"; other JSON (including `null`, `0`, `false`, `[]`) passes
/// through.
/// Text that is not valid JSON is dropped for this record with a warning.
#[must_use]
pub fn parse_metadata(issue_id: &str, value: &SqlValue) -> Option<Value> {
    let parsed = match value {
        SqlValue::Null => return None,
        SqlValue::Text(text) => {
            if text.trim().is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(text) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(
                        id = issue_id,
                        error = %err,
                        "Metadata is not valid JSON; omitting it"
                    );
                    return None;
                }
            }
        }
        SqlValue::Integer(n) => Value::from(*n),
        SqlValue::Real(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        SqlValue::Blob(_) => {
            tracing::warn!(id = issue_id, "Metadata stored as a blob; omitting it");
            return None;
        }
    };

    match &parsed {
        Value::Object(map) if map.is_empty() => None,
        _ => Some(parsed),
    }
}
