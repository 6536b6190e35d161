//! Core data types for the backfill pipeline.
//!
//! Child rows read from the store ([`Dependency`], [`Comment`]) are typed and
//! serialize straight into the log format. Issues themselves are kept as a
//! JSON object ([`CanonicalRecord`]) because the set of exported columns
//! depends on the store and on which values are empty.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding the issue identifier.
pub const ID_KEY: &str = "id";
/// Key holding the label list.
pub const LABELS_KEY: &str = "labels";
/// Key holding the dependency list.
pub const DEPENDENCIES_KEY: &str = "dependencies";
/// Key holding the comment list (present only when non-empty).
pub const COMMENTS_KEY: &str = "comments";
/// Key holding the parsed metadata blob.
pub const METADATA_KEY: &str = "metadata";

/// A dependency edge as written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub issue_id: String,
    pub depends_on_id: String,
    #[serde(rename = "type")]
    pub dep_type: String,
    pub created_at: String,
    pub created_by: Option<String>,
}

/// A comment as written to the log. The owning issue is implied by the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author: String,
    pub text: String,
    pub created_at: String,
}

/// A log-ready issue: exported scalar fields plus joined child relations.
///
/// Always carries a string `id`, a `labels` array and a `dependencies` array.
/// `comments` is present only when the issue has at least one comment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalRecord {
    fields: Map<String, Value>,
}

impl CanonicalRecord {
    /// Assemble a record from its parts.
    ///
    /// `scalars` must not contain the relation keys; any `id` in it is
    /// replaced by `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if a child row cannot be converted to JSON.
    pub fn assemble(
        id: &str,
        mut scalars: Map<String, Value>,
        labels: Vec<String>,
        dependencies: Vec<Dependency>,
        comments: Vec<Comment>,
    ) -> Result<Self> {
        scalars.insert(ID_KEY.to_string(), Value::String(id.to_string()));
        scalars.insert(LABELS_KEY.to_string(), serde_json::to_value(labels)?);
        scalars.insert(
            DEPENDENCIES_KEY.to_string(),
            serde_json::to_value(dependencies)?,
        );
        if comments.is_empty() {
            scalars.remove(COMMENTS_KEY);
        } else {
            scalars.insert(COMMENTS_KEY.to_string(), serde_json::to_value(comments)?);
        }
        Ok(Self { fields: scalars })
    }

    /// The issue identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.fields
            .get(ID_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Look up a top-level field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Number of entries under an array key (0 when absent).
    #[must_use]
    pub fn relation_len(&self, key: &str) -> usize {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Whether the record carries a `comments` key at all.
    #[must_use]
    pub fn has_comments(&self) -> bool {
        self.fields.contains_key(COMMENTS_KEY)
    }

    /// Mutable access for in-place rewriting (timestamp normalization).
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    /// Serialize to a single JSON line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        let line = serde_json::to_string(&self.fields)?;
        debug_assert!(!line.contains('\n'));
        Ok(line)
    }
}
