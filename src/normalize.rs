//! Timestamp normalization to RFC3339 UTC.
//!
//! Two rewrites, applied in order to every string in a JSON tree:
//! 1. `YYYY-MM-DD HH:MM:SS[.f]` becomes `YYYY-MM-DDTHH:MM:SS[.f]`
//! 2. `YYYY-MM-DDTHH:MM:SS[.f]` with no zone gets a `Z` suffix
//!
//! Anything else, including values that already carry a zone, is left alone.
//! The transform is idempotent.

use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::LazyLock;

static SPACE_SEPARATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{4}-[0-9]{2}-[0-9]{2}) ([0-9]{2}:[0-9]{2}:[0-9]{2}(?:\.[0-9]+)?)$")
        .expect("valid timestamp regex")
});

static ZONELESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(?:\.[0-9]+)?$")
        .expect("valid timestamp regex")
});

/// Normalize a single string. Borrows when nothing changes.
#[must_use]
pub fn normalize_timestamp(input: &str) -> Cow<'_, str> {
    let mut value = Cow::Borrowed(input);

    if let Some(caps) = SPACE_SEPARATED.captures(input) {
        value = Cow::Owned(format!("{}T{}", &caps[1], &caps[2]));
    }

    if ZONELESS.is_match(&value) {
        value.to_mut().push('Z');
    }

    value
}

/// Normalize every string inside `value` in place.
///
/// Object keys are not touched. Returns `true` if anything changed.
pub fn normalize_value(value: &mut Value) -> bool {
    match value {
        Value::String(s) => match normalize_timestamp(s) {
            Cow::Borrowed(_) => false,
            Cow::Owned(fixed) => {
                *s = fixed;
                true
            }
        },
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| normalize_value(item) | changed),
        Value::Object(map) => map
            .values_mut()
            .fold(false, |changed, item| normalize_value(item) | changed),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}
