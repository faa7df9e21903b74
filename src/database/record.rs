use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::filter::Row;

/// Columns stamped by the store layer and never taken from request bodies
const SYSTEM_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int,
    Bool,
    /// Array input stored as a comma-joined string
    List,
}

/// Explicit per-record-type allow-list of assignable columns
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    fields: &'static [(&'static str, FieldKind)],
}

/// Result of applying a request body to a field map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assigned {
    pub values: Row,
    /// Keys present in the body but not assignable, in body order
    pub ignored: Vec<String>,
}

impl FieldMap {
    pub const fn new(fields: &'static [(&'static str, FieldKind)]) -> Self {
        Self { fields }
    }

    pub fn kind(&self, key: &str) -> Option<FieldKind> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, kind)| *kind)
    }

    pub fn list_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|(_, kind)| *kind == FieldKind::List)
            .map(|(k, _)| *k)
    }

    /// Copy every allow-listed key of `input`, normalised to its column kind
    pub fn apply(&self, input: &Map<String, Value>) -> Assigned {
        let mut assigned = Assigned::default();
        for (key, value) in input {
            match self.kind(key) {
                Some(kind) if !SYSTEM_FIELDS.contains(&key.as_str()) => {
                    assigned.values.insert(key.clone(), normalise(kind, value));
                }
                _ => assigned.ignored.push(key.clone()),
            }
        }
        assigned
    }

    /// Like `apply`, but every allow-listed key missing from `input` is set
    /// to its empty value. Used by full (PUT) updates.
    pub fn apply_full(&self, input: &Map<String, Value>) -> Assigned {
        let mut assigned = self.apply(input);
        for (key, kind) in self.fields {
            if !assigned.values.contains_key(*key) {
                let empty = match kind {
                    FieldKind::Bool => Value::Bool(false),
                    _ => Value::Null,
                };
                assigned.values.insert(key.to_string(), empty);
            }
        }
        assigned
    }
}

pub fn normalise(kind: FieldKind, value: &Value) -> Value {
    match kind {
        FieldKind::Text => match value {
            Value::Null => Value::Null,
            Value::String(s) if s.trim().is_empty() => Value::Null,
            Value::String(s) => Value::String(s.trim().to_string()),
            other => Value::String(other.to_string()),
        },
        FieldKind::Int => match value {
            Value::Number(n) => n.as_i64().map(Value::from).unwrap_or(Value::Null),
            Value::String(s) => s.trim().parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            Value::Bool(b) => Value::from(*b as i64),
            _ => Value::Null,
        },
        FieldKind::Bool => Value::Bool(truthy(value)),
        FieldKind::List => join_list(value),
    }
}

/// `true`, `1`, `"1"`, `"true"`, `"on"` and `"yes"` are true
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes"),
        _ => false,
    }
}

/// Arrays become `"a,b,c"`; empty input becomes null
pub fn join_list(value: &Value) -> Value {
    let parts: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect(),
        _ => vec![],
    };
    if parts.is_empty() {
        Value::Null
    } else {
        Value::String(parts.join(","))
    }
}

/// Inverse of `join_list` for the named columns, in place
pub fn expand_lists<'a>(row: &mut Row, columns: impl IntoIterator<Item = &'a str>) {
    for column in columns {
        let expanded = match row.get(column) {
            Some(Value::String(s)) => Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            ),
            _ => Value::Array(vec![]),
        };
        row.insert(column.to_string(), expanded);
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC; sorts lexically in time order
pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Stamp `created_at`/`updated_at` on a new row
pub fn stamp_created(row: &mut Row) {
    let now = timestamp();
    row.insert("created_at".to_string(), Value::String(now.clone()));
    row.insert("updated_at".to_string(), Value::String(now));
}

pub fn stamp_updated(row: &mut Row) {
    row.insert("updated_at".to_string(), Value::String(timestamp()));
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Field-level differences between two versions of a row. Keys in `ignore`
/// and keys missing from `after` are skipped.
pub fn diff_rows(before: &Row, after: &Row, ignore: &[&str]) -> BTreeMap<String, FieldChange> {
    let mut changes = BTreeMap::new();
    for (key, new) in after {
        if ignore.contains(&key.as_str()) {
            continue;
        }
        let old = before.get(key).cloned().unwrap_or(Value::Null);
        if !same_value(&old, new) {
            changes.insert(key.clone(), FieldChange { old, new: new.clone() });
        }
    }
    changes
}

/// `5` and `"5"` are the same stored value
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::String(y)) | (Value::String(y), Value::Number(x)) => {
            y.trim().parse::<f64>().ok() == x.as_f64()
        }
        _ => a == b,
    }
}

pub fn get_i64(row: &Row, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn get_str<'a>(row: &'a Row, key: &str) -> &'a str {
    row.get(key).and_then(Value::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const AGENCY: FieldMap = FieldMap::new(&[
        ("organization_name", FieldKind::Text),
        ("billing_country", FieldKind::Text),
        ("user_id", FieldKind::Int),
        ("is_active", FieldKind::Bool),
        ("tags", FieldKind::List),
    ]);

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn reports_keys_outside_the_allow_list() {
        let assigned = AGENCY.apply(&obj(json!({
            "organization_name": " Acme ",
            "id": 99,
            "password": "x",
            "tags": ["a", "", "b"],
        })));
        assert_eq!(assigned.values.get("organization_name"), Some(&json!("Acme")));
        assert_eq!(assigned.values.get("tags"), Some(&json!("a,b")));
        assert!(!assigned.values.contains_key("id"));
        assert_eq!(assigned.ignored, vec!["id".to_string(), "password".to_string()]);
    }

    #[test]
    fn normalises_by_kind() {
        assert_eq!(normalise(FieldKind::Int, &json!("42")), json!(42));
        assert_eq!(normalise(FieldKind::Int, &json!("abc")), Value::Null);
        assert_eq!(normalise(FieldKind::Bool, &json!("on")), json!(true));
        assert_eq!(normalise(FieldKind::Text, &json!("  ")), Value::Null);
    }

    #[test]
    fn full_update_clears_missing_fields() {
        let assigned = AGENCY.apply_full(&obj(json!({"organization_name": "Acme"})));
        assert_eq!(assigned.values.get("billing_country"), Some(&Value::Null));
        assert_eq!(assigned.values.get("is_active"), Some(&json!(false)));
    }

    #[test]
    fn list_columns_round_trip() {
        let mut row = obj(json!({"cities": "Toronto, Vancouver", "other": null}));
        expand_lists(&mut row, ["cities", "other"]);
        assert_eq!(row["cities"], json!(["Toronto", "Vancouver"]));
        assert_eq!(row["other"], json!([]));
    }

    #[test]
    fn diff_skips_ignored_and_equal_values() {
        let before = obj(json!({"name": "A", "stage_id": 3, "updated_at": "x"}));
        let after = obj(json!({"name": "B", "stage_id": "3", "updated_at": "y"}));
        let changes = diff_rows(&before, &after, &["updated_at"]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes["name"], FieldChange { old: json!("A"), new: json!("B") });
    }
}
