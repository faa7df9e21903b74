use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;

use super::error::FilterError;
use super::types::Condition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Case-insensitive substring
    Text,
    /// Equality; numeric strings compare as numbers
    Exact,
    /// Equality on a text column, value kept verbatim
    ExactText,
    /// Comma-joined set column membership
    Set,
    /// Comma-separated request value, `column IN (...)`
    List,
    DateFrom,
    DateTo,
    /// `30+` means at least 30, anything else is an exact day count
    DaysAtStage,
}

#[derive(Debug, Clone, Copy)]
pub struct FilterField {
    pub key: &'static str,
    pub column: &'static str,
    pub kind: FilterKind,
}

pub const fn field(key: &'static str, column: &'static str, kind: FilterKind) -> FilterField {
    FilterField { key, column, kind }
}

/// The request keys a listing recognises. Keys not listed here are ignored.
#[derive(Debug, Clone, Copy)]
pub struct FilterSpec {
    pub fields: &'static [FilterField],
}

impl FilterSpec {
    pub const fn new(fields: &'static [FilterField]) -> Self {
        Self { fields }
    }

    pub fn parse(&self, params: &HashMap<String, String>) -> Result<Vec<Condition>, FilterError> {
        let mut conditions = Vec::new();
        for field in self.fields {
            let raw = match params.get(field.key).map(|v| v.trim()) {
                Some(v) if !v.is_empty() => v,
                _ => continue,
            };
            conditions.push(Self::condition_for(field, raw)?);
        }
        Ok(conditions)
    }

    fn condition_for(field: &FilterField, raw: &str) -> Result<Condition, FilterError> {
        let column = field.column.to_string();
        Ok(match field.kind {
            FilterKind::Text => Condition::Contains { column, needle: raw.to_string() },
            FilterKind::Exact => Condition::Eq { column, value: scalar(raw) },
            FilterKind::ExactText => Condition::Eq { column, value: Value::String(raw.to_string()) },
            FilterKind::Set => Condition::SetContains { column, value: raw.to_string() },
            FilterKind::List => Condition::In {
                column,
                values: raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(scalar).collect(),
            },
            FilterKind::DateFrom => Condition::DateFrom { column, date: parse_date(field.key, raw)? },
            FilterKind::DateTo => Condition::DateTo { column, date: parse_date(field.key, raw)? },
            FilterKind::DaysAtStage => {
                if raw == "30+" {
                    Condition::Gte { column, value: 30 }
                } else {
                    let days: i64 = raw.parse().map_err(|_| FilterError::InvalidValue {
                        field: field.key.to_string(),
                        message: "must be a whole number of days or 30+".to_string(),
                    })?;
                    Condition::Eq { column, value: Value::from(days) }
                }
            }
        })
    }
}

/// Numeric strings become JSON numbers so they compare against integer columns
pub fn scalar(raw: &str) -> Value {
    match raw.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(raw.to_string()),
    }
}

/// Accepts `YYYY-MM-DD` or any timestamp starting with one
fn parse_date(key: &str, raw: &str) -> Result<NaiveDate, FilterError> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(|_| FilterError::InvalidValue {
        field: key.to_string(),
        message: format!("'{}' is not a valid date", raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPEC: FilterSpec = FilterSpec::new(&[
        field("name", "name", FilterKind::Text),
        field("stages", "stage_id", FilterKind::Exact),
        field("users", "created_by", FilterKind::List),
        field("created_at_from", "created_at", FilterKind::DateFrom),
        field("tag", "tag_ids", FilterKind::Set),
        field("days_at_stage", "days_at_stage", FilterKind::DaysAtStage),
    ]);

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn ignores_unknown_and_empty_keys() {
        let conditions = SPEC.parse(&params(&[("bogus", "1"), ("name", "  ")])).unwrap();
        assert!(conditions.is_empty());
    }

    #[test]
    fn maps_request_keys_onto_columns() {
        let conditions = SPEC
            .parse(&params(&[("stages", "4"), ("users", "1, 2,x"), ("tag", "2")]))
            .unwrap();
        assert_eq!(
            conditions,
            vec![
                Condition::Eq { column: "stage_id".into(), value: json!(4) },
                Condition::In { column: "created_by".into(), values: vec![json!(1), json!(2), json!("x")] },
                Condition::SetContains { column: "tag_ids".into(), value: "2".into() },
            ]
        );
    }

    #[test]
    fn date_filters_use_the_date_portion() {
        let conditions = SPEC.parse(&params(&[("created_at_from", "2024-03-01 10:00:00")])).unwrap();
        assert_eq!(
            conditions,
            vec![Condition::DateFrom {
                column: "created_at".into(),
                date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
            }]
        );
        assert!(SPEC.parse(&params(&[("created_at_from", "March")])).is_err());
    }

    #[test]
    fn days_at_stage_open_ended_bucket() {
        let conditions = SPEC.parse(&params(&[("days_at_stage", "30+")])).unwrap();
        assert_eq!(conditions, vec![Condition::Gte { column: "days_at_stage".into(), value: 30 }]);
    }
}
