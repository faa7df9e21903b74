use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A database row as a JSON object keyed by column name
pub type Row = serde_json::Map<String, Value>;

/// One filter fragment. A query is the conjunction of its conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Eq { column: String, value: Value },
    Ne { column: String, value: Value },
    In { column: String, values: Vec<Value> },
    /// Case-insensitive substring match
    Contains { column: String, needle: String },
    /// Membership in a comma-joined set column (`"2,20"` contains `2`, `"20,21"` does not)
    SetContains { column: String, value: String },
    /// Inclusive lower bound on the date portion of a timestamp column
    DateFrom { column: String, date: NaiveDate },
    /// Inclusive upper bound on the date portion of a timestamp column
    DateTo { column: String, date: NaiveDate },
    Gte { column: String, value: i64 },
    IsNull { column: String },
    NotNull { column: String },
    /// Disjunction, used for free-text search across columns
    AnyOf { conditions: Vec<Condition> },
    /// `column IN (SELECT select FROM table WHERE inner...)`
    InSubquery {
        column: String,
        table: String,
        select: String,
        inner: Vec<Condition>,
    },
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq { column: column.into(), value: value.into() }
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Ne { column: column.into(), value: value.into() }
    }

    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Condition::Contains { column: column.into(), needle: needle.into() }
    }

    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::In { column: column.into(), values }
    }

    /// Column names referenced by this condition (outer query only)
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Condition::Eq { column, .. }
            | Condition::Ne { column, .. }
            | Condition::In { column, .. }
            | Condition::Contains { column, .. }
            | Condition::SetContains { column, .. }
            | Condition::DateFrom { column, .. }
            | Condition::DateTo { column, .. }
            | Condition::Gte { column, .. }
            | Condition::IsNull { column }
            | Condition::NotNull { column }
            | Condition::InSubquery { column, .. } => vec![column.as_str()],
            Condition::AnyOf { conditions } => conditions.iter().flat_map(|c| c.columns()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub sort: SortDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self { column: column.into(), sort: SortDirection::Asc }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), sort: SortDirection::Desc }
    }
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Value>,
}
