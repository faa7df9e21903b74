use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::Condition;

/// The row restriction attached to a listing. At most one per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScopePredicate {
    Unrestricted,
    Eq { column: String, value: i64 },
    /// An empty list matches nothing
    In { column: String, values: Vec<i64> },
    /// `column IN (SELECT id FROM users WHERE <of>)`
    Employees { column: String, of: Box<ScopePredicate> },
}

impl ScopePredicate {
    pub fn eq(column: impl Into<String>, value: i64) -> Self {
        ScopePredicate::Eq { column: column.into(), value }
    }

    pub fn in_list(column: impl Into<String>, values: Vec<i64>) -> Self {
        ScopePredicate::In { column: column.into(), values }
    }

    pub fn employees(column: impl Into<String>, of: ScopePredicate) -> Self {
        ScopePredicate::Employees { column: column.into(), of: Box::new(of) }
    }

    /// Matches no row at all
    pub fn nothing(column: impl Into<String>) -> Self {
        ScopePredicate::In { column: column.into(), values: vec![] }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, ScopePredicate::Unrestricted)
    }

    pub fn to_conditions(&self) -> Vec<Condition> {
        match self {
            ScopePredicate::Unrestricted => vec![],
            ScopePredicate::Eq { column, value } => vec![Condition::eq(column.as_str(), *value)],
            ScopePredicate::In { column, values } => vec![Condition::in_list(
                column.as_str(),
                values.iter().map(|v| Value::from(*v)).collect(),
            )],
            ScopePredicate::Employees { column, of } => vec![Condition::InSubquery {
                column: column.clone(),
                table: "users".to_string(),
                select: "id".to_string(),
                inner: of.to_conditions(),
            }],
        }
    }
}
