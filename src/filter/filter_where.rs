use serde_json::Value;

use super::error::FilterError;
use super::types::Condition;

/// Compiles conditions into a Postgres WHERE fragment with `$n` placeholders.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    pub fn generate(conditions: &[Condition], starting_param_index: usize) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        let clause = filter_where.build_all(conditions, " AND ")?;
        Ok((clause, filter_where.param_values))
    }

    fn build_all(&mut self, conditions: &[Condition], joiner: &str) -> Result<String, FilterError> {
        if conditions.is_empty() {
            return Ok("1=1".to_string());
        }
        let mut parts = Vec::with_capacity(conditions.len());
        for condition in conditions {
            parts.push(self.build_condition(condition)?);
        }
        Ok(parts.join(joiner))
    }

    fn build_condition(&mut self, condition: &Condition) -> Result<String, FilterError> {
        match condition {
            Condition::Eq { column, value } => {
                let quoted = quote_column(column)?;
                match value {
                    Value::Null => Ok(format!("{} IS NULL", quoted)),
                    Value::String(_) => Ok(format!("{}::text = {}", quoted, self.param(value.clone()))),
                    _ => Ok(format!("{} = {}", quoted, self.param(value.clone()))),
                }
            }
            Condition::Ne { column, value } => {
                let quoted = quote_column(column)?;
                match value {
                    Value::Null => Ok(format!("{} IS NOT NULL", quoted)),
                    Value::String(_) => Ok(format!("{}::text <> {}", quoted, self.param(value.clone()))),
                    _ => Ok(format!("{} <> {}", quoted, self.param(value.clone()))),
                }
            }
            Condition::In { column, values } => {
                let quoted = quote_column(column)?;
                if values.is_empty() {
                    return Ok("1=0".to_string());
                }
                // Mixed or textual lists compare as text
                if values.iter().all(Value::is_number) {
                    let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                    Ok(format!("{} IN ({})", quoted, params.join(", ")))
                } else {
                    let params: Vec<String> = values
                        .iter()
                        .map(|v| self.param(Value::String(text_of(v))))
                        .collect();
                    Ok(format!("{}::text IN ({})", quoted, params.join(", ")))
                }
            }
            Condition::Contains { column, needle } => {
                let quoted = quote_column(column)?;
                let pattern = format!("%{}%", escape_like(needle));
                Ok(format!("{}::text ILIKE {}", quoted, self.param(Value::String(pattern))))
            }
            Condition::SetContains { column, value } => {
                let quoted = quote_column(column)?;
                let p = self.param(Value::String(value.trim().to_string()));
                Ok(format!(
                    "{} = ANY(string_to_array(replace(COALESCE({}::text, ''), ' ', ''), ','))",
                    p, quoted
                ))
            }
            Condition::DateFrom { column, date } => {
                let quoted = quote_column(column)?;
                let p = self.param(Value::String(date.to_string()));
                Ok(format!("{}::date >= {}::date", quoted, p))
            }
            Condition::DateTo { column, date } => {
                let quoted = quote_column(column)?;
                let p = self.param(Value::String(date.to_string()));
                Ok(format!("{}::date <= {}::date", quoted, p))
            }
            Condition::Gte { column, value } => {
                let quoted = quote_column(column)?;
                Ok(format!("{} >= {}", quoted, self.param(Value::from(*value))))
            }
            Condition::IsNull { column } => Ok(format!("{} IS NULL", quote_column(column)?)),
            Condition::NotNull { column } => Ok(format!("{} IS NOT NULL", quote_column(column)?)),
            Condition::AnyOf { conditions } => {
                if conditions.is_empty() {
                    return Ok("1=0".to_string());
                }
                let inner = self.build_all(conditions, " OR ")?;
                Ok(format!("({})", inner))
            }
            Condition::InSubquery { column, table, select, inner } => {
                let quoted = quote_column(column)?;
                let table = quote_table(table)?;
                let select = quote_column(select)?;
                let inner_sql = self.build_all(inner, " AND ")?;
                Ok(format!("{} IN (SELECT {} FROM {} WHERE {})", quoted, select, table, inner_sql))
            }
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn quote_column(name: &str) -> Result<String, FilterError> {
    if !is_valid_identifier(name) {
        return Err(FilterError::InvalidColumn(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}

pub fn quote_table(name: &str) -> Result<String, FilterError> {
    if !is_valid_identifier(name) {
        return Err(FilterError::InvalidTableName(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
