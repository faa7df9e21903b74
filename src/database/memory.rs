//! In-process store evaluating the same conditions the SQL compiler emits.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use super::store::{RecordStore, StoreError, StoreTx};
use crate::filter::{Condition, ListQuery, OrderBy, Row, SortDirection};

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    next_id: HashMap<String, i64>,
}

impl Tables {
    fn table(&self, name: &str) -> &[Row] {
        self.rows.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn select(&self, query: &ListQuery) -> Vec<Row> {
        let conditions = query.conditions();
        let mut rows: Vec<Row> = self
            .table(query.table())
            .iter()
            .filter(|row| conditions.iter().all(|c| self.matches(row, c)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_rows(a, b, query.order()));
        rows
    }

    fn page(&self, query: &ListQuery) -> Vec<Row> {
        let p = query.pagination();
        self.select(query)
            .into_iter()
            .skip(p.offset() as usize)
            .take(p.per_page as usize)
            .collect()
    }

    fn insert(&mut self, table: &str, mut row: Row) -> Row {
        let max_existing = self
            .table(table)
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        let id = match row.get("id").and_then(Value::as_i64) {
            Some(id) => id,
            None => {
                let next = self.next_id.entry(table.to_string()).or_insert(0);
                *next = (*next).max(max_existing) + 1;
                *next
            }
        };
        row.insert("id".to_string(), Value::from(id));
        self.rows.entry(table.to_string()).or_default().push(row.clone());
        row
    }

    fn update(&mut self, table: &str, id: i64, changes: Row) -> Option<Row> {
        let row = self
            .rows
            .get_mut(table)?
            .iter_mut()
            .find(|r| r.get("id").and_then(Value::as_i64) == Some(id))?;
        for (k, v) in changes {
            row.insert(k, v);
        }
        Some(row.clone())
    }

    fn delete_where(&mut self, table: &str, conditions: &[Condition]) -> u64 {
        let doomed: Vec<bool> = self
            .table(table)
            .iter()
            .map(|row| conditions.iter().all(|c| self.matches(row, c)))
            .collect();
        let Some(rows) = self.rows.get_mut(table) else {
            return 0;
        };
        let mut flags = doomed.into_iter();
        let before = rows.len();
        rows.retain(|_| !flags.next().unwrap_or(false));
        (before - rows.len()) as u64
    }

    fn matches(&self, row: &Row, condition: &Condition) -> bool {
        let field = |column: &str| row.get(column).unwrap_or(&Value::Null);
        match condition {
            Condition::Eq { column, value } => loose_eq(field(column), value),
            Condition::Ne { column, value } => !loose_eq(field(column), value),
            Condition::In { column, values } => values.iter().any(|v| loose_eq(field(column), v)),
            Condition::Contains { column, needle } => text(field(column))
                .map(|t| t.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            Condition::SetContains { column, value } => text(field(column))
                .map(|t| t.split(',').any(|part| part.trim() == value.trim()))
                .unwrap_or(false),
            Condition::DateFrom { column, date } => date_of(field(column)).map(|d| d >= *date).unwrap_or(false),
            Condition::DateTo { column, date } => date_of(field(column)).map(|d| d <= *date).unwrap_or(false),
            Condition::Gte { column, value } => number(field(column)).map(|n| n >= *value as f64).unwrap_or(false),
            Condition::IsNull { column } => field(column).is_null(),
            Condition::NotNull { column } => !field(column).is_null(),
            Condition::AnyOf { conditions } => conditions.iter().any(|c| self.matches(row, c)),
            Condition::InSubquery { column, table, select, inner } => {
                let target = field(column);
                self.table(table)
                    .iter()
                    .filter(|r| inner.iter().all(|c| self.matches(r, c)))
                    .filter_map(|r| r.get(select.as_str()))
                    .any(|v| loose_eq(target, v))
            }
        }
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn date_of(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?;
    NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok()
}

/// `12` equals `"12"`, the way the SQL engine coerces parameters
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => match (number(a), number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => text(a) == text(b),
        },
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => match (a, b) {
            (Value::Number(_), Value::Number(_)) => number(a)
                .partial_cmp(&number(b))
                .unwrap_or(Ordering::Equal),
            _ => text(a).cmp(&text(b)),
        },
    }
}

fn compare_rows(a: &Row, b: &Row, order: &[OrderBy]) -> Ordering {
    for o in order {
        let left = a.get(&o.column).unwrap_or(&Value::Null);
        let right = b.get(&o.column).unwrap_or(&Value::Null);
        let ord = match o.sort {
            SortDirection::Asc => compare_values(left, right),
            SortDirection::Desc => compare_values(right, left),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load fixture rows; rows without an `id` get the next one
    pub async fn seed(&self, table: &str, rows: Vec<Row>) {
        let mut tables = self.tables.write().await;
        for row in rows {
            tables.insert(table, row);
        }
    }

    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().await.table(table).to_vec()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(&self, query: &ListQuery) -> Result<Vec<Row>, StoreError> {
        Ok(self.tables.read().await.page(query))
    }

    async fn count(&self, query: &ListQuery) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        let conditions = query.conditions();
        Ok(tables
            .table(query.table())
            .iter()
            .filter(|row| conditions.iter().all(|c| tables.matches(row, c)))
            .count() as u64)
    }

    async fn all(&self, query: &ListQuery, cap: Option<u64>) -> Result<Vec<Row>, StoreError> {
        let rows = self.tables.read().await.select(query);
        Ok(match cap {
            Some(cap) => rows.into_iter().take(cap as usize).collect(),
            None => rows,
        })
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        Ok(self.tables.write().await.insert(table, row))
    }

    async fn update(&self, table: &str, id: i64, changes: Row) -> Result<Option<Row>, StoreError> {
        Ok(self.tables.write().await.update(table, id, changes))
    }

    async fn delete_where(&self, table: &str, conditions: Vec<Condition>) -> Result<u64, StoreError> {
        Ok(self.tables.write().await.delete_where(table, &conditions))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.tables.clone().write_owned().await;
        let staged = (*guard).clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }
}

/// Holds the write lock for its lifetime; writes go to a staged copy that
/// replaces the live tables on commit.
pub struct MemoryTx {
    guard: OwnedRwLockWriteGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn all(&mut self, query: &ListQuery) -> Result<Vec<Row>, StoreError> {
        Ok(self.staged.select(query))
    }

    async fn insert(&mut self, table: &str, row: Row) -> Result<Row, StoreError> {
        Ok(self.staged.insert(table, row))
    }

    async fn update(&mut self, table: &str, id: i64, changes: Row) -> Result<Option<Row>, StoreError> {
        Ok(self.staged.update(table, id, changes))
    }

    async fn delete_where(&mut self, table: &str, conditions: Vec<Condition>) -> Result<u64, StoreError> {
        Ok(self.staged.delete_where(table, &conditions))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
