use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::{Postgres, Row as _, Transaction};

use super::manager::DatabaseManager;
use super::store::{RecordStore, StoreError, StoreTx};
use crate::filter::filter_where::{quote_column, quote_table, FilterWhere};
use crate::filter::{Condition, ListQuery, Row, SqlResult};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

fn bind_param<'q>(q: PgQuery<'q>, v: &'q Value) -> PgQuery<'q> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(u) = n.as_u64() {
                // Postgres has no unsigned 64-bit type
                q.bind(u as i64)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => q.bind(v),
    }
}

fn build(sql: &SqlResult) -> PgQuery<'_> {
    let mut q = sqlx::query(&sql.query);
    for p in sql.params.iter() {
        q = bind_param(q, p);
    }
    q
}

fn decode_rows(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<Row>, StoreError> {
    rows.into_iter().map(decode_row).collect()
}

fn decode_row(row: sqlx::postgres::PgRow) -> Result<Row, StoreError> {
    match row.try_get::<Value, _>("row")? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Query(format!("expected a JSON object row, got {}", other))),
    }
}

/// Columns of `row` in a stable order, each validated
fn column_list(row: &Row) -> Result<(Vec<String>, String), StoreError> {
    let mut columns = Vec::with_capacity(row.len());
    for key in row.keys() {
        columns.push(quote_column(key)?);
    }
    let joined = columns.join(", ");
    Ok((columns, joined))
}

/// Values are cast to each column's type by `json_populate_record`, so text,
/// numbers and timestamps can all travel as one JSON parameter.
fn insert_sql(table: &str, row: &Row) -> Result<String, StoreError> {
    let t = quote_table(table)?;
    if row.is_empty() {
        return Ok(format!("INSERT INTO {t} DEFAULT VALUES RETURNING row_to_json({t}.*) AS row"));
    }
    let (_, cols) = column_list(row)?;
    Ok(format!(
        "INSERT INTO {t} ({cols}) SELECT {cols} FROM json_populate_record(NULL::{t}, $1::json) RETURNING row_to_json({t}.*) AS row"
    ))
}

fn update_sql(table: &str, changes: &Row) -> Result<String, StoreError> {
    let t = quote_table(table)?;
    let (_, cols) = column_list(changes)?;
    Ok(format!(
        "UPDATE {t} SET ({cols}) = (SELECT {cols} FROM json_populate_record(NULL::{t}, $1::json)) WHERE \"id\" = $2 RETURNING row_to_json({t}.*) AS row"
    ))
}

fn delete_sql(table: &str, conditions: &[Condition]) -> Result<SqlResult, StoreError> {
    let (clause, params) = FilterWhere::generate(conditions, 0)?;
    Ok(SqlResult {
        query: format!("DELETE FROM {} WHERE {}", quote_table(table)?, clause),
        params,
    })
}

#[async_trait]
impl RecordStore for PgStore {
    async fn fetch(&self, query: &ListQuery) -> Result<Vec<Row>, StoreError> {
        let sql = query.to_page_sql()?;
        decode_rows(build(&sql).fetch_all(&self.pool).await?)
    }

    async fn count(&self, query: &ListQuery) -> Result<u64, StoreError> {
        let sql = query.to_count_sql()?;
        let row = build(&sql).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn all(&self, query: &ListQuery, cap: Option<u64>) -> Result<Vec<Row>, StoreError> {
        let sql = query.to_all_sql(cap)?;
        decode_rows(build(&sql).fetch_all(&self.pool).await?)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let sql = insert_sql(table, &row)?;
        let payload = Value::Object(row);
        let result = sqlx::query(&sql).bind(&payload).fetch_one(&self.pool).await?;
        decode_row(result)
    }

    async fn update(&self, table: &str, id: i64, changes: Row) -> Result<Option<Row>, StoreError> {
        if changes.is_empty() {
            return self.find(table, id).await;
        }
        let sql = update_sql(table, &changes)?;
        let payload = Value::Object(changes);
        let result = sqlx::query(&sql)
            .bind(&payload)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        result.map(decode_row).transpose()
    }

    async fn delete_where(&self, table: &str, conditions: Vec<Condition>) -> Result<u64, StoreError> {
        let sql = delete_sql(table, &conditions)?;
        Ok(build(&sql).execute(&self.pool).await?.rows_affected())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        DatabaseManager::health_check(&self.pool).await
    }
}

/// Rolled back by sqlx when dropped uncommitted
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn all(&mut self, query: &ListQuery) -> Result<Vec<Row>, StoreError> {
        let sql = query.to_all_sql(None)?;
        decode_rows(build(&sql).fetch_all(&mut *self.tx).await?)
    }

    async fn insert(&mut self, table: &str, row: Row) -> Result<Row, StoreError> {
        let sql = insert_sql(table, &row)?;
        let payload = Value::Object(row);
        let result = sqlx::query(&sql).bind(&payload).fetch_one(&mut *self.tx).await?;
        decode_row(result)
    }

    async fn update(&mut self, table: &str, id: i64, changes: Row) -> Result<Option<Row>, StoreError> {
        if changes.is_empty() {
            return self.find(table, id).await;
        }
        let sql = update_sql(table, &changes)?;
        let payload = Value::Object(changes);
        let result = sqlx::query(&sql)
            .bind(&payload)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        result.map(decode_row).transpose()
    }

    async fn delete_where(&mut self, table: &str, conditions: Vec<Condition>) -> Result<u64, StoreError> {
        let sql = delete_sql(table, &conditions)?;
        Ok(build(&sql).execute(&mut *self.tx).await?.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_casts_through_the_table_row_type() {
        let row = json!({"name": "Acme", "created_by": 3}).as_object().cloned().unwrap();
        let sql = insert_sql("agencies", &row).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"agencies\" (\"created_by\", \"name\") SELECT \"created_by\", \"name\" FROM json_populate_record(NULL::\"agencies\", $1::json) RETURNING row_to_json(\"agencies\".*) AS row"
        );
    }

    #[test]
    fn update_rejects_bad_columns() {
        let row = json!({"name\"; --": 1}).as_object().cloned().unwrap();
        assert!(update_sql("agencies", &row).is_err());
    }

    #[test]
    fn delete_uses_the_filter_compiler() {
        let sql = delete_sql("deals", &[Condition::in_list("id", vec![json!(1), json!(2)])]).unwrap();
        assert_eq!(sql.query, "DELETE FROM \"deals\" WHERE \"id\" IN ($1, $2)");
    }
}
