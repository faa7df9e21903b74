use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use thiserror::Error;

use crate::filter::{Condition, FilterError, ListQuery, Page, Pagination, Row};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Query error: {0}")]
    Query(String),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RowStream = BoxStream<'static, Result<Row, StoreError>>;

/// Row storage used by every handler. `PgStore` in production, `MemoryStore`
/// in tests and `serve --memory`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows of the query's current page
    async fn fetch(&self, query: &ListQuery) -> Result<Vec<Row>, StoreError>;

    async fn count(&self, query: &ListQuery) -> Result<u64, StoreError>;

    /// Every matching row in query order, optionally capped
    async fn all(&self, query: &ListQuery, cap: Option<u64>) -> Result<Vec<Row>, StoreError>;

    /// Inserts and returns the stored row, including its new `id`
    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;

    /// `None` when no row has that id
    async fn update(&self, table: &str, id: i64, changes: Row) -> Result<Option<Row>, StoreError>;

    async fn delete_where(&self, table: &str, conditions: Vec<Condition>) -> Result<u64, StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Liveness probe for `/health`
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn page(&self, query: &ListQuery) -> Result<Page<Row>, StoreError> {
        let total = self.count(query).await?;
        let pagination = query.pagination();
        let items = if pagination.offset() >= total {
            Vec::new()
        } else {
            self.fetch(query).await?
        };
        Ok(Page::new(items, total, pagination))
    }

    async fn find(&self, table: &str, id: i64) -> Result<Option<Row>, StoreError> {
        let query = ListQuery::new(table)?
            .base(Condition::eq("id", id))
            .paginate(Pagination::exact(1, 1));
        Ok(self.fetch(&query).await?.into_iter().next())
    }

    /// Whether another row already holds `value` in `column`
    async fn exists(
        &self,
        table: &str,
        column: &str,
        value: Value,
        except_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let mut query = ListQuery::new(table)?.base(Condition::eq(column, value));
        if let Some(id) = except_id {
            query = query.base(Condition::ne("id", id));
        }
        Ok(self.count(&query).await? > 0)
    }

    async fn delete(&self, table: &str, id: i64) -> Result<bool, StoreError> {
        Ok(self.delete_where(table, vec![Condition::eq("id", id)]).await? > 0)
    }
}

/// A unit of writes that lands together on `commit`. Dropping it without
/// committing discards every write.
#[async_trait]
pub trait StoreTx: Send {
    async fn all(&mut self, query: &ListQuery) -> Result<Vec<Row>, StoreError>;

    async fn insert(&mut self, table: &str, row: Row) -> Result<Row, StoreError>;

    async fn update(&mut self, table: &str, id: i64, changes: Row) -> Result<Option<Row>, StoreError>;

    async fn delete_where(&mut self, table: &str, conditions: Vec<Condition>) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn find(&mut self, table: &str, id: i64) -> Result<Option<Row>, StoreError> {
        let query = ListQuery::new(table)?.base(Condition::eq("id", id));
        Ok(self.all(&query).await?.into_iter().next())
    }
}

/// Streams every row of `query` in batches so exports never hold the full
/// result in memory.
pub fn stream_rows(store: Arc<dyn RecordStore>, query: ListQuery, batch: u64) -> RowStream {
    struct State {
        store: Arc<dyn RecordStore>,
        query: ListQuery,
        batch: u64,
        page: u64,
        buffer: VecDeque<Row>,
        exhausted: bool,
    }

    let state = State {
        store,
        query,
        batch: batch.max(1),
        page: 1,
        buffer: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(row) = state.buffer.pop_front() {
                return Some((Ok(row), state));
            }
            if state.exhausted {
                return None;
            }
            let query = state
                .query
                .clone()
                .paginate(Pagination::exact(state.batch, state.page));
            match state.store.fetch(&query).await {
                Ok(rows) => {
                    state.exhausted = (rows.len() as u64) < state.batch;
                    state.page += 1;
                    state.buffer.extend(rows);
                }
                Err(e) => {
                    state.exhausted = true;
                    return Some((Err(e), state));
                }
            }
        }
    })
    .boxed()
}
