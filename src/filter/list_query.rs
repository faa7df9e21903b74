use super::error::FilterError;
use super::filter_where::{quote_column, quote_table, FilterWhere};
use super::page::Pagination;
use super::types::{Condition, OrderBy, SqlResult};
use crate::scope::ScopePredicate;

/// A listing request: base predicate, visibility scope, business filters,
/// free-text search, sort and page. All parts are conjoined.
#[derive(Debug, Clone)]
pub struct ListQuery {
    table: String,
    base: Vec<Condition>,
    scope: ScopePredicate,
    filters: Vec<Condition>,
    search: Option<Condition>,
    order: Vec<OrderBy>,
    pagination: Pagination,
}

impl ListQuery {
    pub fn new(table: impl Into<String>) -> Result<Self, FilterError> {
        let table = table.into();
        quote_table(&table)?;
        Ok(Self {
            table,
            base: vec![],
            scope: ScopePredicate::Unrestricted,
            filters: vec![],
            search: None,
            order: vec![OrderBy::desc("id")],
            pagination: Pagination::exact(1, 1),
        })
    }

    pub fn base(mut self, condition: Condition) -> Self {
        self.base.push(condition);
        self
    }

    pub fn scope(mut self, scope: ScopePredicate) -> Self {
        self.scope = scope;
        self
    }

    pub fn filters(mut self, filters: Vec<Condition>) -> Self {
        self.filters.extend(filters);
        self
    }

    /// One free-text token OR-matched over `columns`. Blank terms are ignored.
    pub fn search(mut self, term: Option<&str>, columns: &[&str]) -> Self {
        self.search = match term.map(str::trim) {
            Some(t) if !t.is_empty() && !columns.is_empty() => Some(Condition::AnyOf {
                conditions: columns.iter().map(|c| Condition::contains(*c, t)).collect(),
            }),
            _ => None,
        };
        self
    }

    /// Replaces the default `id DESC` ordering
    pub fn order_by(mut self, order: Vec<OrderBy>) -> Self {
        self.order = order;
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn order(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn scope_predicate(&self) -> &ScopePredicate {
        &self.scope
    }

    /// Every condition the storage layer must satisfy
    pub fn conditions(&self) -> Vec<Condition> {
        let mut all = self.base.clone();
        all.extend(self.scope.to_conditions());
        all.extend(self.filters.iter().cloned());
        if let Some(search) = &self.search {
            all.push(search.clone());
        }
        all
    }

    pub fn to_where_sql(&self) -> Result<SqlResult, FilterError> {
        let (query, params) = FilterWhere::generate(&self.conditions(), 0)?;
        Ok(SqlResult { query, params })
    }

    /// Page query wrapped in `row_to_json` so rows come back as JSON objects
    pub fn to_page_sql(&self) -> Result<SqlResult, FilterError> {
        let limit = format!(
            "LIMIT {} OFFSET {}",
            self.pagination.per_page,
            self.pagination.offset()
        );
        self.select_sql(Some(limit))
    }

    /// Unpaginated query, optionally capped
    pub fn to_all_sql(&self, cap: Option<u64>) -> Result<SqlResult, FilterError> {
        self.select_sql(cap.map(|c| format!("LIMIT {}", c)))
    }

    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        Ok(SqlResult {
            query: format!(
                "SELECT COUNT(*) AS count FROM {} WHERE {}",
                quote_table(&self.table)?,
                where_result.query
            ),
            params: where_result.params,
        })
    }

    fn select_sql(&self, limit: Option<String>) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let order = self.order_clause()?;
        let inner = [
            format!("SELECT * FROM {}", quote_table(&self.table)?),
            format!("WHERE {}", where_result.query),
            order,
            limit.unwrap_or_default(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Ok(SqlResult {
            query: format!("SELECT row_to_json(t) AS row FROM ({}) t", inner),
            params: where_result.params,
        })
    }

    fn order_clause(&self) -> Result<String, FilterError> {
        if self.order.is_empty() {
            return Ok(String::new());
        }
        let mut parts = Vec::with_capacity(self.order.len());
        for o in &self.order {
            parts.push(format!("{} {}", quote_column(&o.column)?, o.sort.to_sql()));
        }
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}
