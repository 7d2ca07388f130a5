use serde_json::Value;
use sqlx::{Executor, PgPool, Postgres, Row};

use crate::database::manager::DatabaseError;
use crate::database::value::bind;
use crate::filter::{Filter, FilterData, Pagination, SqlResult};
use crate::resources::ResourceDef;
use crate::tenant::TenantScope;

/// Runs [`Filter`] queries that return one JSONB `record` column per row
pub struct QueryBuilder {
    filter: Filter,
}

impl QueryBuilder {
    pub fn new(resource: &'static ResourceDef, scope: TenantScope) -> Self {
        Self { filter: Filter::new(resource, scope) }
    }

    pub fn filter(mut self, filter_data: FilterData, max_limit: i64) -> Result<Self, DatabaseError> {
        self.filter.assign(filter_data, max_limit)?;
        Ok(self)
    }

    pub fn search(mut self, term: Option<String>) -> Self {
        if let Some(term) = term {
            self.filter.search(term);
        }
        self
    }

    pub fn order(mut self, order: Option<&str>) -> Result<Self, DatabaseError> {
        if let Some(order) = order.filter(|o| !o.trim().is_empty()) {
            self.filter.order_str(order)?;
        }
        Ok(self)
    }

    pub fn where_id(mut self, id: uuid::Uuid) -> Result<Self, DatabaseError> {
        self.filter.where_clause(serde_json::json!({ "id": id.to_string() }))?;
        Ok(self)
    }

    pub fn page(mut self, pagination: Pagination) -> Self {
        self.filter.page(pagination);
        self
    }

    pub fn into_filter(self) -> Filter {
        self.filter
    }

    pub async fn select_all(&self, pool: &PgPool) -> Result<Vec<Value>, DatabaseError> {
        fetch_records(pool, self.filter.to_sql()?).await
    }

    pub async fn select_optional(&self, pool: &PgPool) -> Result<Option<Value>, DatabaseError> {
        Ok(self.select_all(pool).await?.into_iter().next())
    }

    pub async fn count(&self, pool: &PgPool) -> Result<i64, DatabaseError> {
        let sql = self.filter.to_count_sql()?;
        let mut q = sqlx::query(&sql.query);
        for p in sql.params {
            q = bind(q, p);
        }
        let row = q.fetch_one(pool).await?;
        Ok(row.try_get::<i64, _>("count")?)
    }
}

/// Execute a statement whose rows carry a `record` JSONB column. Takes a
/// pool or a transaction.
pub async fn fetch_records<'c, E>(executor: E, sql: SqlResult) -> Result<Vec<Value>, DatabaseError>
where
    E: Executor<'c, Database = Postgres>,
{
    tracing::debug!(query = %sql.query, params = sql.params.len(), "Executing query");
    let mut q = sqlx::query(&sql.query);
    for p in sql.params {
        q = bind(q, p);
    }
    let rows = q.fetch_all(executor).await?;
    rows.iter()
        .map(|row| row.try_get::<Value, _>("record").map_err(DatabaseError::from))
        .collect()
}
