use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo, Pagination, SqlResult};
use crate::resources::ResourceDef;
use crate::tenant::TenantScope;

/// A validated query against one resource, bound to a tenant scope.
///
/// Rows come back as a single `record` JSONB column so the generic handlers
/// can return them without a struct per table.
pub struct Filter {
    resource: &'static ResourceDef,
    scope: TenantScope,
    select_columns: Vec<&'static str>,
    where_data: Option<Value>,
    search: Option<String>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Filter {
    pub fn new(resource: &'static ResourceDef, scope: TenantScope) -> Self {
        Self {
            resource,
            scope,
            select_columns: vec![],
            where_data: None,
            search: None,
            order_data: vec![],
            limit: None,
            offset: None,
        }
    }

    pub fn assign(&mut self, data: FilterData, max_limit: i64) -> Result<&mut Self, FilterError> {
        if let Some(select) = data.select {
            self.select(&select)?;
        }
        if let Some(where_clause) = data.where_clause {
            self.where_clause(where_clause)?;
        }
        if let Some(search) = data.search {
            self.search(search);
        }
        if let Some(order) = data.order {
            self.order(&order)?;
        }
        if let Some(limit) = data.limit {
            self.limit(limit, data.offset, max_limit)?;
        } else if let Some(offset) = data.offset {
            self.limit(max_limit, Some(offset), max_limit)?;
        }
        Ok(self)
    }

    pub fn select(&mut self, columns: &[String]) -> Result<&mut Self, FilterError> {
        let mut resolved = Vec::with_capacity(columns.len());
        for name in columns {
            if name == "*" {
                resolved.clear();
                break;
            }
            let column = self
                .resource
                .column(name)
                .ok_or_else(|| FilterError::InvalidColumn(name.clone()))?;
            resolved.push(column.name);
        }
        self.select_columns = resolved;
        Ok(self)
    }

    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    pub fn search(&mut self, term: impl Into<String>) -> &mut Self {
        let term = term.into();
        self.search = if term.trim().is_empty() { None } else { Some(term) };
        self
    }

    pub fn order(&mut self, order_spec: &Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(self.resource, order_spec)?;
        Ok(self)
    }

    pub fn order_str(&mut self, order_spec: &str) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::parse_order_string(self.resource, order_spec)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: i64, offset: Option<i64>, max_limit: i64) -> Result<&mut Self, FilterError> {
        if limit < 0 {
            return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string()));
        }
        if matches!(offset, Some(off) if off < 0) {
            return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string()));
        }
        if limit > max_limit {
            tracing::debug!("Limit {} exceeds max {}, capping", limit, max_limit);
        }
        self.limit = Some(limit.min(max_limit));
        self.offset = offset;
        Ok(self)
    }

    pub fn page(&mut self, pagination: Pagination) -> &mut Self {
        self.limit = Some(pagination.page_size);
        self.offset = Some(pagination.offset());
        self
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;

        let order_clause = if self.order_data.is_empty() {
            let default = FilterOrder::parse_order_string(self.resource, self.resource.default_order)?;
            FilterOrder::generate(&default)
        } else {
            FilterOrder::generate(&self.order_data)
        };

        let query = [
            format!("SELECT {} AS record", self.build_select_clause()),
            format!("FROM \"{}\" t", self.resource.table),
            format!("WHERE {}", where_result.query),
            order_clause,
            self.build_limit_clause(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Ok(SqlResult { query, params: where_result.params })
    }

    pub fn to_where_sql(&self) -> Result<SqlResult, FilterError> {
        let (query, params) =
            FilterWhere::generate(self.resource, &self.scope, self.where_data.as_ref(), self.search.as_deref())?;
        Ok(SqlResult { query, params })
    }

    /// Same predicate as [`Filter::to_sql`] without ordering or paging
    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let query = format!(
            "SELECT COUNT(*) AS count FROM \"{}\" WHERE {}",
            self.resource.table, where_result.query
        );
        Ok(SqlResult { query, params: where_result.params })
    }

    fn build_select_clause(&self) -> String {
        if self.select_columns.is_empty() {
            "to_jsonb(t)".to_string()
        } else {
            let pairs: Vec<String> = self
                .select_columns
                .iter()
                .map(|c| format!("'{}', t.\"{}\"", c, c))
                .collect();
            format!("jsonb_build_object({})", pairs.join(", "))
        }
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ASSETS, SHIPMENTS};
    use serde_json::json;

    #[test]
    fn default_order_and_paging() {
        let mut filter = Filter::new(&ASSETS, TenantScope::tenant("ACME"));
        filter.page(Pagination::new(Some(2), Some(10), 25, 500));
        let sql = filter.to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT to_jsonb(t) AS record FROM \"assets\" t WHERE \"client_id\" = $1 ORDER BY \"created_at\" DESC LIMIT 10 OFFSET 10"
        );
        assert_eq!(sql.params.len(), 1);
    }

    #[test]
    fn assign_applies_every_part() {
        let mut filter = Filter::new(&SHIPMENTS, TenantScope::All);
        let data: FilterData = serde_json::from_value(json!({
            "select": ["id", "shipment_number"],
            "where": {"status": "in_transit"},
            "order": "scheduled_date asc",
            "limit": 5000
        }))
        .unwrap();
        filter.assign(data, 500).unwrap();
        let sql = filter.to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT jsonb_build_object('id', t.\"id\", 'shipment_number', t.\"shipment_number\") AS record \
             FROM \"shipments\" t WHERE \"status\" = $1 ORDER BY \"scheduled_date\" ASC LIMIT 500"
        );
    }

    #[test]
    fn count_shares_the_predicate() {
        let mut filter = Filter::new(&ASSETS, TenantScope::tenant("ACME"));
        filter.search("dell");
        let count = filter.to_count_sql().unwrap();
        assert!(count.query.starts_with("SELECT COUNT(*) AS count FROM \"assets\" WHERE \"client_id\" = $1 AND ("));
        assert_eq!(count.params.len(), 2);
    }

    #[test]
    fn negative_limit_is_rejected() {
        let mut filter = Filter::new(&ASSETS, TenantScope::All);
        assert!(filter.limit(-1, None, 500).is_err());
        assert!(filter.limit(10, Some(-5), 500).is_err());
    }

    #[test]
    fn select_rejects_unknown_columns() {
        let mut filter = Filter::new(&ASSETS, TenantScope::All);
        assert!(filter.select(&["secret".to_string()]).is_err());
    }
}
