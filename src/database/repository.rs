use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::query_builder::{fetch_records, QueryBuilder};
use crate::database::value::SqlValue;
use crate::filter::{FilterData, Page, Pagination, SqlResult};
use crate::resources::{ColumnDef, ResourceDef, SYSTEM_COLUMNS};
use crate::tenant::TenantScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub search: Option<String>,
    pub order: Option<String>,
    pub filters: Option<Value>,
    pub pagination: Option<Pagination>,
}

/// CRUD over one catalogue resource. Every statement is built through
/// [`crate::filter::Filter`], so the tenant predicate is always applied.
#[derive(Clone)]
pub struct TenantRepository {
    resource: &'static ResourceDef,
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(resource: &'static ResourceDef, pool: PgPool) -> Self {
        Self { resource, pool }
    }

    pub async fn list(&self, scope: &TenantScope, params: ListParams) -> Result<Page<Value>, DatabaseError> {
        let pagination = params.pagination.unwrap_or(Pagination { page: 1, page_size: 25 });
        let mut builder = QueryBuilder::new(self.resource, scope.clone())
            .search(params.search)
            .order(params.order.as_deref())?;
        if let Some(filters) = params.filters {
            builder = builder.filter(FilterData { where_clause: Some(filters), ..Default::default() }, i64::MAX)?;
        }
        let builder = builder.page(pagination);

        let (items, total) = futures::try_join!(builder.select_all(&self.pool), builder.count(&self.pool))?;
        Ok(Page::new(items, total, pagination))
    }

    pub async fn find(&self, scope: &TenantScope, data: FilterData, max_limit: i64) -> Result<Vec<Value>, DatabaseError> {
        let data = FilterData { limit: data.limit.or(Some(max_limit)), ..data };
        QueryBuilder::new(self.resource, scope.clone())
            .filter(data, max_limit)?
            .select_all(&self.pool)
            .await
    }

    pub async fn get(&self, scope: &TenantScope, id: Uuid) -> Result<Value, DatabaseError> {
        QueryBuilder::new(self.resource, scope.clone())
            .where_id(id)?
            .select_optional(&self.pool)
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    pub async fn create(&self, scope: &TenantScope, body: &Value) -> Result<Value, DatabaseError> {
        let client_id = scope
            .client_id()
            .ok_or_else(|| field_error("client_id", "Specify the client this record belongs to"))?;
        let values = prepare_values(self.resource, body, WriteMode::Create)?;
        self.check_references(client_id, &values).await?;
        let sql = insert_sql(self.resource, client_id, values);
        one_record(fetch_records(&self.pool, sql).await?, || {
            DatabaseError::QueryError("insert returned no row".to_string())
        })
    }

    pub async fn update(&self, scope: &TenantScope, id: Uuid, body: &Value) -> Result<Value, DatabaseError> {
        let values = prepare_values(self.resource, body, WriteMode::Update)?;
        if values.iter().any(|(column, _)| column.references.is_some()) {
            let owner = match scope.client_id() {
                Some(client_id) => client_id.to_string(),
                None => self
                    .get(scope, id)
                    .await?
                    .get("client_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| self.not_found(id))?,
            };
            self.check_references(&owner, &values).await?;
        }
        self.update_columns(scope, id, values).await
    }

    /// Referenced ids must name rows of the same client. The composite
    /// foreign keys enforce this too; checking first yields field errors.
    async fn check_references(
        &self,
        client_id: &str,
        values: &[(&'static ColumnDef, SqlValue)],
    ) -> Result<(), DatabaseError> {
        let mut errors = HashMap::new();
        for (column, value) in values {
            let (Some(target), SqlValue::Uuid(Some(id))) = (column.references, value) else {
                continue;
            };
            let exists: bool = sqlx::query_scalar(&reference_sql(target))
                .bind(client_id)
                .bind(*id)
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                tracing::warn!(
                    client_id,
                    resource = self.resource.name,
                    column = column.name,
                    %id,
                    "Reference to a record outside the client"
                );
                errors.insert(column.name.to_string(), format!("{} not found", target.label));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DatabaseError::validation(errors))
        }
    }

    /// Write columns the generic update refuses, e.g. document paths
    pub async fn update_columns(
        &self,
        scope: &TenantScope,
        id: Uuid,
        values: Vec<(&'static ColumnDef, SqlValue)>,
    ) -> Result<Value, DatabaseError> {
        let predicate = QueryBuilder::new(self.resource, scope.clone())
            .where_id(id)?
            .into_filter()
            .to_where_sql()?;
        let sql = update_sql(self.resource, predicate, values);
        one_record(fetch_records(&self.pool, sql).await?, || self.not_found(id))
    }

    pub async fn delete(&self, scope: &TenantScope, id: Uuid) -> Result<Value, DatabaseError> {
        let predicate = QueryBuilder::new(self.resource, scope.clone())
            .where_id(id)?
            .into_filter()
            .to_where_sql()?;
        let sql = SqlResult {
            query: format!(
                "DELETE FROM \"{}\" AS t WHERE {} RETURNING to_jsonb(t) AS record",
                self.resource.table, predicate.query
            ),
            params: predicate.params,
        };
        let records = fetch_records(&self.pool, sql)
            .await
            .map_err(|e| e.on_delete(self.resource.label))?;
        one_record(records, || self.not_found(id))
    }

    fn not_found(&self, id: Uuid) -> DatabaseError {
        DatabaseError::NotFound(format!("{} {} not found", self.resource.label, id))
    }
}

fn one_record(records: Vec<Value>, missing: impl FnOnce() -> DatabaseError) -> Result<Value, DatabaseError> {
    records.into_iter().next().ok_or_else(missing)
}

fn field_error(field: &str, problem: &str) -> DatabaseError {
    let mut errors = HashMap::new();
    errors.insert(field.to_string(), problem.to_string());
    DatabaseError::validation(errors)
}

/// Validate a request body against the resource's columns and coerce each
/// value. System columns are ignored so fetched records can be sent back.
pub fn prepare_values(
    resource: &'static ResourceDef,
    body: &Value,
    mode: WriteMode,
) -> Result<Vec<(&'static ColumnDef, SqlValue)>, DatabaseError> {
    let empty = Map::new();
    let obj = match body {
        Value::Object(obj) => obj,
        Value::Null if mode == WriteMode::Create => &empty,
        _ => return Err(field_error("body", "Expected a JSON object")),
    };

    let mut errors = HashMap::new();
    let mut values = Vec::new();

    for (key, value) in obj {
        if SYSTEM_COLUMNS.iter().any(|c| c.name == key.as_str()) {
            continue;
        }
        let Some(column) = resource.columns.iter().find(|c| c.name == key.as_str()) else {
            errors.insert(key.clone(), "Unknown field".to_string());
            continue;
        };
        if !column.writable {
            errors.insert(key.clone(), "Managed by the file upload routes".to_string());
            continue;
        }
        if column.required && is_blank(value) {
            errors.insert(key.clone(), "Required".to_string());
            continue;
        }
        match SqlValue::coerce(column, value) {
            Ok(v) => values.push((column, v)),
            Err(message) => {
                errors.insert(key.clone(), message);
            }
        }
    }

    if mode == WriteMode::Create {
        for column in resource.columns.iter().filter(|c| c.required) {
            if !obj.contains_key(column.name) {
                errors.insert(column.name.to_string(), "Required".to_string());
            }
        }
    }

    if !errors.is_empty() {
        return Err(DatabaseError::validation(errors));
    }
    if mode == WriteMode::Update && values.is_empty() {
        return Err(field_error("body", "No updatable fields supplied"));
    }
    Ok(values)
}

fn reference_sql(target: &ResourceDef) -> String {
    format!(
        "SELECT EXISTS (SELECT 1 FROM \"{}\" WHERE \"client_id\" = $1 AND \"id\" = $2)",
        target.table
    )
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

pub fn insert_sql(resource: &ResourceDef, client_id: &str, values: Vec<(&'static ColumnDef, SqlValue)>) -> SqlResult {
    let mut columns = vec!["\"client_id\"".to_string()];
    let mut placeholders = vec!["$1".to_string()];
    let mut params = vec![SqlValue::text(client_id)];

    for (column, value) in values {
        params.push(value);
        columns.push(format!("\"{}\"", column.name));
        placeholders.push(format!("${}", params.len()));
    }

    SqlResult {
        query: format!(
            "INSERT INTO \"{}\" AS t ({}) VALUES ({}) RETURNING to_jsonb(t) AS record",
            resource.table,
            columns.join(", "),
            placeholders.join(", ")
        ),
        params,
    }
}

/// `predicate` params keep their numbers; SET params follow them
pub fn update_sql(resource: &ResourceDef, predicate: SqlResult, values: Vec<(&'static ColumnDef, SqlValue)>) -> SqlResult {
    let mut params = predicate.params;
    let mut assignments = Vec::with_capacity(values.len() + 1);
    for (column, value) in values {
        params.push(value);
        assignments.push(format!("\"{}\" = ${}", column.name, params.len()));
    }
    assignments.push("\"updated_at\" = now()".to_string());

    SqlResult {
        query: format!(
            "UPDATE \"{}\" AS t SET {} WHERE {} RETURNING to_jsonb(t) AS record",
            resource.table,
            assignments.join(", "),
            predicate.query
        ),
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ASSETS, REVERSE_REQUESTS};
    use serde_json::json;

    fn field_errors(err: DatabaseError) -> HashMap<String, String> {
        match err {
            DatabaseError::Validation { field_errors, .. } => field_errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn create_requires_required_columns() {
        let errors = field_errors(prepare_values(&ASSETS, &json!({"asset_tag": "A-1"}), WriteMode::Create).unwrap_err());
        assert_eq!(errors.get("category").map(String::as_str), Some("Required"));
        assert_eq!(errors.get("status").map(String::as_str), Some("Required"));
        assert!(!errors.contains_key("asset_tag"));
    }

    #[test]
    fn unknown_and_managed_fields_are_rejected() {
        let body = json!({"status": "x", "certificate_of_destruction_path": "/tmp/x", "owner": "me"});
        let errors = field_errors(prepare_values(&ASSETS, &body, WriteMode::Update).unwrap_err());
        assert!(errors.contains_key("certificate_of_destruction_path"));
        assert_eq!(errors.get("owner").map(String::as_str), Some("Unknown field"));
    }

    #[test]
    fn system_columns_are_ignored() {
        let body = json!({"id": "ignored", "client_id": "OTHER", "item_count": "3"});
        let values = prepare_values(&REVERSE_REQUESTS, &body, WriteMode::Update).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0.name, "item_count");
        assert_eq!(values[0].1, SqlValue::Integer(Some(3)));
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(prepare_values(&ASSETS, &json!({}), WriteMode::Update).is_err());
        assert!(prepare_values(&ASSETS, &json!([1, 2]), WriteMode::Update).is_err());
    }

    #[test]
    fn insert_always_sets_tenant_first() {
        let values = prepare_values(
            &ASSETS,
            &json!({"asset_tag": "A-1", "category": "laptop", "status": "received"}),
            WriteMode::Create,
        )
        .unwrap();
        let sql = insert_sql(&ASSETS, "ACME", values);
        assert!(sql.query.starts_with("INSERT INTO \"assets\" AS t (\"client_id\", "));
        assert!(sql.query.ends_with("RETURNING to_jsonb(t) AS record"));
        assert_eq!(sql.params[0], SqlValue::text("ACME"));
        assert_eq!(sql.params.len(), 4);
    }

    #[test]
    fn reference_lookup_is_tenant_bound() {
        let column = ASSETS.column("shipment_id").unwrap();
        let target = column.references.unwrap();
        assert_eq!(
            reference_sql(target),
            "SELECT EXISTS (SELECT 1 FROM \"shipments\" WHERE \"client_id\" = $1 AND \"id\" = $2)"
        );
    }

    #[test]
    fn reference_values_are_coerced_to_uuids() {
        let id = Uuid::new_v4();
        let values = prepare_values(&ASSETS, &json!({"shipment_id": id.to_string()}), WriteMode::Update).unwrap();
        assert!(values[0].0.references.is_some());
        assert_eq!(values[0].1, SqlValue::Uuid(Some(id)));

        let errors = field_errors(prepare_values(&ASSETS, &json!({"shipment_id": "S-1"}), WriteMode::Update).unwrap_err());
        assert!(errors.contains_key("shipment_id"));
    }

    #[test]
    fn update_numbers_set_params_after_predicate() {
        let predicate = SqlResult {
            query: "\"client_id\" = $1 AND \"id\" = $2".to_string(),
            params: vec![SqlValue::text("ACME"), SqlValue::Uuid(Some(Uuid::nil()))],
        };
        let values = prepare_values(&ASSETS, &json!({"status": "sanitized"}), WriteMode::Update).unwrap();
        let sql = update_sql(&ASSETS, predicate, values);
        assert_eq!(
            sql.query,
            "UPDATE \"assets\" AS t SET \"status\" = $3, \"updated_at\" = now() \
             WHERE \"client_id\" = $1 AND \"id\" = $2 RETURNING to_jsonb(t) AS record"
        );
        assert_eq!(sql.params.len(), 3);
    }
}
