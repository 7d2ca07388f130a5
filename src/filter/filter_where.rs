use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};
use crate::database::value::SqlValue;
use crate::resources::{ColumnDef, ColumnKind, ResourceDef};
use crate::tenant::TenantScope;

/// Builds a WHERE clause against one resource. Every value becomes a typed
/// bind parameter; column names only ever come from the resource catalogue.
pub struct FilterWhere<'a> {
    resource: &'a ResourceDef,
    params: Vec<SqlValue>,
}

impl<'a> FilterWhere<'a> {
    pub fn new(resource: &'a ResourceDef) -> Self {
        Self { resource, params: vec![] }
    }

    /// Tenant predicate first, then the caller's conditions, then search
    pub fn generate(
        resource: &'a ResourceDef,
        scope: &TenantScope,
        where_data: Option<&Value>,
        search: Option<&str>,
    ) -> Result<(String, Vec<SqlValue>), FilterError> {
        let mut builder = Self::new(resource);
        let mut parts = vec![];

        if let Some(client_id) = scope.client_id() {
            let p = builder.param(SqlValue::text(client_id));
            parts.push(format!("\"client_id\" = {}", p));
        }
        if let Some(where_data) = where_data {
            let sql = builder.build(where_data)?;
            if sql != "1=1" {
                parts.push(sql);
            }
        }
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(sql) = builder.search(term) {
                parts.push(sql);
            }
        }

        let clause = if parts.is_empty() { "1=1".to_string() } else { parts.join(" AND ") };
        Ok((clause, builder.params))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn build(&mut self, where_data: &Value) -> Result<String, FilterError> {
        let obj = match where_data {
            Value::Null => return Ok("1=1".to_string()),
            Value::Object(obj) => obj,
            _ => return Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        };

        let mut parts = vec![];
        for (key, value) in obj {
            if key.starts_with('$') {
                parts.push(self.logical(key, value)?);
            } else {
                for condition in self.field_conditions(key, value)? {
                    parts.push(self.condition_sql(&condition)?);
                }
            }
        }
        Ok(if parts.is_empty() { "1=1".to_string() } else { parts.join(" AND ") })
    }

    fn logical(&mut self, op: &str, value: &Value) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires an array", op)))?;
                if arr.is_empty() {
                    return Ok(if op == "$and" { "1=1" } else { "1=0" }.to_string());
                }
                let mut sql_parts = Vec::with_capacity(arr.len());
                for v in arr {
                    sql_parts.push(format!("({})", self.build(v)?));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", sql_parts.join(joiner)))
            }
            "$not" => Ok(format!("NOT ({})", self.build(value)?)),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn field_conditions(&self, field: &str, value: &Value) -> Result<Vec<FilterWhereInfo>, FilterError> {
        let column = self
            .resource
            .column(field)
            .ok_or_else(|| FilterError::InvalidColumn(field.to_string()))?;

        match value {
            Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() => obj
                .iter()
                .map(|(op_key, op_val)| {
                    let operator =
                        FilterOp::parse(op_key).ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    Ok(FilterWhereInfo { column, operator, data: op_val.clone() })
                })
                .collect(),
            // Implicit equality: { field: value }
            _ => Ok(vec![FilterWhereInfo { column, operator: FilterOp::Eq, data: value.clone() }]),
        }
    }

    fn condition_sql(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let column = condition.column;
        let quoted = format!("\"{}\"", column.name);
        let data = &condition.data;

        Ok(match condition.operator {
            FilterOp::Eq if data.is_null() => format!("{} IS NULL", quoted),
            FilterOp::Ne if data.is_null() => format!("{} IS NOT NULL", quoted),
            FilterOp::Eq => format!("{} = {}", quoted, self.typed_param(column, data)?),
            FilterOp::Ne => format!("{} <> {}", quoted, self.typed_param(column, data)?),
            FilterOp::Gt => format!("{} > {}", quoted, self.typed_param(column, data)?),
            FilterOp::Gte => format!("{} >= {}", quoted, self.typed_param(column, data)?),
            FilterOp::Lt => format!("{} < {}", quoted, self.typed_param(column, data)?),
            FilterOp::Lte => format!("{} <= {}", quoted, self.typed_param(column, data)?),
            FilterOp::Like | FilterOp::ILike => {
                if column.kind != ColumnKind::Text {
                    return Err(FilterError::InvalidOperatorData(format!(
                        "pattern match requires a text column, {} is not",
                        column.name
                    )));
                }
                let keyword = if condition.operator == FilterOp::Like { "LIKE" } else { "ILIKE" };
                format!("{} {} {}", quoted, keyword, self.typed_param(column, data)?)
            }
            FilterOp::In | FilterOp::NIn => {
                let values = match data {
                    Value::Array(values) => values.as_slice(),
                    other => std::slice::from_ref(other),
                };
                let negate = condition.operator == FilterOp::NIn;
                if values.is_empty() {
                    return Ok(if negate { "1=1" } else { "1=0" }.to_string());
                }
                let mut placeholders = Vec::with_capacity(values.len());
                for v in values {
                    placeholders.push(self.typed_param(column, v)?);
                }
                let keyword = if negate { "NOT IN" } else { "IN" };
                format!("{} {} ({})", quoted, keyword, placeholders.join(", "))
            }
            FilterOp::Between => match data {
                Value::Array(values) if values.len() == 2 => {
                    let low = self.typed_param(column, &values[0])?;
                    let high = self.typed_param(column, &values[1])?;
                    format!("{} BETWEEN {} AND {}", quoted, low, high)
                }
                _ => {
                    return Err(FilterError::InvalidOperatorData(
                        "$between requires an array of exactly 2 values".to_string(),
                    ))
                }
            },
            FilterOp::Null => match data.as_bool() {
                Some(true) => format!("{} IS NULL", quoted),
                Some(false) => format!("{} IS NOT NULL", quoted),
                None => return Err(FilterError::InvalidOperatorData("$null requires true or false".to_string())),
            },
        })
    }

    /// `ILIKE` across the searchable columns, sharing one parameter
    fn search(&mut self, term: &str) -> Option<String> {
        let columns: Vec<&ColumnDef> = self.resource.searchable_columns().collect();
        if columns.is_empty() {
            return None;
        }
        let p = self.param(SqlValue::text(format!("%{}%", escape_like(term))));
        let ors: Vec<String> = columns.iter().map(|c| format!("\"{}\" ILIKE {}", c.name, p)).collect();
        Some(format!("({})", ors.join(" OR ")))
    }

    fn typed_param(&mut self, column: &ColumnDef, value: &Value) -> Result<String, FilterError> {
        let coerced = SqlValue::coerce(column, value).map_err(|message| FilterError::InvalidValue {
            field: column.name.to_string(),
            message,
        })?;
        Ok(self.param(coerced))
    }

    fn param(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }
}

/// Escape `LIKE` wildcards so a search term matches literally
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ASSETS, VENDORS};
    use serde_json::json;

    #[test]
    fn tenant_predicate_comes_first() {
        let scope = TenantScope::tenant("ACME");
        let (sql, params) =
            FilterWhere::generate(&ASSETS, &scope, Some(&json!({"status": "received"})), None).unwrap();
        assert_eq!(sql, "\"client_id\" = $1 AND \"status\" = $2");
        assert_eq!(params[0], SqlValue::text("ACME"));
        assert_eq!(params[1], SqlValue::text("received"));
    }

    #[test]
    fn all_scope_adds_no_tenant_predicate() {
        let (sql, params) = FilterWhere::generate(&ASSETS, &TenantScope::All, None, None).unwrap();
        assert_eq!(sql, "1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn client_cannot_override_tenant_through_where() {
        let scope = TenantScope::tenant("ACME");
        let (sql, params) =
            FilterWhere::generate(&ASSETS, &scope, Some(&json!({"client_id": "GLOBEX"})), None).unwrap();
        // Both predicates are ANDed so the other tenant's rows never match
        assert_eq!(sql, "\"client_id\" = $1 AND \"client_id\" = $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn operators_and_logical_groups() {
        let where_data = json!({
            "$or": [
                {"weight_kg": {"$gte": 10}},
                {"status": {"$in": ["received", "processing"]}}
            ],
            "disposition": {"$null": true}
        });
        let (sql, params) = FilterWhere::generate(&ASSETS, &TenantScope::All, Some(&where_data), None).unwrap();
        assert_eq!(
            sql,
            "((\"weight_kg\" >= $1) OR (\"status\" IN ($2, $3))) AND \"disposition\" IS NULL"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn search_ors_searchable_columns_with_escaped_term() {
        let (sql, params) = FilterWhere::generate(&VENDORS, &TenantScope::tenant("ACME"), None, Some("50%_off")).unwrap();
        assert!(sql.starts_with("\"client_id\" = $1 AND (\"name\" ILIKE $2 OR "));
        assert_eq!(params[1], SqlValue::text("%50\\%\\_off%"));
    }

    #[test]
    fn rejects_unknown_columns_and_operators() {
        let scope = TenantScope::All;
        assert!(matches!(
            FilterWhere::generate(&ASSETS, &scope, Some(&json!({"password_hash": "x"})), None),
            Err(FilterError::InvalidColumn(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&ASSETS, &scope, Some(&json!({"status": {"$regex": "x"}})), None),
            Err(FilterError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn coercion_failures_name_the_field() {
        let err = FilterWhere::generate(&ASSETS, &TenantScope::All, Some(&json!({"weight_kg": "heavy"})), None)
            .unwrap_err();
        match err {
            FilterError::InvalidValue { field, .. } => assert_eq!(field, "weight_kg"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pattern_match_requires_text_column() {
        assert!(FilterWhere::generate(&ASSETS, &TenantScope::All, Some(&json!({"weight_kg": {"$like": "1%"}})), None)
            .is_err());
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, _) =
            FilterWhere::generate(&ASSETS, &TenantScope::All, Some(&json!({"status": {"$in": []}})), None).unwrap();
        assert_eq!(sql, "1=0");
    }
}
