use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::{require_role, resource_or_404};
use crate::database::{ListParams, TenantRepository};
use crate::error::ApiError;
use crate::filter::{Page, Pagination};
use crate::handlers::{json_body, parse_id};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::resources::ResourceDef;
use crate::state::AppState;
use crate::tenant::TenantScope;

/// Query keys with a fixed meaning; anything else is a column filter
const RESERVED_PARAMS: [&str; 5] = ["page", "page_size", "search", "order", "client_id"];

/// Split list query parameters into paging, search, ordering and
/// column-equality filters.
pub fn list_params(
    query: &HashMap<String, String>,
    default_page_size: i64,
    max_page_size: i64,
) -> Result<ListParams, ApiError> {
    let number = |key: &str| -> Result<Option<i64>, ApiError> {
        query
            .get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| ApiError::field_error(key, "expected a whole number"))
            })
            .transpose()
    };
    let pagination = Pagination::new(number("page")?, number("page_size")?, default_page_size, max_page_size);

    let filters: Map<String, Value> = query
        .iter()
        .filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    Ok(ListParams {
        search: query.get("search").cloned().filter(|s| !s.trim().is_empty()),
        order: query.get("order").cloned().filter(|s| !s.trim().is_empty()),
        filters: (!filters.is_empty()).then_some(Value::Object(filters)),
        pagination: Some(pagination),
    })
}

fn scope(user: &AuthUser, resource: &ResourceDef, requested: Option<&str>) -> Result<TenantScope, ApiError> {
    TenantScope::resolve(user, resource.scope, requested)
}

/// Resources with a dedicated write route refuse the generic create and update
fn require_generic_writes(resource: &ResourceDef) -> Result<(), ApiError> {
    match resource.written_via {
        Some(route) => Err(ApiError::forbidden(format!(
            "{} records are written through {}",
            resource.label, route
        ))),
        None => Ok(()),
    }
}

fn repository(state: &AppState, resource: &'static ResourceDef) -> TenantRepository {
    TenantRepository::new(resource, state.db.pool().clone())
}

/// GET /api/:resource
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(resource): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Page<Value>> {
    let resource = resource_or_404(&resource)?;
    let scope = scope(&user, resource, query.get("client_id").map(String::as_str))?;
    let params = list_params(&query, state.config.api.default_page_size, state.config.api.max_page_size)?;

    let page = repository(&state, resource).list(&scope, params).await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/:resource
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(resource): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let resource = resource_or_404(&resource)?;
    require_generic_writes(resource)?;
    require_role(&user, resource.write_roles, &format!("create {}", resource.name))?;
    let body = json_body(payload)?;
    if !body.is_object() {
        return Err(ApiError::bad_request("Request body must be a JSON object"));
    }

    let requested = query
        .get("client_id")
        .map(String::as_str)
        .or_else(|| body.get("client_id").and_then(Value::as_str));
    let scope = scope(&user, resource, requested)?;
    scope.require_single()?;

    let record = repository(&state, resource).create(&scope, &body).await?;
    tracing::info!(
        client_id = ?scope.client_id(),
        user_id = %user.user_id,
        resource = resource.name,
        id = ?record.get("id"),
        "Record created"
    );
    Ok(ApiResponse::created(record))
}

/// GET /api/:resource/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Value> {
    let resource = resource_or_404(&resource)?;
    let id = parse_id(&id)?;
    let scope = scope(&user, resource, query.get("client_id").map(String::as_str))?;

    let record = repository(&state, resource).get(&scope, id).await?;
    Ok(ApiResponse::success(record))
}

/// PUT /api/:resource/:id - partial update of the supplied fields
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let resource = resource_or_404(&resource)?;
    require_generic_writes(resource)?;
    require_role(&user, resource.write_roles, &format!("update {}", resource.name))?;
    let id = parse_id(&id)?;
    let body = json_body(payload)?;
    if !body.is_object() {
        return Err(ApiError::bad_request("Request body must be a JSON object"));
    }
    let scope = scope(&user, resource, query.get("client_id").map(String::as_str))?;

    let record = repository(&state, resource).update(&scope, id, &body).await?;
    tracing::info!(client_id = ?scope.client_id(), user_id = %user.user_id, resource = resource.name, %id, "Record updated");
    Ok(ApiResponse::success(record))
}

/// DELETE /api/:resource/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((resource, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Value> {
    let resource = resource_or_404(&resource)?;
    require_role(&user, resource.delete_roles, &format!("delete {}", resource.name))?;
    let id = parse_id(&id)?;
    let scope = scope(&user, resource, query.get("client_id").map(String::as_str))?;

    let record = repository(&state, resource).delete(&scope, id).await?;
    tracing::info!(client_id = ?scope.client_id(), user_id = %user.user_id, resource = resource.name, %id, "Record deleted");
    Ok(ApiResponse::success(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn reserved_keys_are_not_filters() {
        let params = list_params(
            &query(&[("page", "2"), ("page_size", "10"), ("search", "dell"), ("client_id", "ACME"), ("status", "received")]),
            25,
            100,
        )
        .unwrap();
        assert_eq!(params.search.as_deref(), Some("dell"));
        assert_eq!(params.filters, Some(json!({"status": "received"})));
        let pagination = params.pagination.unwrap();
        assert_eq!((pagination.page, pagination.page_size), (2, 10));
    }

    #[test]
    fn page_size_is_capped() {
        let params = list_params(&query(&[("page_size", "5000")]), 25, 100).unwrap();
        assert_eq!(params.pagination.unwrap().page_size, 100);
        assert!(params.filters.is_none());
    }

    #[test]
    fn custody_rejects_generic_writes() {
        let err = require_generic_writes(&crate::resources::CHAIN_OF_CUSTODY).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert!(err.message().contains("/api/assets/:id/custody"));
        assert!(require_generic_writes(&crate::resources::ASSETS).is_ok());
    }

    #[test]
    fn non_numeric_page_is_a_field_error() {
        let err = list_params(&query(&[("page", "two")]), 25, 100).unwrap_err();
        assert_eq!(err.to_json()["field_errors"]["page"], "expected a whole number");
    }
}
