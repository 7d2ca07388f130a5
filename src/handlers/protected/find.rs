use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::resource_or_404;
use crate::database::TenantRepository;
use crate::filter::FilterData;
use crate::handlers::json_body;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;
use crate::tenant::TenantScope;

#[derive(Debug, Deserialize)]
pub struct FindQuery {
    pub client_id: Option<String>,
}

/// POST /api/find/:resource - filtered find with `where`, `order`,
/// `select`, `limit` and `offset`
pub async fn find_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(resource): Path<String>,
    Query(query): Query<FindQuery>,
    payload: Result<Json<FilterData>, JsonRejection>,
) -> ApiResult<Vec<Value>> {
    let resource = resource_or_404(&resource)?;
    let filter_data = json_body(payload)?;
    let scope = TenantScope::resolve(&user, resource.scope, query.client_id.as_deref())?;

    let records = TenantRepository::new(resource, state.db.pool().clone())
        .find(&scope, filter_data, state.config.api.max_page_size)
        .await?;
    Ok(ApiResponse::success(records))
}
