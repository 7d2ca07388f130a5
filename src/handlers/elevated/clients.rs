use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::database::models::Client;
use crate::error::ApiError;
use crate::filter::{Page, Pagination};
use crate::handlers::json_body;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::client_service::{ClientUpdate, NewClient};
use crate::services::ClientService;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ClientListQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// GET /api/admin/clients
pub async fn list(State(state): State<AppState>, Query(query): Query<ClientListQuery>) -> ApiResult<Page<Client>> {
    let pagination = Pagination::new(
        query.page,
        query.page_size,
        state.config.api.default_page_size,
        state.config.api.max_page_size,
    );
    let page = ClientService::new(state.db.pool())
        .list(query.search.as_deref(), pagination)
        .await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/admin/clients
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<NewClient>, JsonRejection>,
) -> ApiResult<Client> {
    let client = ClientService::new(state.db.pool()).create(json_body(payload)?).await?;
    tracing::info!(client_id = %client.id, by = %user.user_id, "Client created by administrator");
    Ok(ApiResponse::created(client))
}

/// GET /api/admin/clients/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Client> {
    let client = ClientService::new(state.db.pool()).get(&id).await?;
    Ok(ApiResponse::success(client))
}

/// PUT /api/admin/clients/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ClientUpdate>, JsonRejection>,
) -> ApiResult<Client> {
    let client = ClientService::new(state.db.pool()).update(&id, json_body(payload)?).await?;
    Ok(ApiResponse::success(client))
}

/// DELETE /api/admin/clients/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    if id.trim().eq_ignore_ascii_case(&user.client_id) {
        return Err(ApiError::conflict("Administrators cannot delete their own client"));
    }
    ClientService::new(state.db.pool()).delete(&id).await?;
    Ok(ApiResponse::no_content())
}
