use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::auth::Role;
use crate::database::models::User;
use crate::error::ApiError;
use crate::filter::{Page, Pagination};
use crate::handlers::{json_body, parse_id};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::UserService;
use crate::state::AppState;
use crate::tenant::TenantScope;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub client_id: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub is_active: bool,
}

fn users(state: &AppState) -> UserService<'_> {
    UserService::new(state.db.pool(), &state.hasher, &state.config.security)
}

/// GET /api/admin/users
pub async fn list(State(state): State<AppState>, Query(query): Query<UserListQuery>) -> ApiResult<Page<User>> {
    let scope = match query.client_id.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(client_id) => TenantScope::tenant(client_id.to_ascii_uppercase()),
        None => TenantScope::all(),
    };
    let pagination = Pagination::new(
        query.page,
        query.page_size,
        state.config.api.default_page_size,
        state.config.api.max_page_size,
    );
    let page = users(&state).list(&scope, query.search.as_deref(), pagination).await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/admin/users/:id/unlock
pub async fn unlock(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    let id = parse_id(&id)?;
    let user = users(&state).unlock(&TenantScope::all(), id).await?;
    tracing::info!(user_id = %user.id, by = %admin.user_id, "Lockout cleared by administrator");
    Ok(ApiResponse::success(user))
}

/// PUT /api/admin/users/:id/role
pub async fn set_role(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> ApiResult<User> {
    let id = parse_id(&id)?;
    let role: Role = json_body(payload)?
        .role
        .parse()
        .map_err(|e: String| ApiError::field_error("role", e))?;
    if id == admin.user_id && role != Role::Administrator {
        return Err(ApiError::conflict("Administrators cannot remove their own role"));
    }

    let user = users(&state).set_role(&TenantScope::all(), id, role).await?;
    Ok(ApiResponse::success(user))
}

/// PUT /api/admin/users/:id/active
pub async fn set_active(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<ActiveRequest>, JsonRejection>,
) -> ApiResult<User> {
    let id = parse_id(&id)?;
    let request = json_body(payload)?;
    if id == admin.user_id && !request.is_active {
        return Err(ApiError::conflict("Administrators cannot disable their own account"));
    }

    let user = users(&state).set_active(&TenantScope::all(), id, request.is_active).await?;
    tracing::info!(user_id = %user.id, is_active = user.is_active, by = %admin.user_id, "Account status changed");
    Ok(ApiResponse::success(user))
}
