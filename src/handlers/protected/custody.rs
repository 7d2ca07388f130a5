use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::require_role;
use crate::handlers::{json_body, parse_id};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::resources::{ASSETS, CHAIN_OF_CUSTODY};
use crate::services::custody_service::CustodyTransfer;
use crate::services::CustodyService;
use crate::state::AppState;
use crate::tenant::TenantScope;

#[derive(Debug, Deserialize)]
pub struct CustodyQuery {
    pub client_id: Option<String>,
}

/// POST /api/assets/:id/custody
pub async fn record(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<CustodyQuery>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<CustodyTransfer> {
    require_role(&user, CHAIN_OF_CUSTODY.write_roles, "record custody events")?;
    let id = parse_id(&id)?;
    let body = json_body(payload)?;
    let scope = TenantScope::resolve(&user, ASSETS.scope, query.client_id.as_deref())?;

    let transfer = CustodyService::new(state.db.pool())
        .record_event(&scope, id, &body, Utc::now())
        .await?;
    Ok(ApiResponse::created(transfer))
}

/// GET /api/assets/:id/custody
pub async fn trail(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<CustodyQuery>,
) -> ApiResult<Vec<Value>> {
    let id = parse_id(&id)?;
    let scope = TenantScope::resolve(&user, ASSETS.scope, query.client_id.as_deref())?;

    let events = CustodyService::new(state.db.pool())
        .trail(&scope, id, state.config.api.max_page_size)
        .await?;
    Ok(ApiResponse::success(events))
}
