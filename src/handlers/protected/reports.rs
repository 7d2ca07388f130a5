use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::require_role;
use crate::auth::Role;
use crate::database::models::ScheduledReport;
use crate::error::ApiError;
use crate::filter::{Page, Pagination};
use crate::handlers::{json_body, parse_id};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::reports::{self, DateRange, GeneratedReport, ReportKind};
use crate::services::report_service::{ReportRun, ScheduledReportInput, ScheduledReportUpdate};
use crate::services::ReportService;
use crate::state::AppState;
use crate::tenant::{ScopePolicy, TenantScope};

/// Roles that may define, change or trigger scheduled reports
const SCHEDULE_ROLES: &[Role] = &[Role::Administrator, Role::Manager];

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub client_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl ReportQuery {
    fn scope(&self, user: &AuthUser) -> Result<TenantScope, ApiError> {
        TenantScope::resolve(user, ScopePolicy::AdministratorSeesAll, self.client_id.as_deref())
    }
}

/// GET /api/reports/:kind
pub async fn generate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(kind): Path<String>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<GeneratedReport> {
    let kind: ReportKind = kind.parse().map_err(ApiError::not_found)?;
    let range = DateRange { from: query.from, to: query.to };
    if !range.is_valid() {
        return Err(ApiError::field_error("from", "must not be after 'to'"));
    }
    let scope = query.scope(&user)?;

    let report = reports::generate(state.db.pool(), kind, &scope, range).await?;
    Ok(ApiResponse::success(report))
}

/// GET /api/reports/scheduled
pub async fn scheduled_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Page<ScheduledReport>> {
    let scope = query.scope(&user)?;
    let pagination = Pagination::new(
        query.page,
        query.page_size,
        state.config.api.default_page_size,
        state.config.api.max_page_size,
    );
    let page = ReportService::new(state.db.pool()).list(&scope, pagination).await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/reports/scheduled
pub async fn scheduled_create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ReportQuery>,
    payload: Result<Json<ScheduledReportInput>, JsonRejection>,
) -> ApiResult<ScheduledReport> {
    require_role(&user, SCHEDULE_ROLES, "schedule reports")?;
    let input = json_body(payload)?;
    let scope = query.scope(&user)?;

    let report = ReportService::new(state.db.pool())
        .create(&scope, user.user_id, input, Utc::now())
        .await?;
    Ok(ApiResponse::created(report))
}

/// GET /api/reports/scheduled/due
pub async fn scheduled_due(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Vec<ScheduledReport>> {
    let scope = query.scope(&user)?;
    let due = ReportService::new(state.db.pool()).due(&scope, Utc::now()).await?;
    Ok(ApiResponse::success(due))
}

/// GET /api/reports/scheduled/:id
pub async fn scheduled_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<ScheduledReport> {
    let id = parse_id(&id)?;
    let scope = query.scope(&user)?;
    let report = ReportService::new(state.db.pool()).get(&scope, id).await?;
    Ok(ApiResponse::success(report))
}

/// PUT /api/reports/scheduled/:id
pub async fn scheduled_update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<ReportQuery>,
    payload: Result<Json<ScheduledReportUpdate>, JsonRejection>,
) -> ApiResult<ScheduledReport> {
    require_role(&user, SCHEDULE_ROLES, "change scheduled reports")?;
    let id = parse_id(&id)?;
    let update = json_body(payload)?;
    let scope = query.scope(&user)?;

    let report = ReportService::new(state.db.pool())
        .update(&scope, id, update, Utc::now())
        .await?;
    Ok(ApiResponse::success(report))
}

/// DELETE /api/reports/scheduled/:id
pub async fn scheduled_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<ApiResponse<()>, ApiError> {
    require_role(&user, SCHEDULE_ROLES, "delete scheduled reports")?;
    let id = parse_id(&id)?;
    let scope = query.scope(&user)?;

    ReportService::new(state.db.pool()).delete(&scope, id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/reports/scheduled/:id/run
pub async fn scheduled_run(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<ReportRun> {
    require_role(&user, SCHEDULE_ROLES, "run scheduled reports")?;
    let id = parse_id(&id)?;
    let scope = query.scope(&user)?;

    let run = ReportService::new(state.db.pool()).run(&scope, id, Utc::now()).await?;
    Ok(ApiResponse::success(run))
}
