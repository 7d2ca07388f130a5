use axum::{
    extract::{Query, State},
    Extension,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::reports::DateRange;
use crate::services::dashboard_service::{DashboardSummary, MonthlyIntake, VendorActivity};
use crate::services::DashboardService;
use crate::state::AppState;
use crate::tenant::{ScopePolicy, TenantScope};

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub client_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub months: Option<i32>,
}

impl DashboardQuery {
    fn scope(&self, user: &AuthUser) -> Result<TenantScope, ApiError> {
        TenantScope::resolve(user, ScopePolicy::AdministratorSeesAll, self.client_id.as_deref())
    }

    fn range(&self) -> Result<DateRange, ApiError> {
        let range = DateRange { from: self.from, to: self.to };
        if !range.is_valid() {
            return Err(ApiError::field_error("from", "must not be after 'to'"));
        }
        Ok(range)
    }
}

/// GET /api/dashboard/summary
pub async fn summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<DashboardSummary> {
    let scope = query.scope(&user)?;
    let summary = DashboardService::new(state.db.pool()).summary(&scope, query.range()?).await?;
    Ok(ApiResponse::success(summary))
}

/// GET /api/dashboard/intake?months=N
pub async fn intake(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Vec<MonthlyIntake>> {
    let scope = query.scope(&user)?;
    let months = query.months.unwrap_or(12);
    let rows = DashboardService::new(state.db.pool()).intake(&scope, months).await?;
    Ok(ApiResponse::success(rows))
}

/// GET /api/dashboard/vendors
pub async fn vendors(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Vec<VendorActivity>> {
    let scope = query.scope(&user)?;
    let rows = DashboardService::new(state.db.pool()).vendors(&scope).await?;
    Ok(ApiResponse::success(rows))
}
