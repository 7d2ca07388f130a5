use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::middleware::ApiResponse;
use crate::state::AppState;

/// GET / - service description
pub async fn root() -> impl IntoResponse {
    ApiResponse::success(json!({
        "name": "ITAD API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-tenant IT asset disposition and reverse-logistics backend",
        "endpoints": {
            "health": "/health (public)",
            "auth": "/auth/register, /auth/login, /auth/confirm-email, /auth/resend-confirmation (public)",
            "session": "/api/auth/* (protected)",
            "data": "/api/:resource[/:id] (protected)",
            "find": "/api/find/:resource (protected)",
            "custody": "/api/assets/:id/custody (protected)",
            "files": "/api/files/:resource/:id[/:slot] (protected)",
            "dashboard": "/api/dashboard/* (protected)",
            "reports": "/api/reports/* (protected)",
            "admin": "/api/admin/* (Administrator)",
        },
        "resources": crate::resources::RESOURCES.iter().map(|r| r.name).collect::<Vec<_>>(),
    }))
}

/// GET /health - 200 when the database answers, 503 otherwise
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": true,
                    "message": "Database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": { "status": "degraded", "timestamp": now }
                })),
            )
        }
    }
}
