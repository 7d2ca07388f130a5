use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::IssuedToken;
use crate::handlers::json_body;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::AuthService;
use crate::session::session_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// GET /api/auth/whoami - answered from the token alone
pub async fn whoami(Extension(user): Extension<AuthUser>) -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "id": user.user_id,
        "email": user.email,
        "name": user.name,
        "client_id": user.client_id,
        "role": user.role,
        "is_admin": user.is_admin(),
        "password_expired": user.password_expired,
    })))
}

/// POST /api/auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> ApiResult<IssuedToken> {
    let request = json_body(payload)?;
    let token = AuthService::new(&state)
        .change_password(&user, &request.current_password, &request.new_password, Utc::now())
        .await?;
    Ok(ApiResponse::success(token))
}

/// POST /api/auth/refresh
pub async fn refresh(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<IssuedToken> {
    let token = AuthService::new(&state).refresh(&user, Utc::now()).await?;
    Ok(ApiResponse::success(token))
}

/// POST /api/auth/logout - ends the activity session; the token itself
/// stays valid until expiry but the next request starts a new session.
pub async fn logout(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Value> {
    state.sessions.end(&session_key(&user.client_id, user.user_id)).await?;
    tracing::info!(client_id = %user.client_id, user_id = %user.user_id, "User logged out");
    Ok(ApiResponse::success(json!({ "logged_out": true })))
}
