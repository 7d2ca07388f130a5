use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::handlers::json_body;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::auth_service::{LoginOutcome, RegisterRequest};
use crate::services::AuthService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailRequest {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: crate::database::models::User,
    pub email_confirmation_required: bool,
    /// Only returned outside production; there is no mail delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_token: Option<String>,
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<RegisterResponse> {
    let request = json_body(payload)?;
    let registration = AuthService::new(&state).register(request, Utc::now()).await?;

    Ok(ApiResponse::created(RegisterResponse {
        email_confirmation_required: registration.confirmation_token.is_some(),
        confirmation_token: registration
            .confirmation_token
            .filter(|_| state.config.is_development()),
        user: registration.user,
    }))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<LoginOutcome> {
    let request = json_body(payload)?;
    let outcome = AuthService::new(&state)
        .login(&request.email, &request.password, Utc::now())
        .await?;
    Ok(ApiResponse::success(outcome))
}

/// POST /auth/confirm-email
pub async fn confirm_email(
    State(state): State<AppState>,
    payload: Result<Json<ConfirmEmailRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = json_body(payload)?;
    AuthService::new(&state)
        .confirm_email(&request.email, &request.token, Utc::now())
        .await?;
    Ok(ApiResponse::success(json!({ "confirmed": true })))
}

/// POST /auth/resend-confirmation. Always answers the same way so the
/// response does not reveal whether the address exists.
pub async fn resend_confirmation(
    State(state): State<AppState>,
    payload: Result<Json<ResendRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let request = json_body(payload)?;
    let token = AuthService::new(&state)
        .resend_confirmation(&request.email, Utc::now())
        .await?;

    let mut body = json!({ "sent": true });
    if let Some(token) = token.filter(|_| state.config.is_development()) {
        body["confirmation_token"] = Value::String(token);
    }
    Ok(ApiResponse::success(body))
}
