// handlers/mod.rs - 3-tier handler layout
//
// Public (no auth) → Protected (JWT + session timeout) → Elevated (Administrator)
pub mod elevated; // /api/admin/*
pub mod protected; // /api/*
pub mod public; // /, /health, /auth/*

use axum::extract::rejection::JsonRejection;
use axum::Json;
use uuid::Uuid;

use crate::error::ApiError;

/// Parse a path id, reporting malformed ids in the error envelope
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::bad_request(format!("Invalid id '{}'", raw)))
}

/// Unwrap a JSON body, turning axum's rejection into an `ApiError`
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(ApiError::from)
}
