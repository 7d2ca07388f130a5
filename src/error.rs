// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::AuthError;
use crate::database::manager::FOREIGN_KEY_VIOLATION;
use crate::database::DatabaseError;
use crate::filter::error::FilterError;
use crate::reports::schedule::ScheduleError;
use crate::session::SessionError;
use crate::uploads::UploadError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),
    SessionExpired(String),

    // 403 Forbidden
    Forbidden(String),
    AccountLocked(String),
    PasswordExpired(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 413 Payload Too Large
    PayloadTooLarge(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::SessionExpired(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::AccountLocked(_) => 403,
            ApiError::PasswordExpired(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::SessionExpired(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::AccountLocked(msg) => msg,
            ApiError::PasswordExpired(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::PayloadTooLarge(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::SessionExpired(_) => "SESSION_EXPIRED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::AccountLocked(_) => "ACCOUNT_LOCKED",
            ApiError::PasswordExpired(_) => "PASSWORD_EXPIRED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    /// Single-field validation failure.
    pub fn field_error(field: impl Into<String>, problem: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.into(), problem.into());
        ApiError::validation_error("Invalid field value", Some(field_errors))
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        ApiError::SessionExpired(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Conflict(msg) => ApiError::conflict(msg),
            DatabaseError::Validation { message, field_errors } => {
                ApiError::validation_error(message, Some(field_errors))
            }
            DatabaseError::Filter(filter_err) => filter_err.into(),
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("Database configuration error: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::QueryError(msg) => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Database query error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            DatabaseError::Sqlx(sqlx_err) => match &sqlx_err {
                sqlx::Error::RowNotFound => ApiError::not_found("Record not found"),
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                    tracing::error!("Database unavailable: {}", sqlx_err);
                    ApiError::service_unavailable("Database temporarily unavailable")
                }
                sqlx::Error::Database(db) => match db.code().as_deref().and_then(client_error_for) {
                    Some(mapped) => {
                        tracing::debug!(code = ?db.code(), constraint = ?db.constraint(), "Database rejected input");
                        mapped
                    }
                    None => {
                        tracing::error!("Database error: {}", sqlx_err);
                        ApiError::internal_server_error("Database error occurred")
                    }
                },
                _ => {
                    // Log the real error but return generic message
                    tracing::error!("SQLx error: {}", sqlx_err);
                    ApiError::internal_server_error("Database error occurred")
                }
            },
            DatabaseError::Migration(msg) => {
                tracing::error!("Migration error: {}", msg);
                ApiError::service_unavailable("Service is being updated, please try again later")
            }
        }
    }
}

/// Client-facing error for SQLSTATEs caused by the submitted data. Foreign key
/// violations reach here from inserts and updates; deletes convert theirs to
/// a conflict before leaving the repository.
fn client_error_for(code: &str) -> Option<ApiError> {
    match code {
        "23505" => Some(ApiError::conflict("A record with the same unique value already exists")),
        FOREIGN_KEY_VIOLATION => Some(ApiError::bad_request("Referenced record does not exist for this client")),
        "23502" => Some(ApiError::bad_request("A required field is missing")),
        "23514" => Some(ApiError::validation_error("A value is outside the allowed range", None)),
        // Class 22: numeric overflow, bad text representation, invalid datetime
        code if code.starts_with("22") => {
            Some(ApiError::validation_error("A value is out of range or malformed", None))
        }
        _ => None,
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::InvalidValue { field, message } => ApiError::field_error(field, message),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::unauthorized("Invalid email or password"),
            AuthError::AccountLocked { until } => ApiError::AccountLocked(format!(
                "Account is locked until {}",
                until.to_rfc3339()
            )),
            AuthError::EmailNotConfirmed => ApiError::forbidden("Email address has not been confirmed"),
            AuthError::Inactive => ApiError::forbidden("Account is disabled"),
            AuthError::ClientInactive => ApiError::forbidden("Client account is disabled"),
            AuthError::WeakPassword(problems) => {
                let field_errors = HashMap::from([("password".to_string(), problems.join("; "))]);
                ApiError::validation_error("Password does not meet requirements", Some(field_errors))
            }
            AuthError::InvalidToken(msg) => ApiError::unauthorized(msg),
            AuthError::ConfirmationInvalid => {
                ApiError::bad_request("Confirmation token is invalid or expired")
            }
            AuthError::EmailTaken => ApiError::conflict("Email address is already registered"),
            AuthError::TokenGeneration(msg) | AuthError::MalformedHash(msg) => {
                tracing::error!("Authentication internal error: {}", msg);
                ApiError::internal_server_error("Authentication failed")
            }
            AuthError::Database(db) => db.into(),
            AuthError::Session(session) => session.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        tracing::error!("Session store error: {}", err);
        ApiError::service_unavailable("Session store unavailable")
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::UnknownSlot(_)
            | UploadError::SlotNotAllowed { .. }
            | UploadError::MissingFile
            | UploadError::ExtensionNotAllowed(_)
            | UploadError::InvalidFileName => ApiError::bad_request(err.to_string()),
            UploadError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            UploadError::NoFile(_) => ApiError::not_found(err.to_string()),
            UploadError::Io(io) => {
                tracing::error!("Upload storage error: {}", io);
                ApiError::internal_server_error("File storage error")
            }
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        let field = match err {
            ScheduleError::UnknownFrequency(_) => "frequency",
            ScheduleError::MissingWeekday | ScheduleError::InvalidWeekday(_) => "day_of_week",
            ScheduleError::MissingDayOfMonth | ScheduleError::InvalidDayOfMonth(_) => "day_of_month",
            ScheduleError::InvalidTime(_) => "time_of_day",
        };
        ApiError::field_error(field, err.to_string())
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::invalid_json(rejection.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
