use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use super::auth::current_user;
use crate::error::ApiError;
use crate::session::{session_key, ActivityCheck};
use crate::state::AppState;

/// Inactivity timeout keyed by tenant and user. Runs after JWT validation.
pub async fn session_timeout_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = current_user(&request)?;
    let key = session_key(&user.client_id, user.user_id);

    match state.sessions.check_and_touch(&key, Utc::now()).await? {
        ActivityCheck::Active => {}
        ActivityCheck::TimedOut { idle } => {
            tracing::warn!(
                client_id = %user.client_id,
                user_id = %user.user_id,
                idle_minutes = idle.num_minutes(),
                "Session timed out"
            );
            return Err(ApiError::session_expired(
                "Session expired due to inactivity; please log in again",
            ));
        }
    }

    Ok(next.run(request).await)
}
