// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Route prefix: /api/*
// Middleware: JWT validation → session timeout → password-expiry guard
pub mod auth;
pub mod custody;
pub mod dashboard;
pub mod data;
pub mod files;
pub mod find;
pub mod reports;

use crate::auth::Role;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::resources::{self, ResourceDef};

pub(crate) fn resource_or_404(name: &str) -> Result<&'static ResourceDef, ApiError> {
    resources::lookup(name).ok_or_else(|| ApiError::not_found(format!("Unknown resource '{}'", name)))
}

pub(crate) fn require_role(user: &AuthUser, allowed: &[Role], action: &str) -> Result<(), ApiError> {
    if user.has_role(allowed) {
        return Ok(());
    }
    tracing::warn!(
        client_id = %user.client_id,
        user_id = %user.user_id,
        role = %user.role,
        action,
        "Role not permitted"
    );
    Err(ApiError::forbidden(format!("Role {} may not {}", user.role, action)))
}
