use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::{Claims, Role};
use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated user context extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub client_id: String,
    pub role: Role,
    pub password_expired: bool,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            name: claims.name,
            client_id: claims.client_id,
            role: claims.role,
            password_expired: claims.password_expired,
        }
    }
}

/// JWT authentication middleware that validates tokens and extracts user context
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(&headers).map_err(ApiError::unauthorized)?;

    let claims = state.jwt.decode(&token).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        ApiError::unauthorized(e.to_string())
    })?;

    // Every tenant-scoped query depends on this claim
    if claims.client_id.trim().is_empty() {
        tracing::warn!(user_id = %claims.sub, "Token without client id rejected");
        return Err(ApiError::unauthorized("Token carries no client id"));
    }

    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

/// Reject everything except the auth routes while the password is expired
pub async fn password_expiry_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = current_user(&request)?;
    if user.password_expired && !request.uri().path().starts_with("/api/auth/") {
        return Err(ApiError::PasswordExpired(
            "Password has expired; change it via /api/auth/change-password".to_string(),
        ));
    }
    Ok(next.run(request).await)
}

/// Administrator-only route tier
pub async fn require_admin_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = current_user(&request)?;
    if !user.is_admin() {
        tracing::warn!(
            client_id = %user.client_id,
            user_id = %user.user_id,
            path = %request.uri().path(),
            "Administrator route denied"
        );
        return Err(ApiError::forbidden("Administrator role required"));
    }
    Ok(next.run(request).await)
}

pub(crate) fn current_user(request: &Request) -> Result<&AuthUser, ApiError> {
    request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_jwt_from_headers(&headers("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(extract_jwt_from_headers(&HeaderMap::new()).is_err());
        assert!(extract_jwt_from_headers(&headers("Basic dXNlcjpwYXNz")).is_err());
        assert!(extract_jwt_from_headers(&headers("Bearer   ")).is_err());
    }
}
