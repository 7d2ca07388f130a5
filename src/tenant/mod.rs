//! Row-level tenant scoping.
//!
//! Handlers never build `client_id` predicates themselves. They resolve a
//! [`TenantScope`] from the caller and the resource's [`ScopePolicy`], and
//! the repository turns that scope into the first predicate of every query.

use crate::auth::Role;
use crate::database::SqlValue;
use crate::error::ApiError;
use crate::middleware::AuthUser;

/// How administrators see a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePolicy {
    /// Always limited to one tenant, administrators included
    TenantOnly,
    /// Administrators see every tenant's rows unless they ask for one
    AdministratorSeesAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    All,
    Tenant(String),
}

impl TenantScope {
    pub fn all() -> Self {
        TenantScope::All
    }

    pub fn tenant(client_id: impl Into<String>) -> Self {
        TenantScope::Tenant(client_id.into())
    }

    /// Work out which tenant's rows a request may touch.
    ///
    /// `requested` is an explicit `client_id` from the query string. Only
    /// administrators may name a tenant other than their own.
    pub fn resolve(user: &AuthUser, policy: ScopePolicy, requested: Option<&str>) -> Result<Self, ApiError> {
        if user.client_id.trim().is_empty() {
            return Err(ApiError::unauthorized("Token carries no client id"));
        }

        let requested = requested.map(str::trim).filter(|c| !c.is_empty());
        let is_admin = user.role == Role::Administrator;

        match (is_admin, requested) {
            (false, Some(other)) if other != user.client_id => {
                tracing::warn!(
                    client_id = %user.client_id,
                    user_id = %user.user_id,
                    requested = %other,
                    "Cross-tenant access denied"
                );
                Err(ApiError::forbidden("Access to another client's data is not permitted"))
            }
            (false, _) => Ok(TenantScope::tenant(&user.client_id)),
            (true, Some(other)) => Ok(TenantScope::tenant(other)),
            (true, None) => match policy {
                ScopePolicy::TenantOnly => Ok(TenantScope::tenant(&user.client_id)),
                ScopePolicy::AdministratorSeesAll => Ok(TenantScope::All),
            },
        }
    }

    pub fn client_id(&self) -> Option<&str> {
        match self {
            TenantScope::All => None,
            TenantScope::Tenant(id) => Some(id),
        }
    }

    /// Writes land in exactly one tenant
    pub fn require_single(&self) -> Result<&str, ApiError> {
        self.client_id().ok_or_else(|| {
            ApiError::field_error("client_id", "Specify the client this record belongs to")
        })
    }

    /// Bind value for hand-written aggregates filtering with
    /// `($1::text IS NULL OR client_id = $1)`
    pub fn sql_param(&self) -> SqlValue {
        SqlValue::Text(self.client_id().map(str::to_string))
    }

    pub fn permits(&self, client_id: &str) -> bool {
        match self {
            TenantScope::All => true,
            TenantScope::Tenant(id) => id == client_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(role: Role, client_id: &str) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            name: "Someone".to_string(),
            client_id: client_id.to_string(),
            role,
            password_expired: false,
        }
    }

    #[test]
    fn non_admin_is_pinned_to_own_tenant() {
        let u = user(Role::Manager, "ACME");
        for policy in [ScopePolicy::TenantOnly, ScopePolicy::AdministratorSeesAll] {
            assert_eq!(TenantScope::resolve(&u, policy, None).unwrap(), TenantScope::tenant("ACME"));
            assert_eq!(TenantScope::resolve(&u, policy, Some("ACME")).unwrap(), TenantScope::tenant("ACME"));
        }
    }

    #[test]
    fn non_admin_cannot_name_another_tenant() {
        let u = user(Role::Technician, "ACME");
        let err = TenantScope::resolve(&u, ScopePolicy::AdministratorSeesAll, Some("GLOBEX")).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn admin_bypass_follows_policy() {
        let admin = user(Role::Administrator, "HQ");
        assert_eq!(
            TenantScope::resolve(&admin, ScopePolicy::AdministratorSeesAll, None).unwrap(),
            TenantScope::All
        );
        assert_eq!(
            TenantScope::resolve(&admin, ScopePolicy::TenantOnly, None).unwrap(),
            TenantScope::tenant("HQ")
        );
        assert_eq!(
            TenantScope::resolve(&admin, ScopePolicy::TenantOnly, Some("ACME")).unwrap(),
            TenantScope::tenant("ACME")
        );
    }

    #[test]
    fn missing_client_claim_is_unauthorized() {
        let u = user(Role::Administrator, "");
        let err = TenantScope::resolve(&u, ScopePolicy::AdministratorSeesAll, None).unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn all_scope_cannot_be_written() {
        assert!(TenantScope::All.require_single().is_err());
        assert_eq!(TenantScope::tenant("ACME").require_single().unwrap(), "ACME");
        assert!(TenantScope::All.permits("ANY"));
        assert!(!TenantScope::tenant("ACME").permits("GLOBEX"));
    }
}
