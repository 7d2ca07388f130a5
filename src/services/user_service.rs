use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::confirmation::ConfirmationToken;
use crate::auth::password::{validate_password, PasswordHasher};
use crate::auth::{AuthError, Role};
use crate::config::SecurityConfig;
use crate::database::models::user::normalize_email;
use crate::database::models::User;
use crate::database::DatabaseError;
use crate::filter::filter_where::escape_like;
use crate::filter::{Page, Pagination};
use crate::tenant::TenantScope;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub client_id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub password: String,
    pub email_confirmed: bool,
}

/// User rows: lookup, creation and administrator actions
pub struct UserService<'a> {
    pool: &'a PgPool,
    hasher: &'a PasswordHasher,
    security: &'a SecurityConfig,
}

impl<'a> UserService<'a> {
    pub fn new(pool: &'a PgPool, hasher: &'a PasswordHasher, security: &'a SecurityConfig) -> Self {
        Self { pool, hasher, security }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE normalized_email = $1")
            .bind(normalize_email(email))
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {} not found", id)))
    }

    async fn get_scoped(&self, scope: &TenantScope, id: Uuid) -> Result<User, DatabaseError> {
        let user = self.get(id).await?;
        if !scope.permits(&user.client_id) {
            return Err(DatabaseError::NotFound(format!("User {} not found", id)));
        }
        Ok(user)
    }

    pub async fn create(&self, new_user: NewUser, confirmation: Option<&ConfirmationToken>) -> Result<User, AuthError> {
        let email = new_user.email.trim().to_string();
        if !is_plausible_email(&email) {
            return Err(DatabaseError::validation(
                [("email".to_string(), "Enter a valid email address".to_string())].into(),
            )
            .into());
        }
        if new_user.full_name.trim().is_empty() {
            return Err(DatabaseError::validation(
                [("full_name".to_string(), "Required".to_string())].into(),
            )
            .into());
        }
        validate_password(&new_user.password, self.security.password_min_length)?;

        if self.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                client_id, email, normalized_email, full_name, role, password_hash,
                email_confirmed, confirmation_digest, confirmation_expires_at, password_changed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            RETURNING *
            "#,
        )
        .bind(&new_user.client_id)
        .bind(&email)
        .bind(normalize_email(&email))
        .bind(new_user.full_name.trim())
        .bind(new_user.role.as_str())
        .bind(self.hasher.hash(&new_user.password))
        .bind(new_user.email_confirmed)
        .bind(confirmation.map(|c| c.digest.clone()))
        .bind(confirmation.map(|c| c.expires_at))
        .fetch_one(self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            // Lost a race with a concurrent registration
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => Err(AuthError::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn mark_confirmed(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email_confirmed = TRUE, confirmation_digest = NULL, confirmation_expires_at = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    pub async fn list(
        &self,
        scope: &TenantScope,
        search: Option<&str>,
        pagination: Pagination,
    ) -> Result<Page<User>, DatabaseError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));
        let predicate = "($1::text IS NULL OR client_id = $1) \
                         AND ($2::text IS NULL OR email ILIKE $2 OR full_name ILIKE $2)";

        let users_sql = format!(
            "SELECT * FROM users WHERE {} ORDER BY client_id, email LIMIT $3 OFFSET $4",
            predicate
        );
        let count_sql = format!("SELECT COUNT(*) FROM users WHERE {}", predicate);

        let users = sqlx::query_as::<_, User>(&users_sql)
            .bind(scope.client_id())
            .bind(pattern.as_deref())
            .bind(pagination.page_size)
            .bind(pagination.offset())
            .fetch_all(self.pool);
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(scope.client_id())
            .bind(pattern.as_deref())
            .fetch_one(self.pool);
        let (users, total) = futures::try_join!(users, total)?;

        Ok(Page::new(users, total, pagination))
    }

    pub async fn unlock(&self, scope: &TenantScope, id: Uuid) -> Result<User, DatabaseError> {
        self.get_scoped(scope, id).await?;
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET access_failed_count = 0, lockout_end = NULL, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;
        tracing::info!(client_id = %user.client_id, user_id = %user.id, "Account unlocked");
        Ok(user)
    }

    pub async fn set_role(&self, scope: &TenantScope, id: Uuid, role: Role) -> Result<User, DatabaseError> {
        self.get_scoped(scope, id).await?;
        let user = sqlx::query_as::<_, User>("UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(role.as_str())
            .fetch_one(self.pool)
            .await?;
        tracing::info!(client_id = %user.client_id, user_id = %user.id, role = %role, "Role changed");
        Ok(user)
    }

    pub async fn set_active(&self, scope: &TenantScope, id: Uuid, active: bool) -> Result<User, DatabaseError> {
        self.get_scoped(scope, id).await?;
        let user =
            sqlx::query_as::<_, User>("UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1 RETURNING *")
                .bind(id)
                .bind(active)
                .fetch_one(self.pool)
                .await?;
        Ok(user)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_plausibility() {
        assert!(is_plausible_email("ops@acme.test"));
        assert!(!is_plausible_email("ops@localhost"));
        assert!(!is_plausible_email("@acme.test"));
        assert!(!is_plausible_email("ops acme@acme.test"));
        assert!(!is_plausible_email("ops.acme.test"));
    }

    #[test]
    fn emails_normalize_case_insensitively() {
        assert_eq!(normalize_email("  Ops@Acme.Test "), "OPS@ACME.TEST");
    }
}
