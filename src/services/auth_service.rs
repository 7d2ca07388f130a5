use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::confirmation::{self, ConfirmationToken};
use crate::auth::lockout::LockoutPolicy;
use crate::auth::password::{is_password_expired, validate_password, PasswordHasher, PasswordVerification};
use crate::auth::{AuthError, IssuedToken, JwtKeys, Role, TokenSubject};
use crate::config::SecurityConfig;
use crate::database::models::user::normalize_email;
use crate::database::models::User;
use crate::middleware::AuthUser;
use crate::services::client_service::ClientService;
use crate::services::user_service::{NewUser, UserService};
use crate::session::{session_key, SessionTracker};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub client_id: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    /// Raw confirmation token, present when confirmation is required
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub user: User,
    pub password_expired: bool,
}

/// Login, registration and credential flows
pub struct AuthService<'a> {
    pool: &'a PgPool,
    security: &'a SecurityConfig,
    jwt: &'a JwtKeys,
    hasher: &'a PasswordHasher,
    sessions: &'a SessionTracker,
    lockout: LockoutPolicy,
}

impl<'a> AuthService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            pool: state.db.pool(),
            security: &state.config.security,
            jwt: &state.jwt,
            hasher: &state.hasher,
            sessions: &state.sessions,
            lockout: LockoutPolicy::from_config(&state.config.security),
        }
    }

    fn users(&self) -> UserService<'a> {
        UserService::new(self.pool, self.hasher, self.security)
    }

    pub async fn register(&self, request: RegisterRequest, now: DateTime<Utc>) -> Result<Registration, AuthError> {
        let client = ClientService::new(self.pool).get(&request.client_id).await?;
        if !client.is_active {
            return Err(AuthError::ClientInactive);
        }

        let confirmation = self
            .security
            .require_confirmed_email
            .then(|| ConfirmationToken::generate(self.security.confirmation_token_hours, now));

        let user = self
            .users()
            .create(
                NewUser {
                    client_id: client.id,
                    email: request.email,
                    full_name: request.full_name,
                    role: Role::Client,
                    password: request.password,
                    email_confirmed: confirmation.is_none(),
                },
                confirmation.as_ref(),
            )
            .await?;

        tracing::info!(client_id = %user.client_id, user_id = %user.id, "User registered");
        Ok(Registration { user, confirmation_token: confirmation.map(|c| c.token) })
    }

    pub async fn login(&self, email: &str, password: &str, now: DateTime<Utc>) -> Result<LoginOutcome, AuthError> {
        let Some(user) = self.users().find_by_email(email).await? else {
            self.hasher.verify_dummy(password);
            tracing::warn!(email = %normalize_email(email), "Login for unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if let Some(until) = self.lockout.locked_until(&user.lockout_state(), now) {
            tracing::warn!(client_id = %user.client_id, user_id = %user.id, %until, "Login while locked out");
            return Err(AuthError::AccountLocked { until });
        }
        if !user.is_active {
            return Err(AuthError::Inactive);
        }
        let client = ClientService::new(self.pool).get(&user.client_id).await?;
        if !client.is_active {
            return Err(AuthError::ClientInactive);
        }

        let verification = self.hasher.verify(&user.password_hash, password)?;
        if verification == PasswordVerification::Failed {
            let next = self.lockout.record_failure(self.pool, user.id, now).await?;
            if let Some(until) = self.lockout.locked_until(&next, now) {
                tracing::warn!(client_id = %user.client_id, user_id = %user.id, %until, "Account locked after failed logins");
                return Err(AuthError::AccountLocked { until });
            }
            tracing::warn!(
                client_id = %user.client_id,
                user_id = %user.id,
                failures = next.access_failed_count,
                "Failed login"
            );
            return Err(AuthError::InvalidCredentials);
        }

        if self.security.require_confirmed_email && !user.email_confirmed {
            return Err(AuthError::EmailNotConfirmed);
        }

        if verification == PasswordVerification::SuccessRehashNeeded {
            let upgraded = self.hasher.hash(password);
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
                .bind(user.id)
                .bind(&upgraded)
                .execute(self.pool)
                .await?;
            tracing::info!(user_id = %user.id, "Upgraded password hash parameters");
        }

        sqlx::query(
            "UPDATE users SET access_failed_count = 0, lockout_end = NULL, last_login_at = $2, updated_at = now() WHERE id = $1",
        )
        .bind(user.id)
        .bind(now)
        .execute(self.pool)
        .await?;

        let password_expired = is_password_expired(user.password_changed_at, self.security.password_expiry_days, now);
        let token = self.jwt.issue_at(&subject(&user, password_expired), now)?;
        self.sessions
            .begin(&session_key(&user.client_id, user.id), now)
            .await?;

        tracing::info!(client_id = %user.client_id, user_id = %user.id, password_expired, "User logged in");
        Ok(LoginOutcome { token, user, password_expired })
    }

    pub async fn confirm_email(&self, email: &str, token: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let user = self
            .users()
            .find_by_email(email)
            .await?
            .ok_or(AuthError::ConfirmationInvalid)?;
        if user.email_confirmed {
            return Ok(());
        }
        if !confirmation::matches(token, user.confirmation_digest.as_deref(), user.confirmation_expires_at, now) {
            tracing::warn!(user_id = %user.id, "Invalid confirmation token presented");
            return Err(AuthError::ConfirmationInvalid);
        }
        self.users().mark_confirmed(user.id).await?;
        tracing::info!(client_id = %user.client_id, user_id = %user.id, "Email confirmed");
        Ok(())
    }

    /// New token for an unconfirmed account. Unknown or already confirmed
    /// addresses yield `None` so callers cannot probe for accounts.
    pub async fn resend_confirmation(&self, email: &str, now: DateTime<Utc>) -> Result<Option<String>, AuthError> {
        let Some(user) = self.users().find_by_email(email).await? else {
            return Ok(None);
        };
        if user.email_confirmed {
            return Ok(None);
        }
        let issued = ConfirmationToken::generate(self.security.confirmation_token_hours, now);
        sqlx::query(
            "UPDATE users SET confirmation_digest = $2, confirmation_expires_at = $3, updated_at = now() WHERE id = $1",
        )
        .bind(user.id)
        .bind(&issued.digest)
        .bind(issued.expires_at)
        .execute(self.pool)
        .await?;
        Ok(Some(issued.token))
    }

    /// Returns a fresh token whose `password_expired` claim is cleared
    pub async fn change_password(
        &self,
        caller: &AuthUser,
        current: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let user = self.users().get(caller.user_id).await?;
        if self.hasher.verify(&user.password_hash, current)? == PasswordVerification::Failed {
            tracing::warn!(client_id = %user.client_id, user_id = %user.id, "Password change with wrong current password");
            return Err(AuthError::InvalidCredentials);
        }
        validate_password(new_password, self.security.password_min_length)?;
        if current == new_password {
            return Err(AuthError::WeakPassword(vec!["must differ from the current password".to_string()]));
        }

        sqlx::query(
            "UPDATE users SET password_hash = $2, password_changed_at = $3, updated_at = now() WHERE id = $1",
        )
        .bind(user.id)
        .bind(self.hasher.hash(new_password))
        .bind(now)
        .execute(self.pool)
        .await?;

        tracing::info!(client_id = %user.client_id, user_id = %user.id, "Password changed");
        self.jwt.issue_at(&subject(&user, false), now)
    }

    /// Reissue from the stored user so role or status changes take effect
    pub async fn refresh(&self, caller: &AuthUser, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let user = self.users().get(caller.user_id).await?;
        if !user.is_active {
            return Err(AuthError::Inactive);
        }
        if let Some(until) = self.lockout.locked_until(&user.lockout_state(), now) {
            return Err(AuthError::AccountLocked { until });
        }
        let password_expired = is_password_expired(user.password_changed_at, self.security.password_expiry_days, now);
        self.jwt.issue_at(&subject(&user, password_expired), now)
    }
}

fn subject(user: &User, password_expired: bool) -> TokenSubject {
    TokenSubject {
        user_id: user.id,
        email: user.email.clone(),
        name: user.full_name.clone(),
        client_id: user.client_id.clone(),
        role: user.role(),
        password_expired,
    }
}
