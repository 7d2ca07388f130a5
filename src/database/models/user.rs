use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::auth::lockout::LockoutState;
use crate::auth::Role;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub client_id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub normalized_email: String,
    pub full_name: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email_confirmed: bool,
    #[serde(skip_serializing)]
    pub confirmation_digest: Option<String>,
    #[serde(skip_serializing)]
    pub confirmation_expires_at: Option<DateTime<Utc>>,
    pub access_failed_count: i32,
    pub lockout_end: Option<DateTime<Utc>>,
    pub password_changed_at: DateTime<Utc>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Unknown role strings get the least privileged role
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::Client)
    }

    pub fn lockout_state(&self) -> LockoutState {
        LockoutState {
            access_failed_count: self.access_failed_count,
            lockout_end: self.lockout_end,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_uppercase()
}
