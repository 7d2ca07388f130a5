//! Failed-login counting and lockout windows.
//!
//! State lives on the user row (`access_failed_count`, `lockout_end`).

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::SecurityConfig;

#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    /// Failures allowed before the account locks. Zero disables lockout.
    pub max_attempts: i32,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::FromRow)]
pub struct LockoutState {
    pub access_failed_count: i32,
    pub lockout_end: Option<DateTime<Utc>>,
}

impl LockoutPolicy {
    pub fn from_config(security: &SecurityConfig) -> Self {
        Self {
            max_attempts: security.lockout_max_attempts,
            duration: Duration::minutes(security.lockout_minutes),
        }
    }

    pub fn enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// End of the active lockout, if any
    pub fn locked_until(&self, state: &LockoutState, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        state.lockout_end.filter(|end| *end > now)
    }

    /// Count a wrong password in one statement. Concurrent failures each
    /// see the previous increment, so the limit cannot be skipped. Reaching
    /// the limit starts a lockout and resets the counter so the next window
    /// starts clean.
    pub async fn record_failure(
        &self,
        pool: &PgPool,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<LockoutState, sqlx::Error> {
        if !self.enabled() {
            return Ok(LockoutState::default());
        }
        sqlx::query_as::<_, LockoutState>(RECORD_FAILURE_SQL)
            .bind(user_id)
            .bind(self.max_attempts)
            .bind(now + self.duration)
            .fetch_one(pool)
            .await
    }
}

/// `$1` user id, `$2` attempt limit, `$3` lockout end if this failure hits
/// the limit. SET expressions read the row as it was before the update.
const RECORD_FAILURE_SQL: &str = r#"
    UPDATE users
    SET access_failed_count = CASE
            WHEN access_failed_count + 1 >= $2 THEN 0
            ELSE access_failed_count + 1
        END,
        lockout_end = CASE
            WHEN access_failed_count + 1 >= $2 THEN $3
            ELSE lockout_end
        END,
        updated_at = now()
    WHERE id = $1
    RETURNING access_failed_count, lockout_end
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LockoutPolicy {
        LockoutPolicy { max_attempts: 3, duration: Duration::minutes(15) }
    }

    #[test]
    fn active_lockout_reports_its_end() {
        let now = Utc::now();
        let state = LockoutState { access_failed_count: 0, lockout_end: Some(now + Duration::minutes(15)) };
        assert_eq!(policy().locked_until(&state, now), Some(now + Duration::minutes(15)));
        assert!(policy().locked_until(&LockoutState::default(), now).is_none());
    }

    #[test]
    fn lockout_expires() {
        let now = Utc::now();
        let state = LockoutState { access_failed_count: 0, lockout_end: Some(now - Duration::seconds(1)) };
        assert!(policy().locked_until(&state, now).is_none());
    }

    #[test]
    fn failure_update_is_a_single_conditional_statement() {
        let sql = RECORD_FAILURE_SQL.trim_start();
        assert!(sql.starts_with("UPDATE users"));
        assert!(sql.contains("access_failed_count + 1 >= $2"));
        assert!(sql.trim_end().ends_with("RETURNING access_failed_count, lockout_end"));
    }

    #[tokio::test]
    async fn disabled_policy_never_counts() {
        let policy = LockoutPolicy { max_attempts: 0, duration: Duration::minutes(15) };
        let config = crate::config::AppConfig::for_tests();
        let db = crate::database::DatabaseManager::connect_lazy(&config.database).unwrap();
        // Returns before touching the pool
        let state = policy.record_failure(db.pool(), Uuid::nil(), Utc::now()).await.unwrap();
        assert_eq!(state, LockoutState::default());
    }
}
