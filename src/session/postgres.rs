use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use super::{SessionError, SessionStore};

/// Activity rows in `session_activity`, shared by every API instance.
/// `expires_at` acts as the TTL; expired rows are removed by `purge_idle`.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn last_seen(&self, key: &str) -> Result<Option<DateTime<Utc>>, SessionError> {
        let last_seen: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT last_seen_at FROM session_activity WHERE session_key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(last_seen)
    }

    async fn touch(&self, key: &str, now: DateTime<Utc>, retain_for: Duration) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            INSERT INTO session_activity (session_key, last_seen_at, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_key)
            DO UPDATE SET last_seen_at = EXCLUDED.last_seen_at, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(now)
        .bind(now + retain_for)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM session_activity WHERE session_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_idle(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM session_activity WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
