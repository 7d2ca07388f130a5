//! Per-(tenant, user) activity tracking behind the inactivity timeout.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store error: {0}")]
    Backend(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Composite identity of a session: `"{client_id}:{user_id}"`
pub fn session_key(client_id: &str, user_id: Uuid) -> String {
    format!("{}:{}", client_id, user_id)
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Last recorded activity for the key
    async fn last_seen(&self, key: &str) -> Result<Option<DateTime<Utc>>, SessionError>;

    /// Record activity at `now`. `retain_for` is how long the entry must
    /// survive without further activity.
    async fn touch(&self, key: &str, now: DateTime<Utc>, retain_for: Duration) -> Result<(), SessionError>;

    async fn remove(&self, key: &str) -> Result<(), SessionError>;

    /// Drop entries whose retention has passed. Returns how many were dropped.
    async fn purge_idle(&self, now: DateTime<Utc>) -> Result<u64, SessionError>;
}

/// Result of checking one request against the inactivity window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityCheck {
    Active,
    TimedOut { idle: Duration },
}

/// Enforces the inactivity window against a [`SessionStore`].
///
/// Entries are retained for the token lifetime, not the idle window, so an
/// entry can never disappear while a token that could reuse it is still valid.
#[derive(Clone)]
pub struct SessionTracker {
    store: std::sync::Arc<dyn SessionStore>,
    timeout: Duration,
    retain_for: Duration,
}

impl SessionTracker {
    pub fn new(store: std::sync::Arc<dyn SessionStore>, timeout: Duration, token_lifetime: Duration) -> Self {
        Self {
            store,
            timeout,
            retain_for: std::cmp::max(timeout, token_lifetime),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check and record one request. A timed-out session is removed and not
    /// touched, so the caller must log in again.
    pub async fn check_and_touch(&self, key: &str, now: DateTime<Utc>) -> Result<ActivityCheck, SessionError> {
        if let Some(last) = self.store.last_seen(key).await? {
            let idle = now - last;
            if idle > self.timeout {
                self.store.remove(key).await?;
                return Ok(ActivityCheck::TimedOut { idle });
            }
        }
        self.store.touch(key, now, self.retain_for).await?;
        Ok(ActivityCheck::Active)
    }

    /// Start a fresh session at login
    pub async fn begin(&self, key: &str, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.store.touch(key, now, self.retain_for).await
    }

    pub async fn end(&self, key: &str) -> Result<(), SessionError> {
        self.store.remove(key).await
    }

    pub async fn purge(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        self.store.purge_idle(now).await
    }

    /// Default sweep period: once per inactivity window, at least a minute
    pub fn purge_interval(&self) -> std::time::Duration {
        let minute = std::time::Duration::from_secs(60);
        self.timeout.to_std().map_or(minute, |window| window.max(minute))
    }

    /// Background sweep of entries past their retention. The first pass runs
    /// immediately.
    pub fn spawn_purge_task(&self, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match tracker.purge(Utc::now()).await {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "Purged idle session entries"),
                    Err(e) => tracing::warn!(error = %e, "Could not purge idle session entries"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tracker(timeout_minutes: i64) -> SessionTracker {
        SessionTracker::new(
            Arc::new(InMemorySessionStore::new()),
            Duration::minutes(timeout_minutes),
            Duration::hours(8),
        )
    }

    #[test]
    fn key_combines_tenant_and_user() {
        let id = Uuid::nil();
        assert_eq!(session_key("ACME", id), "ACME:00000000-0000-0000-0000-000000000000");
    }

    #[tokio::test]
    async fn activity_within_window_stays_active() {
        let tracker = tracker(30);
        let start = Utc::now();
        assert_eq!(tracker.check_and_touch("A:1", start).await.unwrap(), ActivityCheck::Active);
        assert_eq!(
            tracker.check_and_touch("A:1", start + Duration::minutes(29)).await.unwrap(),
            ActivityCheck::Active
        );
        // Each request slides the window forward
        assert_eq!(
            tracker.check_and_touch("A:1", start + Duration::minutes(58)).await.unwrap(),
            ActivityCheck::Active
        );
    }

    #[tokio::test]
    async fn idle_session_times_out_and_is_removed() {
        let tracker = tracker(30);
        let start = Utc::now();
        tracker.begin("A:1", start).await.unwrap();

        let check = tracker.check_and_touch("A:1", start + Duration::minutes(31)).await.unwrap();
        assert!(matches!(check, ActivityCheck::TimedOut { .. }));

        // Removed entry counts as new activity on the next request (fresh login)
        assert_eq!(
            tracker.check_and_touch("A:1", start + Duration::minutes(32)).await.unwrap(),
            ActivityCheck::Active
        );
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_key() {
        let tracker = tracker(30);
        let start = Utc::now();
        tracker.begin("A:1", start).await.unwrap();
        tracker.begin("B:1", start + Duration::minutes(20)).await.unwrap();

        let later = start + Duration::minutes(40);
        assert!(matches!(tracker.check_and_touch("A:1", later).await.unwrap(), ActivityCheck::TimedOut { .. }));
        assert_eq!(tracker.check_and_touch("B:1", later).await.unwrap(), ActivityCheck::Active);
    }

    #[tokio::test]
    async fn purge_task_drops_abandoned_sessions() {
        let store = Arc::new(InMemorySessionStore::new());
        let tracker = SessionTracker::new(store.clone(), Duration::minutes(30), Duration::hours(8));
        let now = Utc::now();
        for user in 0..50 {
            tracker.begin(&format!("A:{}", user), now - Duration::hours(9)).await.unwrap();
        }
        tracker.begin("A:active", now).await.unwrap();

        let task = tracker.spawn_purge_task(std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        task.abort();

        assert_eq!(store.len().await, 1);
        assert!(store.last_seen("A:active").await.unwrap().is_some());
    }

    #[test]
    fn purge_interval_follows_timeout() {
        assert_eq!(tracker(30).purge_interval(), std::time::Duration::from_secs(30 * 60));
        let tiny = SessionTracker::new(Arc::new(InMemorySessionStore::new()), Duration::seconds(5), Duration::hours(1));
        assert_eq!(tiny.purge_interval(), std::time::Duration::from_secs(60));
    }

    #[tokio::test]
    async fn purge_keeps_entries_within_token_lifetime() {
        let tracker = tracker(30);
        let start = Utc::now();
        tracker.begin("A:1", start).await.unwrap();

        assert_eq!(tracker.purge(start + Duration::hours(1)).await.unwrap(), 0);
        assert_eq!(tracker.purge(start + Duration::hours(9)).await.unwrap(), 1);
    }
}
