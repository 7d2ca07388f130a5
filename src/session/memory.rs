use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{SessionError, SessionStore};

#[derive(Debug, Clone, Copy)]
struct Entry {
    last_seen: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Process-local activity map. Not shared between instances; use
/// [`super::PgSessionStore`] when running more than one.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn last_seen(&self, key: &str) -> Result<Option<DateTime<Utc>>, SessionError> {
        Ok(self.entries.read().await.get(key).map(|e| e.last_seen))
    }

    async fn touch(&self, key: &str, now: DateTime<Utc>, retain_for: Duration) -> Result<(), SessionError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                last_seen: now,
                expires_at: now + retain_for,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn purge_idle(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn touch_overwrites_previous_activity() {
        let store = InMemorySessionStore::new();
        let t0 = Utc::now();
        store.touch("k", t0, Duration::hours(1)).await.unwrap();
        store.touch("k", t0 + Duration::minutes(5), Duration::hours(1)).await.unwrap();

        assert_eq!(store.last_seen("k").await.unwrap(), Some(t0 + Duration::minutes(5)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn remove_forgets_key() {
        let store = InMemorySessionStore::new();
        store.touch("k", Utc::now(), Duration::hours(1)).await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.last_seen("k").await.unwrap(), None);
    }
}
