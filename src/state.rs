use chrono::Duration;
use std::sync::Arc;

use crate::auth::password::PasswordHasher;
use crate::auth::{AuthError, JwtKeys};
use crate::config::{AppConfig, SessionBackend};
use crate::database::DatabaseManager;
use crate::session::{InMemorySessionStore, PgSessionStore, SessionStore, SessionTracker};
use crate::uploads::UploadStore;

/// Shared handles passed to every handler through axum's `State`
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseManager,
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub hasher: PasswordHasher,
    pub sessions: SessionTracker,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(config: AppConfig, db: DatabaseManager) -> Result<Self, AuthError> {
        let jwt = JwtKeys::from_config(&config.security)?;
        let hasher = PasswordHasher::new(config.security.password_iterations);

        let store: Arc<dyn SessionStore> = match config.database.session_backend {
            SessionBackend::Memory => Arc::new(InMemorySessionStore::new()),
            SessionBackend::Postgres => Arc::new(PgSessionStore::new(db.pool().clone())),
        };
        let sessions = SessionTracker::new(
            store,
            Duration::minutes(config.security.session_timeout_minutes),
            jwt.lifetime(),
        );
        let uploads = UploadStore::new(config.api.upload_dir.clone(), config.api.max_upload_bytes);

        Ok(Self {
            db,
            config: Arc::new(config),
            jwt,
            hasher,
            sessions,
            uploads,
        })
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        self.db.pool()
    }
}
