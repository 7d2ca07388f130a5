use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::filter::FilterError;

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{message}")]
    Validation {
        message: String,
        field_errors: HashMap<String, String>,
    },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Postgres SQLSTATE for a foreign key violation
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

impl DatabaseError {
    pub fn validation(field_errors: HashMap<String, String>) -> Self {
        DatabaseError::Validation {
            message: "Validation failed".to_string(),
            field_errors,
        }
    }

    /// A foreign key violation raised by a DELETE means the row is still
    /// referenced; report it as a conflict.
    pub fn on_delete(self, label: &str) -> Self {
        match self {
            DatabaseError::Sqlx(sqlx::Error::Database(db))
                if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) =>
            {
                tracing::debug!(constraint = ?db.constraint(), "Delete blocked by reference");
                DatabaseError::Conflict(format!("{} is still referenced by other records", label))
            }
            other => other,
        }
    }
}

/// Owns the shared Postgres pool
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        Self::validate_url(&config.url)?;
        let pool = Self::pool_options(config).connect(&config.url).await?;
        info!(max_connections = config.max_connections, "Connected to database");
        Ok(Self { pool })
    }

    /// Pool that connects on first use. Lets the router start (and tests run)
    /// without a reachable database.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        Self::validate_url(&config.url)?;
        let pool = Self::pool_options(config).connect_lazy(&config.url)?;
        Ok(Self { pool })
    }

    fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }

    fn validate_url(raw: &str) -> Result<(), DatabaseError> {
        if raw.trim().is_empty() {
            return Err(DatabaseError::ConfigMissing("DATABASE_URL"));
        }
        let url = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        match url.scheme() {
            "postgres" | "postgresql" => Ok(()),
            _ => Err(DatabaseError::InvalidDatabaseUrl),
        }
    }
}

/// Database error carrying only a SQLSTATE, for exercising error mapping
#[cfg(test)]
pub(crate) fn sql_state_error(code: &'static str) -> DatabaseError {
    #[derive(Debug)]
    struct SqlState(&'static str);

    impl std::fmt::Display for SqlState {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "error with SQLSTATE {}", self.0)
        }
    }

    impl std::error::Error for SqlState {}

    impl sqlx::error::DatabaseError for SqlState {
        fn message(&self) -> &str {
            "constraint violated"
        }
        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.0.into())
        }
        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }
        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }
        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    DatabaseError::Sqlx(sqlx::Error::Database(Box::new(SqlState(code))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_reference_violation_is_a_conflict() {
        let err = sql_state_error(FOREIGN_KEY_VIOLATION).on_delete("Vendor");
        assert!(matches!(err, DatabaseError::Conflict(ref msg) if msg.starts_with("Vendor")));

        let unique = sql_state_error("23505").on_delete("Vendor");
        assert!(matches!(unique, DatabaseError::Sqlx(_)));
        assert!(matches!(DatabaseError::NotFound("x".into()).on_delete("Vendor"), DatabaseError::NotFound(_)));
    }

    #[test]
    fn accepts_only_postgres_urls() {
        assert!(DatabaseManager::validate_url("postgres://u:p@localhost:5432/itad").is_ok());
        assert!(DatabaseManager::validate_url("postgresql://localhost/itad?sslmode=disable").is_ok());
        assert!(matches!(
            DatabaseManager::validate_url("mysql://localhost/itad"),
            Err(DatabaseError::InvalidDatabaseUrl)
        ));
        assert!(matches!(DatabaseManager::validate_url(""), Err(DatabaseError::ConfigMissing(_))));
    }

    #[tokio::test]
    async fn lazy_pool_does_not_connect() {
        let config = crate::config::AppConfig::for_tests();
        assert!(DatabaseManager::connect_lazy(&config.database).is_ok());
    }
}
