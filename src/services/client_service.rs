use serde::Deserialize;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::database::models::Client;
use crate::database::DatabaseError;
use crate::filter::filter_where::escape_like;
use crate::filter::{Page, Pagination};

#[derive(Debug, Clone, Deserialize)]
pub struct NewClient {
    pub id: String,
    pub name: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
}

/// Partial update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

/// Normalise a client code: trimmed, upper-case, `[A-Z0-9_-]`, 2 to 50 chars
pub fn validate_client_id(raw: &str) -> Result<String, DatabaseError> {
    let id = raw.trim().to_ascii_uppercase();
    let valid = (2..=50).contains(&id.len())
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(id)
    } else {
        Err(DatabaseError::validation(HashMap::from([(
            "id".to_string(),
            "Client id must be 2-50 characters of A-Z, 0-9, '_' or '-'".to_string(),
        )])))
    }
}

pub struct ClientService<'a> {
    pool: &'a PgPool,
}

impl<'a> ClientService<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Client, DatabaseError> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1")
            .bind(id.trim().to_ascii_uppercase())
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Client {} not found", id)))
    }

    pub async fn list(&self, search: Option<&str>, pagination: Pagination) -> Result<Page<Client>, DatabaseError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        let clients = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients WHERE ($1::text IS NULL OR id ILIKE $1 OR name ILIKE $1) ORDER BY name LIMIT $2 OFFSET $3",
        )
        .bind(pattern.as_deref())
        .bind(pagination.page_size)
        .bind(pagination.offset())
        .fetch_all(self.pool);
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM clients WHERE ($1::text IS NULL OR id ILIKE $1 OR name ILIKE $1)",
        )
        .bind(pattern.as_deref())
        .fetch_one(self.pool);
        let (clients, total) = futures::try_join!(clients, total)?;

        Ok(Page::new(clients, total, pagination))
    }

    pub async fn create(&self, new_client: NewClient) -> Result<Client, DatabaseError> {
        let id = validate_client_id(&new_client.id)?;
        if new_client.name.trim().is_empty() {
            return Err(DatabaseError::validation(HashMap::from([(
                "name".to_string(),
                "Required".to_string(),
            )])));
        }

        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (id, name, contact_name, contact_email, contact_phone, address)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(new_client.name.trim())
        .bind(new_client.contact_name)
        .bind(new_client.contact_email)
        .bind(new_client.contact_phone)
        .bind(new_client.address)
        .fetch_one(self.pool)
        .await?;

        tracing::info!(client_id = %client.id, "Client created");
        Ok(client)
    }

    pub async fn update(&self, id: &str, update: ClientUpdate) -> Result<Client, DatabaseError> {
        if matches!(update.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(DatabaseError::validation(HashMap::from([(
                "name".to_string(),
                "Required".to_string(),
            )])));
        }

        sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients SET
                name = COALESCE($2, name),
                contact_name = COALESCE($3, contact_name),
                contact_email = COALESCE($4, contact_email),
                contact_phone = COALESCE($5, contact_phone),
                address = COALESCE($6, address),
                is_active = COALESCE($7, is_active),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.trim().to_ascii_uppercase())
        .bind(update.name.map(|n| n.trim().to_string()))
        .bind(update.contact_name)
        .bind(update.contact_email)
        .bind(update.contact_phone)
        .bind(update.address)
        .bind(update.is_active)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Client {} not found", id)))
    }

    /// Fails with a conflict while users or records still reference the client
    pub async fn delete(&self, id: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id.trim().to_ascii_uppercase())
            .execute(self.pool)
            .await
            .map_err(|e| DatabaseError::from(e).on_delete(&format!("Client {}", id)))?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Client {} not found", id)));
        }
        tracing::info!(client_id = %id, "Client deleted");
        Ok(())
    }
}
