use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::query_builder::{fetch_records, QueryBuilder};
use crate::database::repository::{insert_sql, prepare_values, update_sql, WriteMode};
use crate::database::{DatabaseError, SqlValue};
use crate::filter::{FilterData, SqlResult};
use crate::resources::{ColumnDef, ASSETS, CHAIN_OF_CUSTODY};
use crate::tenant::TenantScope;

#[derive(Debug, Clone, Serialize)]
pub struct CustodyTransfer {
    pub event: Value,
    pub asset: Value,
}

/// Chain-of-custody trail for assets
pub struct CustodyService<'a> {
    pool: &'a PgPool,
}

impl<'a> CustodyService<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append a custody event and move the asset to the event's location
    /// and status, in one transaction. The event lands in the asset's own
    /// tenant whatever scope the caller used to reach it.
    pub async fn record_event(
        &self,
        scope: &TenantScope,
        asset_id: Uuid,
        body: &Value,
        now: DateTime<Utc>,
    ) -> Result<CustodyTransfer, DatabaseError> {
        let mut event = body.as_object().cloned().ok_or_else(|| {
            DatabaseError::validation([("body".to_string(), "Expected a JSON object".to_string())].into())
        })?;

        let predicate = QueryBuilder::new(&ASSETS, scope.clone())
            .where_id(asset_id)?
            .into_filter()
            .to_where_sql()?;

        let mut tx = self.pool.begin().await?;

        let locked = SqlResult {
            query: format!("SELECT to_jsonb(t) AS record FROM \"{}\" t WHERE {} FOR UPDATE", ASSETS.table, predicate.query),
            params: predicate.params.clone(),
        };
        let asset = fetch_records(&mut *tx, locked)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::NotFound(format!("{} {} not found", ASSETS.label, asset_id)))?;
        let client_id = asset
            .get("client_id")
            .and_then(Value::as_str)
            .ok_or_else(|| DatabaseError::QueryError("asset row has no client_id".to_string()))?
            .to_string();

        event.insert("asset_id".to_string(), json!(asset_id.to_string()));
        if !event.contains_key("from_location") {
            event.insert("from_location".to_string(), asset.get("location").cloned().unwrap_or(Value::Null));
        }
        if !event.contains_key("event_at") {
            event.insert("event_at".to_string(), json!(now.to_rfc3339()));
        }
        let values = prepare_values(&CHAIN_OF_CUSTODY, &Value::Object(event), WriteMode::Create)?;
        let asset_update = asset_changes(&values);

        let event = fetch_records(&mut *tx, insert_sql(&CHAIN_OF_CUSTODY, &client_id, values))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::QueryError("custody insert returned no row".to_string()))?;

        let asset = if asset_update.is_empty() {
            asset
        } else {
            fetch_records(&mut *tx, update_sql(&ASSETS, predicate, asset_update))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DatabaseError::NotFound(format!("{} {} not found", ASSETS.label, asset_id)))?
        };

        tx.commit().await?;

        tracing::info!(
            client_id = %client_id,
            asset_id = %asset_id,
            status = ?asset.get("status"),
            location = ?asset.get("location"),
            "Custody transfer recorded"
        );
        Ok(CustodyTransfer { event, asset })
    }

    /// Events for one asset, oldest first
    pub async fn trail(&self, scope: &TenantScope, asset_id: Uuid, max_limit: i64) -> Result<Vec<Value>, DatabaseError> {
        let asset = QueryBuilder::new(&ASSETS, scope.clone())
            .where_id(asset_id)?
            .select_optional(self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("{} {} not found", ASSETS.label, asset_id)))?;
        let client_id = asset.get("client_id").and_then(Value::as_str).unwrap_or_default();

        QueryBuilder::new(&CHAIN_OF_CUSTODY, TenantScope::tenant(client_id))
            .filter(
                FilterData {
                    where_clause: Some(json!({ "asset_id": asset_id.to_string() })),
                    order: Some(json!("event_at asc")),
                    limit: Some(max_limit),
                    ..Default::default()
                },
                max_limit,
            )?
            .select_all(self.pool)
            .await
    }
}

/// Asset columns a custody event moves: `to_location` becomes the asset's
/// location and the event status its status.
fn asset_changes(event_values: &[(&'static ColumnDef, SqlValue)]) -> Vec<(&'static ColumnDef, SqlValue)> {
    let mut changes = Vec::new();
    for (column, value) in event_values {
        let target = match column.name {
            "to_location" if !value.is_null() => ASSETS.column("location"),
            "status" => ASSETS.column("status"),
            _ => None,
        };
        if let Some(target) = target {
            changes.push((target, value.clone()));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_moves_location_and_status() {
        let values = prepare_values(
            &CHAIN_OF_CUSTODY,
            &json!({
                "asset_id": Uuid::nil().to_string(),
                "status": "in_transit",
                "to_location": "Warehouse B",
                "handler": "Dana"
            }),
            WriteMode::Create,
        )
        .unwrap();

        let changes = asset_changes(&values);
        let names: Vec<_> = changes.iter().map(|(c, _)| c.name).collect();
        assert_eq!(changes.len(), 2);
        assert!(names.contains(&"location"));
        assert!(names.contains(&"status"));
        assert!(changes.iter().any(|(_, v)| *v == SqlValue::text("Warehouse B")));
    }

    #[test]
    fn empty_destination_keeps_location() {
        let values = prepare_values(
            &CHAIN_OF_CUSTODY,
            &json!({ "asset_id": Uuid::nil().to_string(), "status": "audited", "to_location": null }),
            WriteMode::Create,
        )
        .unwrap();
        let changes = asset_changes(&values);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0.name, "status");
    }
}
