use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::DatabaseError;
use crate::reports::DateRange;
use crate::tenant::TenantScope;

/// Window for "expiring soon" compliance documents
pub const EXPIRY_WINDOW_DAYS: i32 = 30;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DispositionBreakdown {
    pub disposition: String,
    pub count: i64,
    pub resale_value: Decimal,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AssetTotals {
    pub assets: i64,
    pub data_bearing: i64,
    pub weight_kg: Decimal,
    pub estimated_value: Decimal,
    pub resale_value: Decimal,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LotWeights {
    pub lots: i64,
    pub gross_weight_kg: Decimal,
    pub net_weight_kg: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub client_id: Option<String>,
    pub range: DateRange,
    pub totals: AssetTotals,
    pub assets_by_status: Vec<StatusCount>,
    pub dispositions: Vec<DispositionBreakdown>,
    pub shipments_by_status: Vec<StatusCount>,
    pub lot_weights: LotWeights,
    pub open_reverse_requests: i64,
    pub expiring_compliance_documents: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MonthlyIntake {
    pub month: String,
    pub assets: i64,
    pub weight_kg: Decimal,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VendorActivity {
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub shipments: i64,
    pub total_weight_kg: Decimal,
    pub processing_lots: i64,
}

/// Aggregates for the dashboard. `$1` is always the tenant (NULL = all).
pub struct DashboardService<'a> {
    pool: &'a PgPool,
}

impl<'a> DashboardService<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn summary(&self, scope: &TenantScope, range: DateRange) -> Result<DashboardSummary, DatabaseError> {
        let client_id = scope.client_id();
        let (from, to) = (range.from, range.to);

        let totals = sqlx::query_as::<_, AssetTotals>(
            r#"
            SELECT COUNT(*) AS assets,
                   COUNT(*) FILTER (WHERE data_bearing) AS data_bearing,
                   COALESCE(SUM(weight_kg), 0) AS weight_kg,
                   COALESCE(SUM(estimated_value), 0) AS estimated_value,
                   COALESCE(SUM(resale_value), 0) AS resale_value
            FROM assets
            WHERE ($1::text IS NULL OR client_id = $1)
              AND ($2::date IS NULL OR received_date >= $2)
              AND ($3::date IS NULL OR received_date <= $3)
            "#,
        )
        .bind(client_id)
        .bind(from)
        .bind(to)
        .fetch_one(self.pool);

        let assets_by_status = sqlx::query_as::<_, StatusCount>(
            r#"
            SELECT status, COUNT(*) AS count
            FROM assets
            WHERE ($1::text IS NULL OR client_id = $1)
              AND ($2::date IS NULL OR received_date >= $2)
              AND ($3::date IS NULL OR received_date <= $3)
            GROUP BY status
            ORDER BY count DESC, status
            "#,
        )
        .bind(client_id)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool);

        let dispositions = sqlx::query_as::<_, DispositionBreakdown>(
            r#"
            SELECT COALESCE(disposition, 'pending') AS disposition,
                   COUNT(*) AS count,
                   COALESCE(SUM(resale_value), 0) AS resale_value
            FROM assets
            WHERE ($1::text IS NULL OR client_id = $1)
              AND ($2::date IS NULL OR received_date >= $2)
              AND ($3::date IS NULL OR received_date <= $3)
            GROUP BY COALESCE(disposition, 'pending')
            ORDER BY count DESC
            "#,
        )
        .bind(client_id)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool);

        let shipments_by_status = sqlx::query_as::<_, StatusCount>(
            r#"
            SELECT status, COUNT(*) AS count
            FROM shipments
            WHERE ($1::text IS NULL OR client_id = $1)
              AND ($2::date IS NULL OR scheduled_date >= $2)
              AND ($3::date IS NULL OR scheduled_date <= $3)
            GROUP BY status
            ORDER BY count DESC, status
            "#,
        )
        .bind(client_id)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool);

        let lot_weights = sqlx::query_as::<_, LotWeights>(
            r#"
            SELECT COUNT(*) AS lots,
                   COALESCE(SUM(gross_weight_kg), 0) AS gross_weight_kg,
                   COALESCE(SUM(net_weight_kg), 0) AS net_weight_kg
            FROM processing_lots
            WHERE ($1::text IS NULL OR client_id = $1)
              AND ($2::date IS NULL OR start_date >= $2)
              AND ($3::date IS NULL OR start_date <= $3)
            "#,
        )
        .bind(client_id)
        .bind(from)
        .bind(to)
        .fetch_one(self.pool);

        let open_requests = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM reverse_requests
            WHERE ($1::text IS NULL OR client_id = $1)
              AND lower(status) NOT IN ('completed', 'cancelled', 'closed')
            "#,
        )
        .bind(client_id)
        .fetch_one(self.pool);

        let expiring = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM compliance_documents
            WHERE ($1::text IS NULL OR client_id = $1)
              AND expiry_date BETWEEN current_date AND current_date + $2::int
            "#,
        )
        .bind(client_id)
        .bind(EXPIRY_WINDOW_DAYS)
        .fetch_one(self.pool);

        let (totals, assets_by_status, dispositions, shipments_by_status, lot_weights, open_reverse_requests, expiring) =
            futures::try_join!(
                totals,
                assets_by_status,
                dispositions,
                shipments_by_status,
                lot_weights,
                open_requests,
                expiring
            )?;

        Ok(DashboardSummary {
            client_id: client_id.map(str::to_string),
            range,
            totals,
            assets_by_status,
            dispositions,
            shipments_by_status,
            lot_weights,
            open_reverse_requests,
            expiring_compliance_documents: expiring,
        })
    }

    /// Assets received per calendar month, oldest first, including the current month
    pub async fn intake(&self, scope: &TenantScope, months: i32) -> Result<Vec<MonthlyIntake>, DatabaseError> {
        let months = months.clamp(1, 36);
        let rows = sqlx::query_as::<_, MonthlyIntake>(
            r#"
            SELECT to_char(m.month, 'YYYY-MM') AS month,
                   COUNT(a.id) AS assets,
                   COALESCE(SUM(a.weight_kg), 0) AS weight_kg
            FROM generate_series(
                     date_trunc('month', current_date) - make_interval(months => $2::int - 1),
                     date_trunc('month', current_date),
                     interval '1 month'
                 ) AS m(month)
            LEFT JOIN assets a
                   ON date_trunc('month', a.received_date) = m.month
                  AND ($1::text IS NULL OR a.client_id = $1)
            GROUP BY m.month
            ORDER BY m.month
            "#,
        )
        .bind(scope.client_id())
        .bind(months)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn vendors(&self, scope: &TenantScope) -> Result<Vec<VendorActivity>, DatabaseError> {
        let rows = sqlx::query_as::<_, VendorActivity>(VENDOR_ACTIVITY_SQL)
            .bind(scope.client_id())
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }
}

/// Every join repeats the vendor's client so activity never crosses tenants
const VENDOR_ACTIVITY_SQL: &str = r#"
    SELECT v.id AS vendor_id,
           v.name AS vendor_name,
           COUNT(DISTINCT s.id) AS shipments,
           COALESCE((
               SELECT SUM(s2.total_weight_kg)
               FROM shipments s2
               WHERE s2.vendor_id = v.id AND s2.client_id = v.client_id
           ), 0) AS total_weight_kg,
           COUNT(DISTINCT l.id) AS processing_lots
    FROM vendors v
    LEFT JOIN shipments s ON s.vendor_id = v.id AND s.client_id = v.client_id
    LEFT JOIN processing_lots l ON l.vendor_id = v.id AND l.client_id = v.client_id
    WHERE ($1::text IS NULL OR v.client_id = $1)
    GROUP BY v.id, v.name
    ORDER BY shipments DESC, v.name
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_activity_joins_stay_within_the_vendor_client() {
        for alias in ["s", "s2", "l"] {
            let condition = format!("{}.client_id = v.client_id", alias);
            assert!(VENDOR_ACTIVITY_SQL.contains(&condition), "missing {}", condition);
        }
    }
}
