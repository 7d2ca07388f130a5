use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::fmt;
use std::str::FromStr;

use crate::database::query_builder::fetch_records;
use crate::database::{DatabaseError, SqlValue};
use crate::filter::SqlResult;
use crate::tenant::TenantScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    AssetInventory,
    DispositionSummary,
    ShipmentSummary,
    Certificates,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::AssetInventory => "asset-inventory",
            ReportKind::DispositionSummary => "disposition-summary",
            ReportKind::ShipmentSummary => "shipment-summary",
            ReportKind::Certificates => "certificates",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "asset-inventory" => Ok(ReportKind::AssetInventory),
            "disposition-summary" => Ok(ReportKind::DispositionSummary),
            "shipment-summary" => Ok(ReportKind::ShipmentSummary),
            "certificates" => Ok(ReportKind::Certificates),
            other => Err(format!("Unknown report '{}'", other)),
        }
    }
}

/// Inclusive date range; either end may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_valid(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport {
    pub kind: ReportKind,
    pub client_id: Option<String>,
    pub range: DateRange,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<Value>,
}

/// Build the aggregate for `kind`. `$1` is the tenant (NULL for all),
/// `$2`/`$3` the range bounds.
pub fn report_sql(kind: ReportKind, scope: &TenantScope, range: DateRange) -> SqlResult {
    let query = match kind {
        ReportKind::AssetInventory => {
            r#"
            SELECT jsonb_build_object(
                'category', category,
                'status', status,
                'count', COUNT(*),
                'data_bearing', COUNT(*) FILTER (WHERE data_bearing),
                'weight_kg', COALESCE(SUM(weight_kg), 0),
                'estimated_value', COALESCE(SUM(estimated_value), 0)
            ) AS record
            FROM assets
            WHERE ($1::text IS NULL OR client_id = $1)
              AND ($2::date IS NULL OR received_date >= $2)
              AND ($3::date IS NULL OR received_date <= $3)
            GROUP BY category, status
            ORDER BY category, status
            "#
        }
        ReportKind::DispositionSummary => {
            r#"
            SELECT jsonb_build_object(
                'disposition', COALESCE(disposition, 'pending'),
                'count', COUNT(*),
                'weight_kg', COALESCE(SUM(weight_kg), 0),
                'resale_value', COALESCE(SUM(resale_value), 0)
            ) AS record
            FROM assets
            WHERE ($1::text IS NULL OR client_id = $1)
              AND ($2::date IS NULL OR disposition_date >= $2)
              AND ($3::date IS NULL OR disposition_date <= $3)
            GROUP BY COALESCE(disposition, 'pending')
            ORDER BY COUNT(*) DESC
            "#
        }
        ReportKind::ShipmentSummary => {
            r#"
            SELECT jsonb_build_object(
                'status', status,
                'count', COUNT(*),
                'total_weight_kg', COALESCE(SUM(total_weight_kg), 0),
                'pallet_count', COALESCE(SUM(pallet_count), 0)
            ) AS record
            FROM shipments
            WHERE ($1::text IS NULL OR client_id = $1)
              AND ($2::date IS NULL OR scheduled_date >= $2)
              AND ($3::date IS NULL OR scheduled_date <= $3)
            GROUP BY status
            ORDER BY status
            "#
        }
        ReportKind::Certificates => {
            r#"
            SELECT record FROM (
                SELECT jsonb_build_object(
                    'certificate', 'destruction',
                    'client_id', client_id,
                    'reference', asset_tag,
                    'date', disposition_date,
                    'path', certificate_of_destruction_path
                ) AS record, disposition_date AS issued
                FROM assets
                WHERE certificate_of_destruction_path IS NOT NULL
                  AND ($1::text IS NULL OR client_id = $1)
                  AND ($2::date IS NULL OR disposition_date >= $2)
                  AND ($3::date IS NULL OR disposition_date <= $3)
                UNION ALL
                SELECT jsonb_build_object(
                    'certificate', 'recycling',
                    'client_id', client_id,
                    'reference', lot_number,
                    'date', completion_date,
                    'path', certificate_of_recycling_path
                ), completion_date
                FROM processing_lots
                WHERE certificate_of_recycling_path IS NOT NULL
                  AND ($1::text IS NULL OR client_id = $1)
                  AND ($2::date IS NULL OR completion_date >= $2)
                  AND ($3::date IS NULL OR completion_date <= $3)
            ) certificates
            ORDER BY issued DESC NULLS LAST
            "#
        }
    };

    SqlResult {
        query: query.to_string(),
        params: vec![scope.sql_param(), SqlValue::Date(range.from), SqlValue::Date(range.to)],
    }
}

pub async fn generate(
    pool: &PgPool,
    kind: ReportKind,
    scope: &TenantScope,
    range: DateRange,
) -> Result<GeneratedReport, DatabaseError> {
    let rows = fetch_records(pool, report_sql(kind, scope, range)).await?;
    tracing::info!(report = %kind, client_id = ?scope.client_id(), rows = rows.len(), "Generated report");
    Ok(GeneratedReport {
        kind,
        client_id: scope.client_id().map(str::to_string),
        range,
        generated_at: Utc::now(),
        rows,
    })
}
