use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::models::ScheduledReport;
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::filter::{Page, Pagination};
use crate::reports::{self, DateRange, GeneratedReport, ReportKind, Schedule};
use crate::tenant::TenantScope;

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledReportInput {
    pub name: String,
    pub report_kind: String,
    pub frequency: String,
    pub time_of_day: String,
    pub day_of_week: Option<i32>,
    pub day_of_month: Option<i32>,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update. Schedule fields are merged with the stored ones and
/// re-validated together.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduledReportUpdate {
    pub name: Option<String>,
    pub report_kind: Option<String>,
    pub frequency: Option<String>,
    pub time_of_day: Option<String>,
    pub day_of_week: Option<i32>,
    pub day_of_month: Option<i32>,
    pub parameters: Option<Value>,
    pub recipients: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Range options stored in `parameters`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportParameters {
    #[serde(flatten)]
    pub range: DateRange,
    /// Relative window ending at the run time; wins over `from`/`to`
    pub lookback_days: Option<i64>,
}

impl ReportParameters {
    pub fn from_value(value: &Value) -> Result<Self, ApiError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| ApiError::field_error("parameters", e.to_string()))
    }

    pub fn range_at(&self, now: DateTime<Utc>) -> DateRange {
        match self.lookback_days {
            Some(days) if days > 0 => DateRange {
                from: Some((now - Duration::days(days)).date_naive()),
                to: Some(now.date_naive()),
            },
            _ => self.range,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRun {
    pub schedule: ScheduledReport,
    pub report: GeneratedReport,
}

/// Validated row values shared by create and update
struct ScheduleRow {
    name: String,
    kind: ReportKind,
    schedule: Schedule,
    day_of_week: Option<i32>,
    day_of_month: Option<i32>,
    parameters: Value,
    recipients: Vec<String>,
    is_active: bool,
}

impl ScheduleRow {
    fn validate(
        name: &str,
        report_kind: &str,
        schedule: Schedule,
        day_of_week: Option<i32>,
        day_of_month: Option<i32>,
        parameters: Value,
        recipients: Vec<String>,
        is_active: bool,
    ) -> Result<Self, ApiError> {
        let mut field_errors = HashMap::new();
        if name.trim().is_empty() {
            field_errors.insert("name".to_string(), "Required".to_string());
        }
        let kind = report_kind.parse::<ReportKind>();
        if let Err(message) = &kind {
            field_errors.insert("report_kind".to_string(), message.clone());
        }
        if recipients.iter().any(|r| !r.contains('@')) {
            field_errors.insert("recipients".to_string(), "Every recipient must be an email address".to_string());
        }
        ReportParameters::from_value(&parameters)?;

        match kind {
            Ok(kind) if field_errors.is_empty() => Ok(Self {
                name: name.trim().to_string(),
                kind,
                schedule,
                // Keep only the day field the frequency uses
                day_of_week: matches!(schedule, Schedule::Weekly { .. }).then_some(day_of_week).flatten(),
                day_of_month: matches!(schedule, Schedule::Monthly { .. }).then_some(day_of_month).flatten(),
                parameters,
                recipients,
                is_active,
            }),
            _ => Err(ApiError::validation_error("Invalid scheduled report", Some(field_errors))),
        }
    }

    fn time_of_day(&self) -> chrono::NaiveTime {
        match self.schedule {
            Schedule::Daily { at } | Schedule::Weekly { at, .. } | Schedule::Monthly { at, .. } => at,
        }
    }
}

/// Scheduled report definitions and their on-demand execution
pub struct ReportService<'a> {
    pool: &'a PgPool,
}

impl<'a> ReportService<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, scope: &TenantScope, pagination: Pagination) -> Result<Page<ScheduledReport>, ApiError> {
        let items = sqlx::query_as::<_, ScheduledReport>(
            r#"
            SELECT * FROM scheduled_reports
            WHERE ($1::text IS NULL OR client_id = $1)
            ORDER BY next_run_at NULLS LAST, name
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(scope.client_id())
        .bind(pagination.page_size)
        .bind(pagination.offset())
        .fetch_all(self.pool);
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM scheduled_reports WHERE ($1::text IS NULL OR client_id = $1)",
        )
        .bind(scope.client_id())
        .fetch_one(self.pool);

        let (items, total) = futures::try_join!(items, total).map_err(DatabaseError::from)?;
        Ok(Page::new(items, total, pagination))
    }

    pub async fn get(&self, scope: &TenantScope, id: Uuid) -> Result<ScheduledReport, ApiError> {
        let report = sqlx::query_as::<_, ScheduledReport>(
            "SELECT * FROM scheduled_reports WHERE ($1::text IS NULL OR client_id = $1) AND id = $2",
        )
        .bind(scope.client_id())
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(DatabaseError::from)?;
        report.ok_or_else(|| ApiError::not_found(format!("Scheduled report {} not found", id)))
    }

    pub async fn create(
        &self,
        scope: &TenantScope,
        created_by: Uuid,
        input: ScheduledReportInput,
        now: DateTime<Utc>,
    ) -> Result<ScheduledReport, ApiError> {
        let client_id = scope.require_single()?;
        let schedule = Schedule::parse(&input.frequency, &input.time_of_day, input.day_of_week, input.day_of_month)?;
        let row = ScheduleRow::validate(
            &input.name,
            &input.report_kind,
            schedule,
            input.day_of_week,
            input.day_of_month,
            input.parameters.unwrap_or(Value::Null),
            input.recipients,
            input.is_active,
        )?;
        let next_run_at = row.is_active.then(|| row.schedule.next_run(now));

        let report = sqlx::query_as::<_, ScheduledReport>(
            r#"
            INSERT INTO scheduled_reports (
                client_id, name, report_kind, frequency, time_of_day, day_of_week, day_of_month,
                parameters, recipients, is_active, next_run_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(client_id)
        .bind(&row.name)
        .bind(row.kind.as_str())
        .bind(row.schedule.frequency().as_str())
        .bind(row.time_of_day())
        .bind(row.day_of_week)
        .bind(row.day_of_month)
        .bind(&row.parameters)
        .bind(&row.recipients)
        .bind(row.is_active)
        .bind(next_run_at)
        .bind(created_by)
        .fetch_one(self.pool)
        .await
        .map_err(DatabaseError::from)?;

        tracing::info!(client_id = %report.client_id, report_id = %report.id, next_run_at = ?report.next_run_at, "Scheduled report created");
        Ok(report)
    }

    pub async fn update(
        &self,
        scope: &TenantScope,
        id: Uuid,
        update: ScheduledReportUpdate,
        now: DateTime<Utc>,
    ) -> Result<ScheduledReport, ApiError> {
        let current = self.get(scope, id).await?;

        let frequency = update.frequency.unwrap_or(current.frequency);
        let time_of_day = match update.time_of_day {
            Some(t) => t,
            None => current.time_of_day.format("%H:%M:%S").to_string(),
        };
        let day_of_week = update.day_of_week.or(current.day_of_week);
        let day_of_month = update.day_of_month.or(current.day_of_month);
        let schedule = Schedule::parse(&frequency, &time_of_day, day_of_week, day_of_month)?;

        let row = ScheduleRow::validate(
            update.name.as_deref().unwrap_or(&current.name),
            update.report_kind.as_deref().unwrap_or(&current.report_kind),
            schedule,
            day_of_week,
            day_of_month,
            update.parameters.unwrap_or(current.parameters),
            update.recipients.unwrap_or(current.recipients),
            update.is_active.unwrap_or(current.is_active),
        )?;
        let next_run_at = row.is_active.then(|| row.schedule.next_run(now));

        let report = sqlx::query_as::<_, ScheduledReport>(
            r#"
            UPDATE scheduled_reports SET
                name = $2, report_kind = $3, frequency = $4, time_of_day = $5,
                day_of_week = $6, day_of_month = $7, parameters = $8, recipients = $9,
                is_active = $10, next_run_at = $11, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&row.name)
        .bind(row.kind.as_str())
        .bind(row.schedule.frequency().as_str())
        .bind(row.time_of_day())
        .bind(row.day_of_week)
        .bind(row.day_of_month)
        .bind(&row.parameters)
        .bind(&row.recipients)
        .bind(row.is_active)
        .bind(next_run_at)
        .fetch_one(self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(report)
    }

    pub async fn delete(&self, scope: &TenantScope, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM scheduled_reports WHERE ($1::text IS NULL OR client_id = $1) AND id = $2")
            .bind(scope.client_id())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(DatabaseError::from)?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("Scheduled report {} not found", id)));
        }
        Ok(())
    }

    /// Active definitions whose next run is at or before `now`
    pub async fn due(&self, scope: &TenantScope, now: DateTime<Utc>) -> Result<Vec<ScheduledReport>, ApiError> {
        let due = sqlx::query_as::<_, ScheduledReport>(
            r#"
            SELECT * FROM scheduled_reports
            WHERE ($1::text IS NULL OR client_id = $1)
              AND is_active
              AND next_run_at IS NOT NULL
              AND next_run_at <= $2
            ORDER BY next_run_at
            "#,
        )
        .bind(scope.client_id())
        .bind(now)
        .fetch_all(self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(due)
    }

    /// Generate the report for its own tenant, then record the run and
    /// advance `next_run_at` past `now`.
    pub async fn run(&self, scope: &TenantScope, id: Uuid, now: DateTime<Utc>) -> Result<ReportRun, ApiError> {
        let current = self.get(scope, id).await?;
        let kind = current
            .report_kind
            .parse::<ReportKind>()
            .map_err(|e| ApiError::field_error("report_kind", e))?;
        let schedule = Schedule::parse(
            &current.frequency,
            &current.time_of_day.format("%H:%M:%S").to_string(),
            current.day_of_week,
            current.day_of_month,
        )?;
        let range = ReportParameters::from_value(&current.parameters)?.range_at(now);

        let report = reports::generate(self.pool, kind, &TenantScope::tenant(&current.client_id), range).await?;

        let next_run_at = current.is_active.then(|| schedule.next_run(now));
        let updated = sqlx::query_as::<_, ScheduledReport>(
            "UPDATE scheduled_reports SET last_run_at = $2, next_run_at = $3, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(now)
        .bind(next_run_at)
        .fetch_one(self.pool)
        .await
        .map_err(DatabaseError::from)?;

        tracing::info!(
            client_id = %updated.client_id,
            report_id = %updated.id,
            rows = report.rows.len(),
            next_run_at = ?updated.next_run_at,
            "Scheduled report run"
        );
        Ok(ReportRun { schedule: updated, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn lookback_overrides_fixed_range() {
        let params = ReportParameters::from_value(&json!({"from": "2024-01-01", "lookback_days": 7})).unwrap();
        let range = params.range_at(utc("2024-03-10T12:00:00Z"));
        assert_eq!(range.from, NaiveDate::from_ymd_opt(2024, 3, 3));
        assert_eq!(range.to, NaiveDate::from_ymd_opt(2024, 3, 10));
    }

    #[test]
    fn fixed_range_is_used_without_lookback() {
        let params = ReportParameters::from_value(&json!({"from": "2024-01-01", "to": "2024-01-31"})).unwrap();
        let range = params.range_at(utc("2024-03-10T12:00:00Z"));
        assert_eq!(range.from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(range.to, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(ReportParameters::from_value(&Value::Null).unwrap().range_at(Utc::now()), DateRange::default());
    }

    #[test]
    fn malformed_parameters_are_field_errors() {
        let err = ReportParameters::from_value(&json!({"from": "last tuesday"})).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_json()["field_errors"]["parameters"].is_string());
    }

    #[test]
    fn validation_collects_field_errors() {
        let schedule = Schedule::parse("daily", "08:00", None, None).unwrap();
        let err = ScheduleRow::validate(" ", "profit", schedule, None, None, Value::Null, vec!["nobody".into()], true)
            .err()
            .unwrap();
        let body = err.to_json();
        assert_eq!(body["field_errors"]["name"], "Required");
        assert!(body["field_errors"]["report_kind"].is_string());
        assert!(body["field_errors"]["recipients"].is_string());
    }

    #[test]
    fn unused_day_fields_are_dropped() {
        let schedule = Schedule::parse("weekly", "08:00", Some(2), Some(15)).unwrap();
        let row = ScheduleRow::validate("Weekly", "asset-inventory", schedule, Some(2), Some(15), Value::Null, vec![], true)
            .unwrap();
        assert_eq!(row.day_of_week, Some(2));
        assert_eq!(row.day_of_month, None);
    }
}
