use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduledReport {
    pub id: Uuid,
    pub client_id: String,
    pub name: String,
    pub report_kind: String,
    pub frequency: String,
    pub time_of_day: NaiveTime,
    pub day_of_week: Option<i32>,
    pub day_of_month: Option<i32>,
    pub parameters: serde_json::Value,
    pub recipients: Vec<String>,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
