use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;
use std::str::FromStr;
use uuid::Uuid;

use crate::resources::{ColumnDef, ColumnKind};

/// A bind parameter already converted to the column's SQL type.
/// Nulls keep their type so Postgres never has to guess one.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Integer(Option<i32>),
    Decimal(Option<Decimal>),
    Boolean(Option<bool>),
    Uuid(Option<Uuid>),
    Date(Option<NaiveDate>),
    Timestamp(Option<DateTime<Utc>>),
}

impl SqlValue {
    pub fn null(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Text => SqlValue::Text(None),
            ColumnKind::Integer => SqlValue::Integer(None),
            ColumnKind::Decimal => SqlValue::Decimal(None),
            ColumnKind::Boolean => SqlValue::Boolean(None),
            ColumnKind::Uuid => SqlValue::Uuid(None),
            ColumnKind::Date => SqlValue::Date(None),
            ColumnKind::Timestamp => SqlValue::Timestamp(None),
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        SqlValue::Text(Some(s.into()))
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            SqlValue::Text(None)
                | SqlValue::Integer(None)
                | SqlValue::Decimal(None)
                | SqlValue::Boolean(None)
                | SqlValue::Uuid(None)
                | SqlValue::Date(None)
                | SqlValue::Timestamp(None)
        )
    }

    /// Convert a JSON value into the column's type. Strings are accepted for
    /// every kind so query-string filters coerce the same way bodies do.
    pub fn coerce(column: &ColumnDef, value: &Value) -> Result<Self, String> {
        if value.is_null() {
            return Ok(Self::null(column.kind));
        }

        match column.kind {
            ColumnKind::Text => match value {
                Value::String(s) => Ok(SqlValue::Text(Some(s.clone()))),
                Value::Number(n) => Ok(SqlValue::Text(Some(n.to_string()))),
                Value::Bool(b) => Ok(SqlValue::Text(Some(b.to_string()))),
                _ => Err("expected a string".to_string()),
            },
            ColumnKind::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .and_then(|i| i32::try_from(i).ok())
                    .map(|i| SqlValue::Integer(Some(i)))
                    .ok_or_else(|| "expected a whole number".to_string()),
                Value::String(s) => s
                    .trim()
                    .parse::<i32>()
                    .map(|i| SqlValue::Integer(Some(i)))
                    .map_err(|_| "expected a whole number".to_string()),
                _ => Err("expected a whole number".to_string()),
            },
            ColumnKind::Decimal => {
                let parsed = match value {
                    Value::Number(n) => Decimal::from_str(&n.to_string())
                        .or_else(|_| Decimal::from_scientific(&n.to_string())),
                    Value::String(s) => Decimal::from_str(s.trim()),
                    _ => return Err("expected a number".to_string()),
                };
                parsed
                    .map(|d| SqlValue::Decimal(Some(d)))
                    .map_err(|_| "expected a number".to_string())
            }
            ColumnKind::Boolean => match value {
                Value::Bool(b) => Ok(SqlValue::Boolean(Some(*b))),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(SqlValue::Boolean(Some(true))),
                    "false" | "0" | "no" => Ok(SqlValue::Boolean(Some(false))),
                    _ => Err("expected true or false".to_string()),
                },
                _ => Err("expected true or false".to_string()),
            },
            ColumnKind::Uuid => match value {
                Value::String(s) => Uuid::parse_str(s.trim())
                    .map(|u| SqlValue::Uuid(Some(u)))
                    .map_err(|_| format!("Invalid UUID format: {}", s)),
                _ => Err("expected a UUID string".to_string()),
            },
            ColumnKind::Date => match value {
                Value::String(s) => parse_date(s)
                    .map(|d| SqlValue::Date(Some(d)))
                    .ok_or_else(|| format!("Invalid date format: {} (expected YYYY-MM-DD)", s)),
                _ => Err("expected a date string".to_string()),
            },
            ColumnKind::Timestamp => match value {
                Value::String(s) => parse_timestamp(s)
                    .map(|t| SqlValue::Timestamp(Some(t)))
                    .ok_or_else(|| format!("Invalid timestamp format: {}", s)),
                _ => Err("expected an RFC 3339 timestamp".to_string()),
            },
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|t| t.date_naive()))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    // Bare dates filter from midnight UTC
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

pub fn bind(q: Query<'_, Postgres, PgArguments>, value: SqlValue) -> Query<'_, Postgres, PgArguments> {
    match value {
        SqlValue::Text(v) => q.bind(v),
        SqlValue::Integer(v) => q.bind(v),
        SqlValue::Decimal(v) => q.bind(v),
        SqlValue::Boolean(v) => q.bind(v),
        SqlValue::Uuid(v) => q.bind(v),
        SqlValue::Date(v) => q.bind(v),
        SqlValue::Timestamp(v) => q.bind(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(kind: ColumnKind) -> ColumnDef {
        ColumnDef::new("field", kind)
    }

    #[test]
    fn coerces_strings_for_every_kind() {
        assert_eq!(SqlValue::coerce(&col(ColumnKind::Integer), &json!("42")).unwrap(), SqlValue::Integer(Some(42)));
        assert_eq!(SqlValue::coerce(&col(ColumnKind::Boolean), &json!("yes")).unwrap(), SqlValue::Boolean(Some(true)));
        assert_eq!(
            SqlValue::coerce(&col(ColumnKind::Decimal), &json!("12.50")).unwrap(),
            SqlValue::Decimal(Some(Decimal::new(1250, 2)))
        );
        assert_eq!(
            SqlValue::coerce(&col(ColumnKind::Date), &json!("2024-02-29")).unwrap(),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29))
        );
    }

    #[test]
    fn numbers_coerce_to_decimal() {
        assert_eq!(
            SqlValue::coerce(&col(ColumnKind::Decimal), &json!(3.25)).unwrap(),
            SqlValue::Decimal(Some(Decimal::new(325, 2)))
        );
    }

    #[test]
    fn nulls_keep_their_type() {
        let v = SqlValue::coerce(&col(ColumnKind::Date), &Value::Null).unwrap();
        assert_eq!(v, SqlValue::Date(None));
        assert!(v.is_null());
    }

    #[test]
    fn rejects_mismatched_values() {
        assert!(SqlValue::coerce(&col(ColumnKind::Integer), &json!("ten")).is_err());
        assert!(SqlValue::coerce(&col(ColumnKind::Integer), &json!(1.5)).is_err());
        assert!(SqlValue::coerce(&col(ColumnKind::Uuid), &json!("not-a-uuid")).is_err());
        assert!(SqlValue::coerce(&col(ColumnKind::Date), &json!("31/12/2024")).is_err());
        assert!(SqlValue::coerce(&col(ColumnKind::Text), &json!({"a": 1})).is_err());
    }

    #[test]
    fn bare_dates_are_midnight_timestamps() {
        let v = SqlValue::coerce(&col(ColumnKind::Timestamp), &json!("2024-05-01")).unwrap();
        match v {
            SqlValue::Timestamp(Some(t)) => assert_eq!(t.to_rfc3339(), "2024-05-01T00:00:00+00:00"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
