//! Next-run calculation for scheduled reports.
//!
//! All times are UTC. A schedule fires at `time_of_day` on every day
//! (daily), on one weekday (weekly) or on one day of the month (monthly).
//! Months shorter than the requested day fire on their last day.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Unknown frequency '{0}' (expected daily, weekly or monthly)")]
    UnknownFrequency(String),

    #[error("Weekly schedules need day_of_week")]
    MissingWeekday,

    #[error("day_of_week must be 0 (Sunday) to 6 (Saturday), got {0}")]
    InvalidWeekday(i32),

    #[error("Monthly schedules need day_of_month")]
    MissingDayOfMonth,

    #[error("day_of_month must be between 1 and 31, got {0}")]
    InvalidDayOfMonth(i32),

    #[error("Invalid time of day '{0}' (expected HH:MM)")]
    InvalidTime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(ScheduleError::UnknownFrequency(other.to_string())),
        }
    }
}

/// Parse `HH:MM` or `HH:MM:SS`
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ScheduleError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ScheduleError::InvalidTime(s.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Daily { at: NaiveTime },
    Weekly { at: NaiveTime, weekday: Weekday },
    Monthly { at: NaiveTime, day: u32 },
}

impl Schedule {
    /// Build from stored columns. `day_of_week` counts from Sunday = 0.
    /// Fields the frequency does not use are ignored.
    pub fn new(
        frequency: Frequency,
        at: NaiveTime,
        day_of_week: Option<i32>,
        day_of_month: Option<i32>,
    ) -> Result<Self, ScheduleError> {
        match frequency {
            Frequency::Daily => Ok(Schedule::Daily { at }),
            Frequency::Weekly => {
                let dow = day_of_week.ok_or(ScheduleError::MissingWeekday)?;
                let weekday = match dow {
                    0 => Weekday::Sun,
                    1 => Weekday::Mon,
                    2 => Weekday::Tue,
                    3 => Weekday::Wed,
                    4 => Weekday::Thu,
                    5 => Weekday::Fri,
                    6 => Weekday::Sat,
                    other => return Err(ScheduleError::InvalidWeekday(other)),
                };
                Ok(Schedule::Weekly { at, weekday })
            }
            Frequency::Monthly => {
                let dom = day_of_month.ok_or(ScheduleError::MissingDayOfMonth)?;
                if !(1..=31).contains(&dom) {
                    return Err(ScheduleError::InvalidDayOfMonth(dom));
                }
                Ok(Schedule::Monthly { at, day: dom as u32 })
            }
        }
    }

    pub fn parse(
        frequency: &str,
        time_of_day: &str,
        day_of_week: Option<i32>,
        day_of_month: Option<i32>,
    ) -> Result<Self, ScheduleError> {
        Self::new(frequency.parse()?, parse_time_of_day(time_of_day)?, day_of_week, day_of_month)
    }

    pub fn frequency(&self) -> Frequency {
        match self {
            Schedule::Daily { .. } => Frequency::Daily,
            Schedule::Weekly { .. } => Frequency::Weekly,
            Schedule::Monthly { .. } => Frequency::Monthly,
        }
    }

    /// First firing strictly after `after`
    pub fn next_run(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let today = after.date_naive();
        match *self {
            Schedule::Daily { at } => {
                let candidate = at_time(today, at);
                if candidate > after {
                    candidate
                } else {
                    at_time(today + Duration::days(1), at)
                }
            }
            Schedule::Weekly { at, weekday } => {
                let ahead = (7 + weekday.num_days_from_monday() as i64
                    - today.weekday().num_days_from_monday() as i64)
                    % 7;
                let candidate = at_time(today + Duration::days(ahead), at);
                if candidate > after {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
            Schedule::Monthly { at, day } => {
                let (year, month) = (today.year(), today.month());
                let candidate = at_time(clamped_day(year, month, day), at);
                if candidate > after {
                    candidate
                } else {
                    let (year, month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                    at_time(clamped_day(year, month, day), at)
                }
            }
        }
    }
}

fn at_time(date: NaiveDate, at: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(at))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn clamped_day(year: i32, month: u32, day: u32) -> NaiveDate {
    let day = day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}
