use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_json;
use crate::cli::OutputFormat;
use crate::reports::Schedule;

#[derive(Subcommand)]
pub enum ScheduleCommands {
    #[command(about = "Show the next firings of a schedule")]
    NextRun {
        #[arg(help = "daily, weekly or monthly")]
        frequency: String,

        #[arg(help = "Time of day, HH:MM (UTC)")]
        time_of_day: String,

        #[arg(long, help = "Weekly only: 0 = Sunday .. 6 = Saturday")]
        day_of_week: Option<i32>,

        #[arg(long, help = "Monthly only: 1..31, clamped to the month's last day")]
        day_of_month: Option<i32>,

        #[arg(long, help = "Start instant (RFC 3339); defaults to now")]
        after: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

pub fn handle(cmd: ScheduleCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ScheduleCommands::NextRun {
            frequency,
            time_of_day,
            day_of_week,
            day_of_month,
            after,
            count,
        } => {
            let schedule = Schedule::parse(&frequency, &time_of_day, day_of_week, day_of_month)?;
            let runs = upcoming(&schedule, after.unwrap_or_else(Utc::now), count);

            match output_format {
                OutputFormat::Json => output_json(&json!({ "frequency": schedule.frequency().as_str(), "runs": runs })),
                OutputFormat::Text => {
                    for run in runs {
                        println!("{}", run.to_rfc3339());
                    }
                    Ok(())
                }
            }
        }
    }
}

fn upcoming(schedule: &Schedule, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
    let mut runs = Vec::with_capacity(count);
    let mut cursor = after;
    for _ in 0..count.max(1) {
        cursor = schedule.next_run(cursor);
        runs.push(cursor);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn upcoming_lists_consecutive_daily_runs() {
        let schedule = Schedule::parse("daily", "06:00", None, None).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap();
        let runs = upcoming(&schedule, after, 2);
        assert_eq!(
            runs,
            vec![
                Utc.with_ymd_and_hms(2024, 3, 2, 6, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 3, 6, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn upcoming_returns_at_least_one_run() {
        let schedule = Schedule::parse("daily", "06:00", None, None).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap();
        assert_eq!(upcoming(&schedule, after, 0).len(), 1);
    }
}
