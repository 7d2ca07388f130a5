//! Ad-hoc report generation and scheduled-report timing.

pub mod generate;
pub mod schedule;

pub use generate::{generate, DateRange, GeneratedReport, ReportKind};
pub use schedule::{Frequency, Schedule, ScheduleError};
