pub mod client;
pub mod scheduled_report;
pub mod user;

pub use client::Client;
pub use scheduled_report::ScheduledReport;
pub use user::User;
