pub mod client;
pub mod schedule;
pub mod user;
