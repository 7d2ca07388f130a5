pub mod manager;
pub mod models;
pub mod query_builder;
pub mod repository;
pub mod value;

pub use manager::{DatabaseError, DatabaseManager};
pub use repository::{ListParams, TenantRepository, WriteMode};
pub use value::SqlValue;
