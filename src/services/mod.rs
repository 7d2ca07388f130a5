pub mod auth_service;
pub mod client_service;
pub mod custody_service;
pub mod dashboard_service;
pub mod report_service;
pub mod user_service;

pub use auth_service::AuthService;
pub use client_service::ClientService;
pub use custody_service::CustodyService;
pub use dashboard_service::DashboardService;
pub use report_service::ReportService;
pub use user_service::UserService;
