pub mod auth;
pub mod response;
pub mod session_timeout;

pub use auth::{jwt_auth_middleware, password_expiry_middleware, require_admin_middleware, AuthUser};
pub use response::{ApiResponse, ApiResult};
pub use session_timeout::session_timeout_middleware;
