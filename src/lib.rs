pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod reports;
pub mod resources;
pub mod services;
pub mod session;
pub mod state;
pub mod tenant;
pub mod uploads;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::state::AppState;

/// Multipart framing on top of the file payload itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.api.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let cors = cors_layer(&state.config);

    let protected = protected_routes()
        .merge(admin_routes())
        .route_layer(from_fn(middleware::password_expiry_middleware))
        .route_layer(from_fn_with_state(state.clone(), middleware::session_timeout_middleware))
        .route_layer(from_fn_with_state(state.clone(), middleware::jwt_auth_middleware));

    Router::new()
        .merge(public_routes())
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    use handlers::public::{auth, health, root};

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/confirm-email", post(auth::confirm_email))
        .route("/auth/resend-confirmation", post(auth::resend_confirmation))
}

fn protected_routes() -> Router<AppState> {
    use handlers::protected::{auth, custody, dashboard, data, files, find, reports};

    Router::new()
        // Session
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/auth/change-password", post(auth::change_password))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        // Search
        .route("/api/find/:resource", post(find::find_post))
        // Chain of custody
        .route("/api/assets/:id/custody", get(custody::trail).post(custody::record))
        // Documents
        .route("/api/files/:resource/:id", get(files::list))
        .route(
            "/api/files/:resource/:id/:slot",
            get(files::download)
                .post(files::upload)
                .put(files::replace)
                .delete(files::remove),
        )
        // Dashboard
        .route("/api/dashboard/summary", get(dashboard::summary))
        .route("/api/dashboard/intake", get(dashboard::intake))
        .route("/api/dashboard/vendors", get(dashboard::vendors))
        // Reports
        .route(
            "/api/reports/scheduled",
            get(reports::scheduled_list).post(reports::scheduled_create),
        )
        .route("/api/reports/scheduled/due", get(reports::scheduled_due))
        .route(
            "/api/reports/scheduled/:id",
            get(reports::scheduled_get)
                .put(reports::scheduled_update)
                .delete(reports::scheduled_delete),
        )
        .route("/api/reports/scheduled/:id/run", post(reports::scheduled_run))
        .route("/api/reports/:kind", get(reports::generate))
        // Resource CRUD
        .route("/api/:resource", get(data::list).post(data::create))
        .route(
            "/api/:resource/:id",
            get(data::get).put(data::update).delete(data::delete),
        )
}

fn admin_routes() -> Router<AppState> {
    use handlers::elevated::{clients, users};

    Router::new()
        .route("/api/admin/clients", get(clients::list).post(clients::create))
        .route(
            "/api/admin/clients/:id",
            get(clients::get).put(clients::update).delete(clients::delete),
        )
        .route("/api/admin/users", get(users::list))
        .route("/api/admin/users/:id/unlock", post(users::unlock))
        .route("/api/admin/users/:id/role", put(users::set_role))
        .route("/api/admin/users/:id/active", put(users::set_active))
        .route_layer(from_fn(middleware::require_admin_middleware))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.is_development() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
