mod common;

use axum::http::StatusCode;
use common::{error_code, TestApp};

#[tokio::test]
async fn root_describes_service_and_resources() {
    let app = TestApp::new();
    let (status, body) = app.get("/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let resources = body["data"]["resources"].as_array().expect("resource list");
    assert_eq!(resources.len(), 8);
    assert!(resources.iter().any(|r| r == "chain-of-custody"));
}

#[tokio::test]
async fn health_reports_unreachable_database() {
    let app = TestApp::new();
    let (status, body) = app.get("/health", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&body), "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn login_rejects_malformed_json() {
    let app = TestApp::new();
    let (status, body) = app.post_json("/auth/login", None, "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_JSON");
}

#[tokio::test]
async fn register_rejects_missing_fields() {
    let app = TestApp::new();
    let (status, body) = app.post_json("/auth/register", None, r#"{"email":"a@b.co"}"#).await;

    assert!(status.is_client_error(), "unexpected status {}", status);
    assert!(body["error"].as_bool().unwrap_or(false));
}
