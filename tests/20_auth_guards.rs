mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{error_code, TestApp};

use itad_api::auth::Role;
use itad_api::session::session_key;

#[tokio::test]
async fn protected_route_requires_token() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/auth/whoami", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "UNAUTHORIZED");
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let app = TestApp::new();
    let (status, _) = app.get("/api/auth/whoami", Some("not.a.jwt")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = TestApp::new();
    let subject = TestApp::subject(Role::Manager, "ACME");
    let token = app.token_at(&subject, Utc::now() - Duration::hours(24));

    let (status, _) = app.get("/api/auth/whoami", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_echoes_claims() {
    let app = TestApp::new();
    let subject = TestApp::subject(Role::Technician, "ACME");
    let token = app.token_for(&subject);

    let (status, body) = app.get("/api/auth/whoami", Some(&token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["client_id"], "ACME");
    assert_eq!(body["data"]["role"], "Technician");
    assert_eq!(body["data"]["is_admin"], false);
    assert_eq!(body["data"]["id"], subject.user_id.to_string());
}

#[tokio::test]
async fn token_without_client_is_rejected() {
    let app = TestApp::new();
    let subject = TestApp::subject(Role::Administrator, "  ");
    let token = app.token_for(&subject);

    let (status, _) = app.get("/api/auth/whoami", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn idle_session_expires() {
    let app = TestApp::new();
    let subject = TestApp::subject(Role::Manager, "ACME");
    let token = app.token_for(&subject);
    let key = session_key(&subject.client_id, subject.user_id);
    app.state
        .sessions
        .begin(&key, Utc::now() - Duration::hours(2))
        .await
        .unwrap();

    let (status, body) = app.get("/api/auth/whoami", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "SESSION_EXPIRED");

    // The stale entry is gone, so the next request opens a fresh window
    let (status, _) = app.get("/api/auth/whoami", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn expired_password_only_reaches_auth_routes() {
    let app = TestApp::new();
    let mut subject = TestApp::subject(Role::Manager, "ACME");
    subject.password_expired = true;
    let token = app.token_for(&subject);

    let (status, body) = app.get("/api/assets", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "PASSWORD_EXPIRED");

    let (status, body) = app.get("/api/auth/whoami", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["password_expired"], true);
}

#[tokio::test]
async fn admin_routes_deny_other_roles() {
    let app = TestApp::new();
    for role in [Role::Manager, Role::Technician, Role::Client] {
        let token = app.token_for(&TestApp::subject(role, "ACME"));
        let (status, body) = app.get("/api/admin/clients", Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} reached admin route", role);
        assert_eq!(error_code(&body), "FORBIDDEN");
    }
}

#[tokio::test]
async fn cross_tenant_query_is_forbidden() {
    let app = TestApp::new();
    let token = app.token_for(&TestApp::subject(Role::Manager, "ACME"));

    let (status, _) = app.get("/api/assets?client_id=GLOBEX", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
