//! Suites that need Postgres. Each test returns early unless
//! `TEST_DATABASE_URL` names a database the tests may migrate and write.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{error_code, TestApp};
use serde_json::{json, Value};

use itad_api::auth::Role;
use itad_api::config::SessionBackend;
use itad_api::session::session_key;

macro_rules! database_app {
    ($configure:expr) => {
        match TestApp::with_database($configure).await {
            Some(app) => app,
            None => return,
        }
    };
    () => {
        database_app!(|_| {})
    };
}

fn id_of(body: &Value) -> String {
    body["data"]["id"].as_str().expect("record id").to_string()
}

async fn create(app: &TestApp, token: &str, uri: &str, body: Value) -> String {
    let (status, created) = app.post_json(uri, Some(token), &body.to_string()).await;
    assert_eq!(status, StatusCode::CREATED, "{} rejected: {}", uri, created);
    id_of(&created)
}

#[tokio::test]
async fn references_to_another_clients_records_are_rejected() {
    let app = database_app!();
    let acme = app.seed_client("ACME").await;
    let globex = app.seed_client("GLOBEX").await;
    let acme_token = app.token_for(&TestApp::subject(Role::Manager, &acme));
    let globex_token = app.token_for(&TestApp::subject(Role::Manager, &globex));

    let foreign_vendor = create(&app, &globex_token, "/api/vendors", json!({"name": "Globex Recycling"})).await;

    let body = json!({"shipment_number": "S-100", "status": "scheduled", "vendor_id": foreign_vendor});
    let (status, rejected) = app.post_json("/api/shipments", Some(&acme_token), &body.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&rejected), "VALIDATION_ERROR");
    assert_eq!(rejected["field_errors"]["vendor_id"], "Vendor not found");

    let shipment = create(&app, &acme_token, "/api/shipments", json!({"shipment_number": "S-101", "status": "scheduled"})).await;
    let uri = format!("/api/shipments/{}", shipment);
    let (status, _) = app
        .put_json(&uri, Some(&acme_token), &json!({"vendor_id": foreign_vendor}).to_string())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Administrators see every client, but a record still only links within its own
    let admin_token = app.token_for(&TestApp::subject(Role::Administrator, &acme));
    let (status, _) = app
        .put_json(&uri, Some(&admin_token), &json!({"vendor_id": foreign_vendor}).to_string())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let asset = json!({"asset_tag": "A-1", "category": "laptop", "status": "received", "shipment_id": shipment});
    let (status, _) = app
        .post_json(&format!("/api/assets?client_id={}", globex), Some(&admin_token), &asset.to_string())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let own_vendor = create(&app, &acme_token, "/api/vendors", json!({"name": "Acme Recycling"})).await;
    let (status, updated) = app
        .put_json(&uri, Some(&acme_token), &json!({"vendor_id": own_vendor}).to_string())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["vendor_id"], own_vendor.as_str());
}

#[tokio::test]
async fn schema_refuses_cross_client_links_written_directly() {
    let app = database_app!();
    let acme = app.seed_client("ACME").await;
    let globex = app.seed_client("GLOBEX").await;

    let vendor: uuid::Uuid = sqlx::query_scalar("INSERT INTO vendors (client_id, name) VALUES ($1, 'Globex Recycling') RETURNING id")
        .bind(&globex)
        .fetch_one(app.pool())
        .await
        .unwrap();

    let err = sqlx::query("INSERT INTO shipments (client_id, shipment_number, status, vendor_id) VALUES ($1, 'S-1', 'scheduled', $2)")
        .bind(&acme)
        .bind(vendor)
        .execute(app.pool())
        .await
        .unwrap_err();
    let code = err.as_database_error().and_then(|db| db.code().map(|c| c.into_owned()));
    assert_eq!(code.as_deref(), Some("23503"));
}

#[tokio::test]
async fn deleting_a_referenced_record_is_a_conflict() {
    let app = database_app!();
    let acme = app.seed_client("ACME").await;
    let token = app.token_for(&TestApp::subject(Role::Manager, &acme));

    let vendor = create(&app, &token, "/api/vendors", json!({"name": "Acme Recycling"})).await;
    let shipment = create(
        &app,
        &token,
        "/api/shipments",
        json!({"shipment_number": "S-1", "status": "received", "vendor_id": vendor}),
    )
    .await;

    let (status, body) = app.delete(&format!("/api/vendors/{}", vendor), Some(&token)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CONFLICT");

    let (status, _) = app.delete(&format!("/api/shipments/{}", shipment), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.delete(&format!("/api/vendors/{}", vendor), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn out_of_range_values_are_validation_errors() {
    let app = database_app!();
    let acme = app.seed_client("ACME").await;
    let token = app.token_for(&TestApp::subject(Role::Manager, &acme));

    // NUMERIC(14, 3) holds at most 11 integer digits
    let body = json!({"asset_tag": "A-OVF", "category": "server", "status": "received", "weight_kg": "123456789012345"});
    let (status, rejected) = app.post_json("/api/assets", Some(&token), &body.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&rejected), "VALIDATION_ERROR");

    let body = json!({"asset_tag": "A-OK", "category": "server", "status": "received", "weight_kg": "12.5"});
    let (status, _) = app.post_json("/api/assets", Some(&token), &body.to_string()).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failed_logins_still_lock_the_account() {
    let app = database_app!(|config| config.security.lockout_max_attempts = 3);
    let acme = app.seed_client("ACME").await;
    let user = app.seed_user(&acme, Role::Technician, "Right-Password-1").await;

    let wrong = json!({"email": user.email, "password": "Wrong-Password-1"}).to_string();
    let attempts = (0..3).map(|_| app.post_json("/auth/login", None, &wrong));
    for (status, _) in futures::future::join_all(attempts).await {
        assert!(status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN);
    }

    let (count, lockout_end): (i32, Option<chrono::DateTime<Utc>>) =
        sqlx::query_as("SELECT access_failed_count, lockout_end FROM users WHERE id = $1")
            .bind(user.user_id)
            .fetch_one(app.pool())
            .await
            .unwrap();
    assert_eq!(count, 0);
    assert!(lockout_end.is_some_and(|end| end > Utc::now()));

    let right = json!({"email": user.email, "password": "Right-Password-1"}).to_string();
    let (status, body) = app.post_json("/auth/login", None, &right).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "ACCOUNT_LOCKED");
}

#[tokio::test]
async fn login_succeeds_and_unknown_accounts_look_like_bad_passwords() {
    let app = database_app!();
    let acme = app.seed_client("ACME").await;
    let user = app.seed_user(&acme, Role::Manager, "Right-Password-1").await;

    let (status, body) = app
        .post_json("/auth/login", None, &json!({"email": user.email, "password": "Right-Password-1"}).to_string())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["client_id"], acme.as_str());

    let (unknown_status, unknown) = app
        .post_json("/auth/login", None, &json!({"email": "nobody@example.com", "password": "Whatever-1"}).to_string())
        .await;
    let (wrong_status, wrong) = app
        .post_json("/auth/login", None, &json!({"email": user.email, "password": "Wrong-Password-1"}).to_string())
        .await;
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, wrong_status);
    assert_eq!(unknown["message"], wrong["message"]);
}

#[tokio::test]
async fn custody_events_go_through_the_asset_route() {
    let app = database_app!();
    let acme = app.seed_client("ACME").await;
    let globex = app.seed_client("GLOBEX").await;
    let token = app.token_for(&TestApp::subject(Role::Technician, &acme));

    let asset = create(
        &app,
        &token,
        "/api/assets",
        json!({"asset_tag": "A-7", "category": "laptop", "status": "received", "location": "Dock 1"}),
    )
    .await;

    let event = json!({"to_location": "Bay 4", "status": "in_processing", "handler": "J. Ortiz"}).to_string();
    let (status, body) = app.post_json(&format!("/api/assets/{}/custody", asset), Some(&token), &event).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["event"]["from_location"], "Dock 1");
    assert_eq!(body["data"]["asset"]["location"], "Bay 4");
    assert_eq!(body["data"]["asset"]["status"], "in_processing");

    let direct = json!({"asset_id": asset, "status": "destroyed"}).to_string();
    let (status, body) = app.post_json("/api/chain-of-custody", Some(&token), &direct).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "FORBIDDEN");

    let (status, trail) = app.get(&format!("/api/assets/{}/custody", asset), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trail["data"].as_array().map(Vec::len), Some(1));

    let outsider = app.token_for(&TestApp::subject(Role::Technician, &globex));
    let (status, _) = app.post_json(&format!("/api/assets/{}/custody", asset), Some(&outsider), &event).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn vendor_activity_counts_only_the_vendors_client() {
    let app = database_app!();
    let acme = app.seed_client("ACME").await;
    let globex = app.seed_client("GLOBEX").await;
    let acme_token = app.token_for(&TestApp::subject(Role::Manager, &acme));
    let globex_token = app.token_for(&TestApp::subject(Role::Manager, &globex));

    let vendor = create(&app, &acme_token, "/api/vendors", json!({"name": "Acme Recycling"})).await;
    for number in ["S-1", "S-2"] {
        create(
            &app,
            &acme_token,
            "/api/shipments",
            json!({"shipment_number": number, "status": "received", "vendor_id": vendor, "total_weight_kg": "10"}),
        )
        .await;
    }
    let other = create(&app, &globex_token, "/api/vendors", json!({"name": "Globex Recycling"})).await;
    create(
        &app,
        &globex_token,
        "/api/shipments",
        json!({"shipment_number": "S-1", "status": "received", "vendor_id": other}),
    )
    .await;

    let (status, body) = app.get("/api/dashboard/vendors", Some(&acme_token)).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().expect("vendor rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["vendor_id"], vendor.as_str());
    assert_eq!(rows[0]["shipments"], 2);
    assert_eq!(rows[0]["processing_lots"], 0);
}

#[tokio::test]
async fn shared_session_store_times_out_idle_users() {
    let app = database_app!(|config| config.database.session_backend = SessionBackend::Postgres);
    let acme = app.seed_client("ACME").await;
    let user = app.seed_user(&acme, Role::Manager, "Right-Password-1").await;
    let token = app.token_for(&user);
    let key = session_key(&user.client_id, user.user_id);

    app.state.sessions.begin(&key, Utc::now() - Duration::hours(2)).await.unwrap();
    let (status, body) = app.get("/api/auth/whoami", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "SESSION_EXPIRED");

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_activity WHERE session_key = $1")
        .bind(&key)
        .fetch_one(app.pool())
        .await
        .unwrap();
    assert_eq!(rows, 0);

    let (status, _) = app.get("/api/auth/whoami", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    // Entries past their retention are swept
    app.state.sessions.begin(&key, Utc::now() - Duration::days(2)).await.unwrap();
    assert!(app.state.sessions.purge(Utc::now()).await.unwrap() >= 1);
}
