//! Test utilities and fixtures for Keyway integration tests

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde_json::Value;
use tower::ServiceExt;

pub use keyway::db::{AppState, init_db, queries};
pub use keyway::licensing::{self, IssueKey};
pub use keyway::models::*;

pub const WEBHOOK_SECRET: &str = "whsec-test-123";
pub const ADMIN_SECRET: &str = "admin-test-456";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Every pooled in-memory connection is its own database, so the pool is
/// capped at one connection. Never hold a connection across a request.
pub fn test_state_with(webhook_secret: Option<&str>, admin_secret: Option<&str>) -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        webhook_secret: webhook_secret.map(String::from),
        admin_secret: admin_secret.map(String::from),
    }
}

pub fn test_state() -> AppState {
    test_state_with(Some(WEBHOOK_SECRET), Some(ADMIN_SECRET))
}

/// Full router with rate limiting disabled (oneshot requests carry no peer address).
pub fn app(state: &AppState) -> Router {
    keyway::handlers::router(state.clone(), 0).with_state(state.clone())
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

/// Webhook delivery authenticated with `Authorization: Bearer <secret>`.
pub fn webhook_request(provider: &str, secret: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/webhooks/{}", provider))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", secret))
        .body(body.into())
        .unwrap()
}

pub fn admin_request(method: &str, uri: &str, secret: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("authorization", format!("Bearer {}", secret));
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

/// Send a request and return status plus parsed JSON body (Null if empty).
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// POST /premium/keys/validate
pub async fn validate(state: &AppState, key: &str) -> Value {
    let (status, json) = send(
        app(state),
        json_request(
            "POST",
            "/premium/keys/validate",
            &serde_json::json!({ "key": key }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "validate should always answer 200");
    json
}

/// XXXX-XXXX-XXXX-XXXX over the key alphabet.
pub fn is_generated_token(token: &str) -> bool {
    let blocks: Vec<&str> = token.split('-').collect();
    blocks.len() == 4
        && blocks.iter().all(|b| {
            b.len() == 4 && b.bytes().all(|c| licensing::KEY_ALPHABET.contains(&c))
        })
}

/// Issue a key directly against the store.
pub fn issue_test_key(state: &AppState, email: &str, valid_days: Option<i64>) -> LicenseKey {
    let mut conn = state.db.get().unwrap();
    licensing::issue_key(
        &mut conn,
        &IssueKey {
            email: email.to_string(),
            valid_days,
            ..Default::default()
        },
    )
    .expect("Failed to issue test key")
    .license
}

pub fn keys_for(state: &AppState, email: &str) -> Vec<LicenseKey> {
    let conn = state.db.get().unwrap();
    queries::list_license_keys_for_email(&conn, email).unwrap()
}

pub fn event_count(state: &AppState) -> i64 {
    let conn = state.db.get().unwrap();
    queries::count_webhook_events(&conn).unwrap()
}

/// Force a key's expiry into the past.
pub fn expire_key(state: &AppState, token: &str) {
    let conn = state.db.get().unwrap();
    conn.execute(
        "UPDATE license_keys SET expires_at = ?1 WHERE key = ?2",
        rusqlite::params![chrono::Utc::now().timestamp() - 60, token],
    )
    .unwrap();
}
