use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::licensing::{self, DEFAULT_VALID_DAYS, IssueKey, MAX_VALID_DAYS, MIN_VALID_DAYS};
use crate::models::LicenseKey;
use crate::util::{normalize_email, timestamp_to_rfc3339};

/// Treat blank optional strings as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require_email(email: &str) -> Result<String> {
    let email = normalize_email(email);
    if !email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }
    Ok(email)
}

#[derive(Debug, Deserialize)]
pub struct CreateKeyBody {
    pub email: String,
    /// Validity in days (default 30, 1-365)
    #[serde(default)]
    pub days: Option<i64>,
    #[serde(default)]
    pub product_code: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    pub key: String,
    pub email: String,
    pub expires_at: Option<String>,
    pub expires_at_ms: Option<i64>,
    /// True when an existing unexpired key was returned
    pub reused: bool,
}

/// POST /admin/keys/create
/// Issue a key valid for `days`, or hand back the email's current one.
pub async fn create_key(
    State(state): State<AppState>,
    Json(body): Json<CreateKeyBody>,
) -> Result<Json<CreateKeyResponse>> {
    let days = body.days.unwrap_or(DEFAULT_VALID_DAYS);
    if !(MIN_VALID_DAYS..=MAX_VALID_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "days must be between {} and {}",
            MIN_VALID_DAYS, MAX_VALID_DAYS
        )));
    }
    let email = require_email(&body.email)?;

    let mut conn = state.db.get()?;
    let issued = licensing::issue_key(
        &mut conn,
        &IssueKey {
            email,
            product_code: non_blank(body.product_code),
            order_id: non_blank(body.order_id),
            valid_days: Some(days),
        },
    )?;

    tracing::info!(
        "Admin {} key {} for {}",
        if issued.reused { "reused" } else { "created" },
        issued.license.id,
        issued.license.email
    );

    let license = issued.license;
    Ok(Json(CreateKeyResponse {
        expires_at: license.expires_at.and_then(timestamp_to_rfc3339),
        expires_at_ms: license.expires_at.map(|secs| secs * 1000),
        key: license.key,
        email: license.email,
        reused: issued.reused,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RevokeKeyBody {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub revoked_count: usize,
}

/// POST /admin/keys/revoke
/// Revoke a single key. Unknown or already-revoked keys report 0.
pub async fn revoke_key(
    State(state): State<AppState>,
    Json(body): Json<RevokeKeyBody>,
) -> Result<Json<RevokeResponse>> {
    let token = body.key.trim();
    if token.is_empty() {
        return Err(AppError::BadRequest("key is required".into()));
    }

    let conn = state.db.get()?;
    let revoked_count = queries::revoke_license_key(&conn, token)?;
    tracing::info!("Admin revoke: {} key(s) revoked", revoked_count);

    Ok(Json(RevokeResponse { revoked_count }))
}

#[derive(Debug, Deserialize)]
pub struct RevokeAllBody {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// POST /admin/keys/revoke_all
/// Revoke every active key for an email and/or order id.
pub async fn revoke_all_keys(
    State(state): State<AppState>,
    Json(body): Json<RevokeAllBody>,
) -> Result<Json<RevokeResponse>> {
    let email = non_blank(body.email);
    let order_id = non_blank(body.order_id);
    if email.is_none() && order_id.is_none() {
        return Err(AppError::BadRequest(
            "email or order_id is required".into(),
        ));
    }

    let conn = state.db.get()?;
    let revoked_count = licensing::revoke_keys(&conn, email.as_deref(), order_id.as_deref())?;

    Ok(Json(RevokeResponse { revoked_count }))
}

#[derive(Debug, Deserialize)]
pub struct ListKeysQuery {
    pub email: String,
}

/// GET /admin/keys?email=
/// Every key owned by an email, newest first.
pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<ListKeysQuery>,
) -> Result<Json<Vec<LicenseKey>>> {
    let email = require_email(&query.email)?;
    let conn = state.db.get()?;
    let keys = queries::list_license_keys_for_email(&conn, &email)?;
    Ok(Json(keys))
}
