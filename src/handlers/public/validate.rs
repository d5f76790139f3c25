use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::licensing::{self, KeyValidation};
use crate::util::timestamp_to_rfc3339;

#[derive(Debug, Deserialize)]
pub struct ValidateKeyRequest {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateKeyResponse {
    pub valid: bool,
    /// "premium" or "free"
    pub plan: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<i64>,
}

impl From<KeyValidation> for ValidateKeyResponse {
    fn from(result: KeyValidation) -> Self {
        let expires_at = result.expires_at();
        Self {
            valid: result.is_valid(),
            plan: if result.is_valid() { "premium" } else { "free" },
            status: Some(result.status()),
            expires_at: expires_at.and_then(timestamp_to_rfc3339),
            expires_at_ms: expires_at.map(|secs| secs * 1000),
        }
    }
}

/// POST /premium/keys/validate
///
/// Unknown, revoked and expired keys are ordinary negative answers, not errors.
pub async fn validate_premium_key(
    State(state): State<AppState>,
    Json(req): Json<ValidateKeyRequest>,
) -> Result<Json<ValidateKeyResponse>> {
    let conn = state.db.get()?;
    let result = licensing::validate_key(&conn, &req.key)?;
    Ok(Json(result.into()))
}
