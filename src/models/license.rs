use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Lifecycle of a premium key. Revocation is permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseKey {
    pub id: String,
    /// Human-readable token (XXXX-XXXX-XXXX-XXXX)
    pub key: String,
    /// Owner email, normalized (trimmed, NFC, lowercase)
    pub email: String,
    pub product_code: Option<String>,
    pub order_id: Option<String>,
    pub status: KeyStatus,
    pub created_at: i64,
    pub updated_at: i64,
    /// Unix seconds; None = never expires
    pub expires_at: Option<i64>,
}

impl LicenseKey {
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }
}

/// Input for inserting a new key. `email` must already be normalized.
#[derive(Debug, Clone)]
pub struct CreateLicenseKey {
    pub email: String,
    pub product_code: Option<String>,
    pub order_id: Option<String>,
    pub expires_at: Option<i64>,
}
