use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A recorded webhook delivery. Rows are inserted before business logic runs
/// (claiming the uid) and the processed flag is set afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub provider: String,
    /// Derived identity, unique per provider
    pub uid: String,
    /// Lower-cased event label
    pub event: String,
    pub payload: Value,
    pub headers: Value,
    pub received_at: i64,
    pub processed: bool,
}

#[derive(Debug, Clone)]
pub struct NewWebhookEvent<'a> {
    pub provider: &'a str,
    pub uid: &'a str,
    pub event: &'a str,
    pub payload: &'a Value,
    pub headers: &'a Value,
}
