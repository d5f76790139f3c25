//! Field extraction over loosely structured webhook payloads.
//!
//! Providers do not agree on a schema (and one of them localizes its labels),
//! so every field is found by probing an ordered list of candidate paths and
//! taking the first hit. Nothing here fails: a missing or oddly shaped field
//! is simply "not found".

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Label used when a payload carries no recognizable event name.
pub const UNKNOWN_EVENT: &str = "unknown";

/// Top-level fields that may name the event, in priority order.
const EVENT_FIELDS: &[&str] = &["event", "type", "evento", "acao", "status"];

/// Fields checked under a nested `data` object when the top level has none.
const NESTED_EVENT_FIELDS: &[&str] = &["event", "type", "status"];

/// Provider-supplied identifiers usable as the event identity, in priority order.
const IDENTITY_FIELDS: &[&str] = &[
    "id",
    "event_id",
    "delivery_id",
    "webhook_id",
    "pedido_id",
    "order_id",
];

const EMAIL_PATHS: &[&[&str]] = &[
    &["email"],
    &["cliente", "email"],
    &["customer", "email"],
    &["buyer", "email"],
    &["purchaser", "email"],
    &["user", "email"],
    &["member", "email"],
    &["data", "email"],
    &["data", "customer", "email"],
    &["params", "email"],
    &["query", "email"],
];

const ORDER_ID_PATHS: &[&[&str]] = &[
    &["order_id"],
    &["pedido_id"],
    &["purchase", "id"],
    &["order", "id"],
    &["data", "order_id"],
];

const PRODUCT_CODE_PATHS: &[&[&str]] = &[
    &["product_code"],
    &["produto", "codigo"],
    &["product", "code"],
    &["plan", "code"],
    &["data", "product_code"],
    &["checkout", "code"],
];

/// Coerces a probed value into the field's string form, or rejects it.
type Coerce = fn(&Value) -> Option<String>;

/// Fields pulled out of a payload. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedPayload {
    pub event: String,
    pub email: Option<String>,
    pub order_id: Option<String>,
    pub product_code: Option<String>,
}

impl NormalizedPayload {
    pub fn from_value(payload: &Value) -> Self {
        Self {
            event: extract_event_name(payload),
            email: extract_email(payload),
            order_id: extract_order_id(payload),
            product_code: extract_product_code(payload),
        }
    }
}

/// Parse a raw request body. Empty or malformed bodies become `{}` so the
/// delivery is still logged (as an "unknown" event).
pub fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        tracing::debug!("Webhook body is not valid JSON, treating as empty: {}", e);
        Value::Object(Default::default())
    })
}

fn lookup<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |cur, key| cur.as_object()?.get(*key))
}

/// Try each path in order and return the first value `coerce` accepts.
fn probe(payload: &Value, paths: &[&[&str]], coerce: Coerce) -> Option<String> {
    paths
        .iter()
        .find_map(|path| lookup(payload, path).and_then(coerce))
}

fn non_empty_trimmed(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Strings and integers, rendered as strings. Empty strings are absent.
fn string_or_integer(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

fn email_like(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| s.contains('@'))
        .map(|s| s.trim().to_string())
}

/// The event label: first non-empty string among the top-level event fields,
/// then the same under `data`, else [`UNKNOWN_EVENT`]. Returned trimmed with
/// its original case.
pub fn extract_event_name(payload: &Value) -> String {
    let top = EVENT_FIELDS
        .iter()
        .find_map(|field| payload.get(*field).and_then(non_empty_trimmed));
    if let Some(event) = top {
        return event;
    }

    payload
        .get("data")
        .filter(|data| data.is_object())
        .and_then(|data| {
            NESTED_EVENT_FIELDS
                .iter()
                .find_map(|field| data.get(*field).and_then(non_empty_trimmed))
        })
        .unwrap_or_else(|| UNKNOWN_EVENT.to_string())
}

pub fn extract_email(payload: &Value) -> Option<String> {
    probe(payload, EMAIL_PATHS, email_like)
}

pub fn extract_order_id(payload: &Value) -> Option<String> {
    probe(payload, ORDER_ID_PATHS, string_or_integer)
}

pub fn extract_product_code(payload: &Value) -> Option<String> {
    probe(payload, PRODUCT_CODE_PATHS, string_or_integer)
}

/// Stable identity for a delivery.
///
/// The first provider identifier found is used as `<field>_<value>`.
/// Without one, the identity is `hash_` plus the first 32 hex chars of the
/// SHA-256 of the canonical (key-sorted, compact) JSON, so byte-identical
/// payloads collide and different ones do not.
pub fn event_uid(payload: &Value) -> String {
    let provided = IDENTITY_FIELDS.iter().find_map(|field| {
        payload
            .get(*field)
            .and_then(string_or_integer)
            .map(|v| format!("{}_{}", field, v))
    });
    if let Some(uid) = provided {
        return uid;
    }

    // serde_json's default Map is a BTreeMap, so this is key-sorted and compact.
    let canonical = payload.to_string();
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    format!("hash_{}", &digest[..32])
}
