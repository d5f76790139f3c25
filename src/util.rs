//! Shared utility functions for the Keyway service.

use std::collections::HashMap;

use axum::http::HeaderMap;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use unicode_normalization::UnicodeNormalization;

pub const SECONDS_PER_DAY: i64 = 86400;

/// Alternate headers a provider may carry the webhook secret in.
/// HeaderMap lookups are case-insensitive.
const WEBHOOK_SECRET_HEADERS: &[&str] = &["x-webhook-token", "x-lastlink-secret", "x-lastlink-token"];

/// Query parameters accepted as a last resort for the webhook secret.
const WEBHOOK_SECRET_PARAMS: &[&str] = &["token", "secret", "webhook_secret"];

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Find the secret a webhook sender presented.
///
/// Order: `Authorization: Bearer` (scheme matched case-insensitively), then
/// the alternate headers, then the `token` / `secret` / `webhook_secret`
/// query parameters (already decoded by the `Query` extractor).
pub fn extract_webhook_secret(
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Option<String> {
    let bearer = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| {
            let (scheme, rest) = s.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| rest.trim())
        })
        .filter(|s| !s.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    for name in WEBHOOK_SECRET_HEADERS {
        if let Some(token) = headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Some(token.to_string());
        }
    }

    WEBHOOK_SECRET_PARAMS.iter().find_map(|param| {
        query
            .get(*param)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// Compare a presented secret to the configured one.
///
/// Both sides are hashed first so the comparison always runs over 32 bytes,
/// then compared in constant time.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided.as_slice().ct_eq(expected.as_slice()).into()
}

/// Normalize an email for storage and lookup: trim, NFC, lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().nfc().collect::<String>().to_lowercase()
}

/// Copy request headers into a JSON object for the event log, redacting any
/// header that can carry a credential.
pub fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (name, value) in headers {
        let name = name.as_str();
        let value = if name == "authorization" || WEBHOOK_SECRET_HEADERS.contains(&name) {
            "[redacted]".to_string()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        map.insert(name.to_string(), Value::String(value));
    }
    Value::Object(map)
}

/// Render a Unix timestamp (seconds) as RFC 3339.
pub fn timestamp_to_rfc3339(secs: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_scheme_is_case_insensitive_for_webhooks() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("bearer s3cret "));
        assert_eq!(
            extract_webhook_secret(&headers, &HashMap::new()).as_deref(),
            Some("s3cret")
        );
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn alternate_header_and_query_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert("x-lastlink-token", HeaderValue::from_static("from-header"));
        assert_eq!(
            extract_webhook_secret(&headers, &query(&[("token", "from-query")])).as_deref(),
            Some("from-header")
        );

        let empty = HeaderMap::new();
        assert_eq!(
            extract_webhook_secret(&empty, &query(&[("foo", "1"), ("webhook_secret", " a b ")]))
                .as_deref(),
            Some("a b")
        );
        assert_eq!(
            extract_webhook_secret(&empty, &query(&[("token", "  "), ("secret", "second")]))
                .as_deref(),
            Some("second")
        );
        assert_eq!(extract_webhook_secret(&empty, &query(&[("foo", "1")])), None);
        assert_eq!(extract_webhook_secret(&empty, &HashMap::new()), None);
    }

    #[test]
    fn non_bearer_authorization_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        headers.insert("x-webhook-token", HeaderValue::from_static("tok"));
        assert_eq!(
            extract_webhook_secret(&headers, &HashMap::new()).as_deref(),
            Some("tok")
        );
    }

    #[test]
    fn secrets_match_compares_exactly() {
        assert!(secrets_match("abc", "abc"));
        assert!(!secrets_match("abc", "abd"));
        assert!(!secrets_match("", "abc"));
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email("  Buyer@Example.COM "), "buyer@example.com");
    }

    #[test]
    fn headers_json_redacts_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        headers.insert("x-lastlink-secret", HeaderValue::from_static("s3cret"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let json = headers_to_json(&headers);
        assert_eq!(json["authorization"], "[redacted]");
        assert_eq!(json["x-lastlink-secret"], "[redacted]");
        assert_eq!(json["content-type"], "application/json");
    }

    #[test]
    fn rfc3339_rendering() {
        assert_eq!(timestamp_to_rfc3339(0).as_deref(), Some("1970-01-01T00:00:00Z"));
    }
}
