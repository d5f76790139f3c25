use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::models::NewWebhookEvent;
use crate::payload::{self, NormalizedPayload};
use crate::util::{extract_webhook_secret, headers_to_json, secrets_match};

use super::common::{apply_event, classify_event};

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub processed: bool,
    pub event: String,
    pub idempotent: bool,
}

/// Provider path segments: 1-32 chars of [a-z0-9_-].
fn is_valid_provider(provider: &str) -> bool {
    !provider.is_empty()
        && provider.len() <= 32
        && provider
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// POST /webhooks/{provider}
///
/// Only auth problems surface as HTTP errors. Once the caller is
/// authenticated the response is always 200 and failures are reported via
/// `processed: false`, so the provider does not redeliver in a loop.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    if !is_valid_provider(&provider) {
        return Err(AppError::NotFound("Unknown webhook provider".into()));
    }

    let configured = state
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Misconfigured("Webhook secret not configured".into()))?;

    let provided = extract_webhook_secret(&headers, &query);
    if !provided.is_some_and(|p| secrets_match(&p, configured)) {
        tracing::warn!("Rejected {} webhook: missing or wrong secret", provider);
        return Err(AppError::Unauthorized);
    }

    let payload = payload::parse_body(&body);
    let fields = NormalizedPayload::from_value(&payload);
    let event = fields.event.to_lowercase();
    let uid = payload::event_uid(&payload);

    let ack = |processed: bool, idempotent: bool| {
        Json(WebhookAck {
            received: true,
            processed,
            event: event.clone(),
            idempotent,
        })
    };

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error for {} webhook {}: {}", provider, uid, e);
            return Ok(ack(false, false));
        }
    };

    // Claiming the uid doubles as the audit record; business logic only runs
    // for the delivery that wins the insert.
    let headers_json = headers_to_json(&headers);
    let claimed = queries::try_record_webhook_event(
        &conn,
        &NewWebhookEvent {
            provider: &provider,
            uid: &uid,
            event: &event,
            payload: &payload,
            headers: &headers_json,
        },
    );
    let event_id = match claimed {
        Ok(Some(id)) => id,
        Ok(None) => {
            let first_processed = queries::get_webhook_event(&conn, &provider, &uid)
                .ok()
                .flatten()
                .map(|e| e.processed);
            tracing::info!(
                "Duplicate {} webhook {} ({}), skipping (first delivery processed={:?})",
                provider,
                uid,
                event,
                first_processed
            );
            return Ok(ack(false, true));
        }
        Err(e) => {
            tracing::error!("Failed to record {} webhook {}: {}", provider, uid, e);
            return Ok(ack(false, false));
        }
    };

    let kind = classify_event(&event);
    let processed = match apply_event(&mut conn, kind, &fields) {
        Ok(processed) => processed,
        Err(e) => {
            tracing::error!(
                "Error processing {} webhook {} ({}): {}",
                provider,
                uid,
                kind.as_ref(),
                e
            );
            false
        }
    };

    if let Err(e) = queries::set_webhook_event_processed(&conn, &event_id, processed) {
        tracing::error!("Failed to mark webhook {} processed={}: {}", uid, processed, e);
    }

    tracing::info!(
        "{} webhook {} handled: event={}, kind={}, processed={}",
        provider,
        uid,
        event,
        kind.as_ref(),
        processed
    );

    Ok(ack(processed, false))
}
