use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{LICENSE_KEY_COLS, WEBHOOK_EVENT_COLS, query_all, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ License Keys ============

/// Find an active, unexpired key that can be handed out again instead of minting a new one.
///
/// Matching narrows by `order_id` when present, else by `product_code` when present,
/// else by email alone. The newest match wins.
pub fn find_reusable_key(
    conn: &Connection,
    email: &str,
    product_code: Option<&str>,
    order_id: Option<&str>,
    now: i64,
) -> Result<Option<LicenseKey>> {
    let base = format!(
        "SELECT {} FROM license_keys
         WHERE email = ?1 AND status = 'active' AND (expires_at IS NULL OR expires_at > ?2)",
        LICENSE_KEY_COLS
    );
    let order = "ORDER BY created_at DESC LIMIT 1";

    match (order_id, product_code) {
        (Some(order_id), _) => query_one(
            conn,
            &format!("{} AND order_id = ?3 {}", base, order),
            params![email, now, order_id],
        ),
        (None, Some(product_code)) => query_one(
            conn,
            &format!("{} AND product_code = ?3 {}", base, order),
            params![email, now, product_code],
        ),
        (None, None) => query_one(conn, &format!("{} {}", base, order), params![email, now]),
    }
}

pub fn key_token_exists(conn: &Connection, token: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM license_keys WHERE key = ?1",
        params![token],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Insert a new active key with the given token.
pub fn create_license_key(
    conn: &Connection,
    token: &str,
    input: &CreateLicenseKey,
) -> Result<LicenseKey> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO license_keys (id, key, email, product_code, order_id, status, created_at, updated_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7, ?8)",
        params![
            &id,
            token,
            &input.email,
            &input.product_code,
            &input.order_id,
            now,
            now,
            input.expires_at
        ],
    )?;

    Ok(LicenseKey {
        id,
        key: token.to_string(),
        email: input.email.clone(),
        product_code: input.product_code.clone(),
        order_id: input.order_id.clone(),
        status: KeyStatus::Active,
        created_at: now,
        updated_at: now,
        expires_at: input.expires_at,
    })
}

pub fn get_license_key_by_token(conn: &Connection, token: &str) -> Result<Option<LicenseKey>> {
    query_one(
        conn,
        &format!("SELECT {} FROM license_keys WHERE key = ?1", LICENSE_KEY_COLS),
        &[&token],
    )
}

pub fn list_license_keys_for_email(conn: &Connection, email: &str) -> Result<Vec<LicenseKey>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM license_keys WHERE email = ?1 ORDER BY created_at DESC, rowid DESC",
            LICENSE_KEY_COLS
        ),
        &[&email],
    )
}

/// Revoke a single key by token. Returns the number of keys that changed (0 or 1).
pub fn revoke_license_key(conn: &Connection, token: &str) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE license_keys SET status = 'revoked', updated_at = ?1
         WHERE key = ?2 AND status = 'active'",
        params![now(), token],
    )?;
    Ok(affected)
}

/// Revoke every active key matching the email and/or order id.
///
/// With neither filter present nothing is touched: an empty filter must never
/// mean "every active key".
pub fn revoke_active_keys(
    conn: &Connection,
    email: Option<&str>,
    order_id: Option<&str>,
) -> Result<usize> {
    let now = now();
    let affected = match (email, order_id) {
        (None, None) => return Ok(0),
        (Some(email), None) => conn.execute(
            "UPDATE license_keys SET status = 'revoked', updated_at = ?1
             WHERE status = 'active' AND email = ?2",
            params![now, email],
        )?,
        (None, Some(order_id)) => conn.execute(
            "UPDATE license_keys SET status = 'revoked', updated_at = ?1
             WHERE status = 'active' AND order_id = ?2",
            params![now, order_id],
        )?,
        (Some(email), Some(order_id)) => conn.execute(
            "UPDATE license_keys SET status = 'revoked', updated_at = ?1
             WHERE status = 'active' AND email = ?2 AND order_id = ?3",
            params![now, email, order_id],
        )?,
    };
    Ok(affected)
}

// ============ Webhook Events ============

/// Atomically claim a webhook event identity, returning the new row id.
///
/// Uses INSERT OR IGNORE against UNIQUE(provider, uid): when a concurrent or
/// earlier delivery already holds the uid the insert is ignored and `None`
/// is returned. The row starts with processed = 0.
pub fn try_record_webhook_event(
    conn: &Connection,
    event: &NewWebhookEvent,
) -> Result<Option<String>> {
    let id = gen_id();
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (id, provider, uid, event, payload, headers, received_at, processed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
        params![
            &id,
            event.provider,
            event.uid,
            event.event,
            serde_json::to_string(event.payload)?,
            serde_json::to_string(event.headers)?,
            now()
        ],
    )?;
    Ok((affected > 0).then_some(id))
}

pub fn set_webhook_event_processed(conn: &Connection, id: &str, processed: bool) -> Result<()> {
    conn.execute(
        "UPDATE webhook_events SET processed = ?1 WHERE id = ?2",
        params![processed as i32, id],
    )?;
    Ok(())
}

pub fn get_webhook_event(
    conn: &Connection,
    provider: &str,
    uid: &str,
) -> Result<Option<WebhookEvent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM webhook_events WHERE provider = ?1 AND uid = ?2",
            WEBHOOK_EVENT_COLS
        ),
        &[&provider, &uid],
    )
}

pub fn count_webhook_events(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM webhook_events", [], |row| row.get(0))?;
    Ok(count)
}

/// Delete webhook events older than the retention window.
/// Called on startup when WEBHOOK_EVENT_RETENTION_DAYS > 0.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE received_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
