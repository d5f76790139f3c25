use rusqlite::Connection;

/// Initialize the database schema. Safe to run on every startup.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Premium keys. Never deleted: revocation flips status.
        CREATE TABLE IF NOT EXISTS license_keys (
            id TEXT PRIMARY KEY,
            key TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            product_code TEXT,
            order_id TEXT,
            status TEXT NOT NULL CHECK (status IN ('active', 'revoked')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            expires_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_license_keys_email ON license_keys(email, status);
        CREATE INDEX IF NOT EXISTS idx_license_keys_order ON license_keys(order_id) WHERE order_id IS NOT NULL;

        -- Webhook deliveries (dedup + audit trail)
        -- UNIQUE(provider, uid) makes the dedup claim atomic
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            uid TEXT NOT NULL,
            event TEXT NOT NULL,
            payload TEXT NOT NULL,
            headers TEXT NOT NULL,
            received_at INTEGER NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            UNIQUE(provider, uid)
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_received ON webhook_events(received_at);
        "#,
    )?;
    Ok(())
}
