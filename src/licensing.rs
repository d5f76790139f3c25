//! Key issuance, revocation and validation.
//!
//! Handlers call into this module; it owns the rules (reuse before mint,
//! bounded token uniqueness, expiry evaluated at request time) and leaves
//! SQL to `db::queries`.

use chrono::Utc;
use rand::Rng;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{CreateLicenseKey, KeyStatus, LicenseKey};
use crate::util::{SECONDS_PER_DAY, normalize_email};

/// Token alphabet without look-alike glyphs (no I, O, 0, 1).
pub const KEY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const KEY_BLOCKS: usize = 4;
const KEY_BLOCK_LEN: usize = 4;

/// How many random tokens to try before falling back to a UUID.
pub const MAX_TOKEN_ATTEMPTS: usize = 10;

pub const DEFAULT_VALID_DAYS: i64 = 30;
pub const MIN_VALID_DAYS: i64 = 1;
pub const MAX_VALID_DAYS: i64 = 365;

/// Generate a token in XXXX-XXXX-XXXX-XXXX format.
pub fn generate_key_token() -> String {
    let mut rng = rand::thread_rng();
    let mut block = || -> String {
        (0..KEY_BLOCK_LEN)
            .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
            .collect()
    };
    let blocks: Vec<String> = (0..KEY_BLOCKS).map(|_| block()).collect();
    blocks.join("-")
}

/// Pick a token not yet in the store.
///
/// Tries up to [`MAX_TOKEN_ATTEMPTS`] random tokens, then falls back to a
/// UUID, which cannot collide with the alphabet format.
pub fn generate_unique_token(conn: &Connection) -> Result<String> {
    generate_unique_token_with(conn, generate_key_token)
}

/// [`generate_unique_token`] with the candidate source supplied by the caller.
pub fn generate_unique_token_with(
    conn: &Connection,
    mut candidate: impl FnMut() -> String,
) -> Result<String> {
    for attempt in 1..=MAX_TOKEN_ATTEMPTS {
        let token = candidate();
        if !queries::key_token_exists(conn, &token)? {
            return Ok(token);
        }
        tracing::warn!("Key token collision (attempt {}/{})", attempt, MAX_TOKEN_ATTEMPTS);
    }
    tracing::warn!(
        "No free key token after {} attempts, falling back to a UUID",
        MAX_TOKEN_ATTEMPTS
    );
    Ok(uuid::Uuid::new_v4().to_string())
}

/// What to issue a key for.
#[derive(Debug, Clone, Default)]
pub struct IssueKey {
    pub email: String,
    pub product_code: Option<String>,
    pub order_id: Option<String>,
    /// Validity window in days; None = never expires
    pub valid_days: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub license: LicenseKey,
    /// True when an existing active key was handed back instead of minting
    pub reused: bool,
}

/// Return the caller's active, unexpired key or mint a new one.
///
/// The lookup and insert share an IMMEDIATE transaction so two concurrent
/// issuers for the same email cannot both miss and both insert.
pub fn issue_key(conn: &mut Connection, input: &IssueKey) -> Result<IssuedKey> {
    let email = normalize_email(&input.email);
    let now = Utc::now().timestamp();

    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    if let Some(existing) = queries::find_reusable_key(
        &tx,
        &email,
        input.product_code.as_deref(),
        input.order_id.as_deref(),
        now,
    )? {
        // Nothing written yet; dropping tx just ends it
        return Ok(IssuedKey {
            license: existing,
            reused: true,
        });
    }

    let token = generate_unique_token(&tx)?;
    let license = queries::create_license_key(
        &tx,
        &token,
        &CreateLicenseKey {
            email,
            product_code: input.product_code.clone(),
            order_id: input.order_id.clone(),
            expires_at: input.valid_days.map(|days| now + days * SECONDS_PER_DAY),
        },
    )?;
    tx.commit()?;

    tracing::info!(
        "Issued key {} for {} (order={:?}, product={:?}, expires_at={:?})",
        license.id,
        license.email,
        license.order_id,
        license.product_code,
        license.expires_at
    );

    Ok(IssuedKey {
        license,
        reused: false,
    })
}

/// Revoke every active key for the email and/or order id. With neither
/// present this is a no-op.
pub fn revoke_keys(conn: &Connection, email: Option<&str>, order_id: Option<&str>) -> Result<usize> {
    let email = email.map(normalize_email);
    let revoked = queries::revoke_active_keys(conn, email.as_deref(), order_id)?;
    if revoked > 0 {
        tracing::info!(
            "Revoked {} key(s) (email={:?}, order={:?})",
            revoked,
            email,
            order_id
        );
    }
    Ok(revoked)
}

/// Outcome of validating a presented token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValidation {
    /// Blank input
    Invalid,
    NotFound,
    Revoked,
    Expired { expires_at: i64 },
    Active { expires_at: Option<i64> },
}

impl KeyValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, KeyValidation::Active { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            KeyValidation::Invalid => "invalid",
            KeyValidation::NotFound => "not_found",
            KeyValidation::Revoked => "revoked",
            KeyValidation::Expired { .. } => "expired",
            KeyValidation::Active { .. } => "active",
        }
    }

    pub fn expires_at(&self) -> Option<i64> {
        match self {
            KeyValidation::Expired { expires_at } => Some(*expires_at),
            KeyValidation::Active { expires_at } => *expires_at,
            _ => None,
        }
    }
}

/// Check a raw token against the store. Expiry is evaluated against the
/// current time on every call.
pub fn validate_key(conn: &Connection, raw: &str) -> Result<KeyValidation> {
    let token = raw.trim();
    if token.is_empty() {
        return Ok(KeyValidation::Invalid);
    }

    let Some(license) = queries::get_license_key_by_token(conn, token)? else {
        return Ok(KeyValidation::NotFound);
    };

    if license.status == KeyStatus::Revoked {
        return Ok(KeyValidation::Revoked);
    }

    if license.is_expired_at(Utc::now().timestamp()) {
        return Ok(KeyValidation::Expired {
            expires_at: license.expires_at.unwrap_or_default(),
        });
    }

    Ok(KeyValidation::Active {
        expires_at: license.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use std::collections::HashSet;

    /// True if `token` has the generated shape and only uses [`KEY_ALPHABET`].
    fn is_well_formed_token(token: &str) -> bool {
        let blocks: Vec<&str> = token.split('-').collect();
        blocks.len() == KEY_BLOCKS
            && blocks.iter().all(|b| {
                b.len() == KEY_BLOCK_LEN && b.bytes().all(|c| KEY_ALPHABET.contains(&c))
            })
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
        init_db(&conn).expect("Failed to initialize schema");
        conn
    }

    #[test]
    fn generated_tokens_have_the_expected_shape() {
        for _ in 0..200 {
            let token = generate_key_token();
            assert_eq!(token.len(), 19);
            assert!(is_well_formed_token(&token), "bad token {}", token);
        }
    }

    #[test]
    fn alphabet_excludes_confusable_glyphs() {
        assert_eq!(KEY_ALPHABET.len(), 32);
        for c in [b'0', b'1', b'I', b'O'] {
            assert!(!KEY_ALPHABET.contains(&c));
        }
    }

    #[test]
    fn well_formed_check_rejects_other_shapes() {
        assert!(!is_well_formed_token("ABCD-EFGH-JKLM"));
        assert!(!is_well_formed_token("ABCD-EFGH-JKLM-NPQO"));
        assert!(!is_well_formed_token("abcd-efgh-jklm-npqr"));
    }

    #[test]
    fn colliding_candidates_retry_then_fall_back_to_uuid() {
        let conn = test_conn();
        let taken = "AAAA-BBBB-CCCC-DDDD";
        queries::create_license_key(
            &conn,
            taken,
            &CreateLicenseKey {
                email: "taken@example.com".into(),
                product_code: None,
                order_id: None,
                expires_at: None,
            },
        )
        .unwrap();

        let mut calls = 0;
        let token = generate_unique_token_with(&conn, || {
            calls += 1;
            taken.to_string()
        })
        .unwrap();

        assert_eq!(calls, MAX_TOKEN_ATTEMPTS);
        assert_ne!(token, taken);
        assert!(uuid::Uuid::parse_str(&token).is_ok(), "expected a UUID, got {}", token);
        assert!(!queries::key_token_exists(&conn, &token).unwrap());
    }

    #[test]
    fn later_candidate_is_used_once_free() {
        let conn = test_conn();
        queries::create_license_key(
            &conn,
            "AAAA-BBBB-CCCC-DDDD",
            &CreateLicenseKey {
                email: "taken@example.com".into(),
                product_code: None,
                order_id: None,
                expires_at: None,
            },
        )
        .unwrap();

        let mut candidates = vec!["ZZZZ-YYYY-XXXX-WWWW", "AAAA-BBBB-CCCC-DDDD"];
        let token = generate_unique_token_with(&conn, || {
            candidates.pop().unwrap_or_default().to_string()
        })
        .unwrap();

        assert_eq!(token, "ZZZZ-YYYY-XXXX-WWWW");
    }

    #[test]
    fn unique_tokens_across_a_batch() {
        let mut conn = test_conn();
        let mut seen = HashSet::new();
        for i in 0..100 {
            let issued = issue_key(
                &mut conn,
                &IssueKey {
                    email: format!("buyer{}@example.com", i),
                    ..Default::default()
                },
            )
            .unwrap();
            assert!(seen.insert(issued.license.key));
        }
    }

    #[test]
    fn issue_normalizes_email_and_reuses_active_key() {
        let mut conn = test_conn();
        let first = issue_key(
            &mut conn,
            &IssueKey {
                email: " Buyer@Example.com".into(),
                order_id: Some("ORD-1".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!first.reused);
        assert_eq!(first.license.email, "buyer@example.com");

        let second = issue_key(
            &mut conn,
            &IssueKey {
                email: "buyer@example.com".into(),
                order_id: Some("ORD-1".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(second.reused);
        assert_eq!(second.license.key, first.license.key);
    }

    #[test]
    fn different_order_gets_a_new_key() {
        let mut conn = test_conn();
        let a = issue_key(
            &mut conn,
            &IssueKey {
                email: "buyer@example.com".into(),
                order_id: Some("ORD-1".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let b = issue_key(
            &mut conn,
            &IssueKey {
                email: "buyer@example.com".into(),
                order_id: Some("ORD-2".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_ne!(a.license.key, b.license.key);
    }

    #[test]
    fn revoke_without_filters_is_a_noop() {
        let mut conn = test_conn();
        let issued = issue_key(
            &mut conn,
            &IssueKey {
                email: "buyer@example.com".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(revoke_keys(&conn, None, None).unwrap(), 0);
        assert_eq!(
            validate_key(&conn, &issued.license.key).unwrap(),
            KeyValidation::Active { expires_at: None }
        );
    }

    #[test]
    fn validation_reports_each_state() {
        let mut conn = test_conn();
        assert_eq!(validate_key(&conn, "   ").unwrap(), KeyValidation::Invalid);
        assert_eq!(
            validate_key(&conn, "AAAA-BBBB-CCCC-DDDD").unwrap(),
            KeyValidation::NotFound
        );

        let issued = issue_key(
            &mut conn,
            &IssueKey {
                email: "buyer@example.com".into(),
                valid_days: Some(30),
                ..Default::default()
            },
        )
        .unwrap();
        let result = validate_key(&conn, &format!(" {} ", issued.license.key)).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.expires_at(), issued.license.expires_at);

        revoke_keys(&conn, Some("BUYER@example.com"), None).unwrap();
        assert_eq!(
            validate_key(&conn, &issued.license.key).unwrap(),
            KeyValidation::Revoked
        );
    }

    #[test]
    fn past_expiry_reports_expired() {
        let conn = test_conn();
        let past = Utc::now().timestamp() - 60;
        let license = queries::create_license_key(
            &conn,
            "EXPD-EXPD-EXPD-EXPD",
            &CreateLicenseKey {
                email: "old@example.com".into(),
                product_code: None,
                order_id: None,
                expires_at: Some(past),
            },
        )
        .unwrap();
        assert_eq!(
            validate_key(&conn, &license.key).unwrap(),
            KeyValidation::Expired { expires_at: past }
        );
    }

    #[test]
    fn expired_key_is_not_reused() {
        let mut conn = test_conn();
        let past = Utc::now().timestamp() - 60;
        queries::create_license_key(
            &conn,
            "EXPD-EXPD-EXPD-EXPD",
            &CreateLicenseKey {
                email: "old@example.com".into(),
                product_code: None,
                order_id: None,
                expires_at: Some(past),
            },
        )
        .unwrap();

        let issued = issue_key(
            &mut conn,
            &IssueKey {
                email: "old@example.com".into(),
                valid_days: Some(30),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!issued.reused);
        assert_ne!(issued.license.key, "EXPD-EXPD-EXPD-EXPD");
    }
}
