//! Event classification and the key-store mutation each class triggers.

use rusqlite::Connection;
use strum::AsRefStr;

use crate::error::Result;
use crate::licensing::{self, IssueKey};
use crate::payload::NormalizedPayload;

/// Labels are matched as substrings of the lower-cased event name. The
/// provider's dashboard emits Portuguese labels, its API English ones.
const PURCHASE_LABELS: &[&str] = &["compra completa", "purchase_complete", "purchase completed"];
const REFUND_LABELS: &[&str] = &["pagamento reembolsado", "refund", "refunded"];
const CHARGEBACK_LABELS: &[&str] = &["pagamento estornado", "chargeback", "dispute"];
const CANCELLATION_LABELS: &[&str] = &["pedido de compra cancelado", "cancelado", "order_cancelled"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    PurchaseComplete,
    Refund,
    Chargeback,
    Cancellation,
    Unrecognized,
}

impl EventKind {
    /// Refunds, chargebacks and cancellations all end access.
    pub fn revokes_access(self) -> bool {
        matches!(
            self,
            EventKind::Refund | EventKind::Chargeback | EventKind::Cancellation
        )
    }
}

/// Classify an event label. Purchase labels win over revocation labels.
pub fn classify_event(label: &str) -> EventKind {
    let label = label.to_lowercase();
    let matches_any = |labels: &[&str]| labels.iter().any(|l| label.contains(l));

    if matches_any(PURCHASE_LABELS) {
        EventKind::PurchaseComplete
    } else if matches_any(REFUND_LABELS) {
        EventKind::Refund
    } else if matches_any(CHARGEBACK_LABELS) {
        EventKind::Chargeback
    } else if matches_any(CANCELLATION_LABELS) {
        EventKind::Cancellation
    } else {
        EventKind::Unrecognized
    }
}

/// Apply the key-store mutation for an event. Returns whether the event was
/// acted upon (unrecognized events are recorded but not processed).
pub fn apply_event(
    conn: &mut Connection,
    kind: EventKind,
    fields: &NormalizedPayload,
) -> Result<bool> {
    match kind {
        EventKind::PurchaseComplete => {
            let Some(email) = &fields.email else {
                tracing::warn!(
                    "Purchase event '{}' has no email, no key issued (order={:?})",
                    fields.event,
                    fields.order_id
                );
                return Ok(true);
            };
            let issued = licensing::issue_key(
                conn,
                &IssueKey {
                    email: email.clone(),
                    product_code: fields.product_code.clone(),
                    order_id: fields.order_id.clone(),
                    valid_days: None,
                },
            )?;
            if issued.reused {
                tracing::info!(
                    "Purchase for {} matched existing key {}",
                    issued.license.email,
                    issued.license.id
                );
            }
            Ok(true)
        }
        kind if kind.revokes_access() => {
            if fields.email.is_none() && fields.order_id.is_none() {
                tracing::warn!(
                    "{} event '{}' has neither email nor order id, nothing revoked",
                    kind.as_ref(),
                    fields.event
                );
                return Ok(true);
            }
            licensing::revoke_keys(conn, fields.email.as_deref(), fields.order_id.as_deref())?;
            Ok(true)
        }
        _ => {
            tracing::debug!("Ignoring webhook event '{}'", fields.event);
            Ok(false)
        }
    }
}
