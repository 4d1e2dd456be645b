use super::ids::{CourseId, PaymentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    /// Terminal; reachable only through out-of-scope administration.
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// A payment order in the ledger.
///
/// Created with status `Pending` when the gateway hands back an order
/// handle; mutated exactly once by verification (`Pending -> Success` or
/// `Pending -> Failed`); never deleted. At most one `Success` row may
/// exist per (user, course) pair; the store enforces that inside the
/// same critical section as the status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user: UserId,
    pub course: CourseId,
    /// Smallest currency unit (e.g. paise).
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Gateway-assigned identifier for the pending order. Unique.
    pub order_handle: String,
    /// Gateway transaction id, recorded only on success. Unique.
    pub transaction_id: Option<String>,
    pub receipt: String,
    pub failure_reason: Option<String>,
    /// Correlation metadata forwarded to the gateway.
    pub notes: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        id: PaymentId,
        user: UserId,
        course: CourseId,
        amount: i64,
        currency: &str,
        order_handle: &str,
        receipt: &str,
        notes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id,
            user,
            course,
            amount,
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            order_handle: order_handle.to_string(),
            transaction_id: None,
            receipt: receipt.to_string(),
            failure_reason: None,
            notes,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_payment_shape() {
        let payment = Payment::pending(
            PaymentId::new(),
            UserId::new(),
            CourseId::new(),
            5_000,
            "INR",
            "order_1",
            "rcpt_1",
            BTreeMap::new(),
        );
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.transaction_id.is_none());
        assert!(payment.failure_reason.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&PaymentStatus::Success).unwrap();
        assert_eq!(json, "\"success\"");
    }
}
