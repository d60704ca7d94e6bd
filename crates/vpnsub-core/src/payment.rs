//! # Payment Records
//!
//! A payment is created `pending` and moves exactly once, to `succeeded` or
//! `failed`. The idempotency key is unique per logical payment attempt so a
//! retried "create" never produces a second row.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseStatusError;
use crate::identity::{IdentityId, PaymentId};

/// Lifecycle state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created, awaiting confirmation.
    Pending,
    /// Confirmed by the gateway. Terminal.
    Succeeded,
    /// Rejected by the gateway. Terminal.
    Failed,
}

impl PaymentStatus {
    /// The stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(ParseStatusError::new("payment", other)),
        }
    }
}

/// A payment as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub identity: IdentityId,
    /// Gateway that produced the payment (`payment_mock`, `admin_grant`).
    pub provider: String,
    /// Amount in the currency's whole units as priced by the front end.
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Gateway-specific data, opaque to the engine.
    pub payload: serde_json::Value,
}

impl Payment {
    /// Whether the payment has been confirmed.
    pub fn is_succeeded(&self) -> bool {
        self.status == PaymentStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_forms_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Succeeded,
            PaymentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "refunded".parse::<PaymentStatus>().unwrap_err();
        assert_eq!(err.kind, "payment");
        assert_eq!(err.value, "refunded");
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Succeeded.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
    }
}
