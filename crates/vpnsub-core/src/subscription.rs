//! # Subscription Records
//!
//! A subscription is the durable record of one provisioned credential. It is
//! written only as the last step of a successful provisioning flow, so a row
//! always refers to a credential that was accepted by the panel.
//!
//! ## States
//!
//! ACTIVE → EXPIRED (exactly once, stamping `revoked_at`)

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseStatusError;
use crate::identity::{IdentityId, PaymentId, SubscriptionId};

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    /// Revoked by reconciliation. Terminal.
    Expired,
}

impl SubscriptionStatus {
    /// The stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            other => Err(ParseStatusError::new("subscription", other)),
        }
    }
}

/// A subscription as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub identity: IdentityId,
    /// The payment this subscription was issued for. Unique across rows.
    pub payment_id: PaymentId,
    /// Panel endpoint the credential lives on.
    pub endpoint_id: i64,
    /// Client secret registered on the panel.
    pub credential_secret: String,
    /// Human-readable client label registered on the panel.
    pub credential_label: String,
    /// URI handed to the end user's client application.
    pub connection_descriptor: String,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Whether the subscription grants access at `at`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.expires_at > at
    }
}
