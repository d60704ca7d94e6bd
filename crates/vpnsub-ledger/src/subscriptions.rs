//! Subscription persistence operations.
//!
//! The unique constraint on `payment_id` is the serialization point for
//! provisioning: two flows racing on one payment both reach
//! `create_subscription`, and exactly one row survives.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use vpnsub_core::{IdentityId, PaymentId, Subscription, SubscriptionId, SubscriptionStatus};

use crate::{from_unix, now, truncate, Ledger, LedgerError};

const SUBSCRIPTION_COLUMNS: &str = "id, identity_id, payment_id, endpoint_id, credential_secret, \
     credential_label, connection_descriptor, status, created_at, starts_at, expires_at, revoked_at";

/// Fields supplied by the orchestrator once a credential has been issued.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub identity: IdentityId,
    pub payment_id: PaymentId,
    pub endpoint_id: i64,
    pub credential_secret: String,
    pub credential_label: String,
    pub connection_descriptor: String,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Ledger {
    /// Record an issued credential as an `active` subscription.
    ///
    /// Fails with [`LedgerError::Conflict`] if the payment already has a
    /// subscription.
    pub async fn create_subscription(
        &self,
        new: NewSubscription,
    ) -> Result<Subscription, LedgerError> {
        let id = SubscriptionId::new();
        let created_at = now();
        let starts_at = truncate(new.starts_at);
        let expires_at = truncate(new.expires_at);

        sqlx::query(
            "INSERT INTO subscriptions
                (id, identity_id, payment_id, endpoint_id, credential_secret, credential_label,
                 connection_descriptor, status, created_at, starts_at, expires_at, revoked_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'active', ?, ?, ?, NULL)",
        )
        .bind(id.0)
        .bind(new.identity.get())
        .bind(new.payment_id.0)
        .bind(new.endpoint_id)
        .bind(&new.credential_secret)
        .bind(&new.credential_label)
        .bind(&new.connection_descriptor)
        .bind(created_at.timestamp())
        .bind(starts_at.timestamp())
        .bind(expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            LedgerError::from_write(e, || {
                format!("payment {} already has a subscription", new.payment_id)
            })
        })?;

        tracing::info!(
            subscription_id = %id,
            identity = %new.identity,
            payment_id = %new.payment_id,
            expires_at = %expires_at,
            "subscription recorded"
        );

        Ok(Subscription {
            id,
            identity: new.identity,
            payment_id: new.payment_id,
            endpoint_id: new.endpoint_id,
            credential_secret: new.credential_secret,
            credential_label: new.credential_label,
            connection_descriptor: new.connection_descriptor,
            status: SubscriptionStatus::Active,
            created_at,
            starts_at,
            expires_at,
            revoked_at: None,
        })
    }

    /// Fetch a subscription by ID.
    pub async fn get_subscription(&self, id: SubscriptionId) -> Result<Subscription, LedgerError> {
        let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?");
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.into_subscription(),
            None => Err(LedgerError::not_found("subscription", id)),
        }
    }

    /// The newest subscription of `identity` that is active and unexpired at `at`.
    pub async fn get_active_subscription(
        &self,
        identity: IdentityId,
        at: DateTime<Utc>,
    ) -> Result<Option<Subscription>, LedgerError> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE identity_id = ? AND status = 'active' AND expires_at > ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(identity.get())
            .bind(at.timestamp())
            .fetch_optional(&self.pool)
            .await?;

        row.map(SubscriptionRow::into_subscription).transpose()
    }

    /// The newest subscription of `identity` in any state.
    pub async fn get_latest_subscription(
        &self,
        identity: IdentityId,
    ) -> Result<Option<Subscription>, LedgerError> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE identity_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(identity.get())
            .fetch_optional(&self.pool)
            .await?;

        row.map(SubscriptionRow::into_subscription).transpose()
    }

    /// The subscription issued for `payment_id`, if any.
    pub async fn get_subscription_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Subscription>, LedgerError> {
        let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE payment_id = ?");
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(payment_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(SubscriptionRow::into_subscription).transpose()
    }

    /// Every `active` subscription whose `expires_at` is at or before `at`,
    /// oldest expiry first.
    pub async fn list_expired_active(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, LedgerError> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE status = 'active' AND expires_at <= ?
             ORDER BY expires_at ASC, created_at ASC"
        );
        let rows = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(at.timestamp())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(SubscriptionRow::into_subscription)
            .collect()
    }

    /// Move a subscription to `expired`, stamping `revoked_at`.
    ///
    /// Returns `false` without touching the row if it was already expired.
    pub async fn mark_expired(&self, id: SubscriptionId) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = 'expired', revoked_at = ?
             WHERE id = ? AND status = 'active'",
        )
        .bind(now().timestamp())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    identity_id: i64,
    payment_id: Uuid,
    endpoint_id: i64,
    credential_secret: String,
    credential_label: String,
    connection_descriptor: String,
    status: String,
    created_at: i64,
    starts_at: i64,
    expires_at: i64,
    revoked_at: Option<i64>,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Result<Subscription, LedgerError> {
        let id = SubscriptionId(self.id);
        let status = self
            .status
            .parse::<SubscriptionStatus>()
            .map_err(|e| LedgerError::Corrupt {
                table: "subscriptions",
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        let revoked_at = match self.revoked_at {
            Some(secs) => Some(from_unix("subscriptions", &id, secs)?),
            None => None,
        };

        Ok(Subscription {
            id,
            identity: IdentityId(self.identity_id),
            payment_id: PaymentId(self.payment_id),
            endpoint_id: self.endpoint_id,
            credential_secret: self.credential_secret,
            credential_label: self.credential_label,
            connection_descriptor: self.connection_descriptor,
            status,
            created_at: from_unix("subscriptions", &id, self.created_at)?,
            starts_at: from_unix("subscriptions", &id, self.starts_at)?,
            expires_at: from_unix("subscriptions", &id, self.expires_at)?,
            revoked_at,
        })
    }
}
