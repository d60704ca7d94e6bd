//! Payment persistence operations.
//!
//! Status transitions are not policed here: `set_payment_status` writes what
//! it is told. Keeping payments `pending → succeeded | failed` is the
//! orchestrator's job.

use uuid::Uuid;
use vpnsub_core::{IdentityId, Payment, PaymentId, PaymentStatus};

use crate::{from_unix, now, Ledger, LedgerError};

const PAYMENT_COLUMNS: &str = "id, identity_id, provider, amount, currency, status, \
     idempotency_key, created_at, updated_at, payload_json";

/// Fields supplied by the caller when creating a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub identity: IdentityId,
    pub provider: String,
    pub amount: i64,
    pub currency: String,
    pub idempotency_key: String,
    pub payload: serde_json::Value,
}

impl Ledger {
    /// Create a `pending` payment, recording the identity if it is new.
    ///
    /// Fails with [`LedgerError::Conflict`] if the idempotency key is taken;
    /// fetch the existing row with
    /// [`find_payment_by_idempotency_key`](Self::find_payment_by_idempotency_key)
    /// instead.
    pub async fn create_payment(&self, new: NewPayment) -> Result<Payment, LedgerError> {
        let id = PaymentId::new();
        let ts = now();
        let payload_json =
            serde_json::to_string(&new.payload).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO identities (id, created_at) VALUES (?, ?)")
            .bind(new.identity.get())
            .bind(ts.timestamp())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO payments
                (id, identity_id, provider, amount, currency, status, idempotency_key,
                 created_at, updated_at, payload_json)
             VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?)",
        )
        .bind(id.0)
        .bind(new.identity.get())
        .bind(&new.provider)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(&new.idempotency_key)
        .bind(ts.timestamp())
        .bind(ts.timestamp())
        .bind(&payload_json)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            LedgerError::from_write(e, || {
                format!("idempotency key already used: {}", new.idempotency_key)
            })
        })?;

        tx.commit().await?;

        tracing::debug!(
            payment_id = %id,
            identity = %new.identity,
            provider = %new.provider,
            "payment created"
        );

        Ok(Payment {
            id,
            identity: new.identity,
            provider: new.provider,
            amount: new.amount,
            currency: new.currency,
            status: PaymentStatus::Pending,
            idempotency_key: new.idempotency_key,
            created_at: ts,
            updated_at: ts,
            payload: new.payload,
        })
    }

    /// Fetch a payment by ID.
    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment, LedgerError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?");
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.into_payment(),
            None => Err(LedgerError::not_found("payment", id)),
        }
    }

    /// Fetch the payment created under `key`, if any.
    pub async fn find_payment_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Payment>, LedgerError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE idempotency_key = ?");
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PaymentRow::into_payment).transpose()
    }

    /// The newest `pending` payment matching all of the given terms.
    ///
    /// Lets a front end resume an in-flight purchase instead of opening a
    /// second one.
    pub async fn find_latest_pending_payment(
        &self,
        identity: IdentityId,
        provider: &str,
        amount: i64,
        currency: &str,
    ) -> Result<Option<Payment>, LedgerError> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE identity_id = ? AND provider = ? AND amount = ? AND currency = ?
               AND status = 'pending'
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(identity.get())
            .bind(provider)
            .bind(amount)
            .bind(currency)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PaymentRow::into_payment).transpose()
    }

    /// Set a payment's status and return the stored record.
    ///
    /// A no-op (including `updated_at`) when the payment is already in
    /// `status`.
    pub async fn set_payment_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<Payment, LedgerError> {
        let result = sqlx::query(
            "UPDATE payments SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status <> ?1",
        )
        .bind(status.as_str())
        .bind(now().timestamp())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(payment_id = %id, status = %status, "payment status updated");
        }

        self.get_payment(id).await
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    identity_id: i64,
    provider: String,
    amount: i64,
    currency: String,
    status: String,
    idempotency_key: String,
    created_at: i64,
    updated_at: i64,
    payload_json: String,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, LedgerError> {
        let id = PaymentId(self.id);
        let status = self
            .status
            .parse::<PaymentStatus>()
            .map_err(|e| LedgerError::Corrupt {
                table: "payments",
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        let payload = serde_json::from_str(&self.payload_json).unwrap_or_else(|e| {
            tracing::warn!(
                payment_id = %id,
                error = %e,
                "unreadable payment payload; substituting an empty object"
            );
            serde_json::json!({})
        });

        Ok(Payment {
            id,
            identity: IdentityId(self.identity_id),
            provider: self.provider,
            amount: self.amount,
            currency: self.currency,
            status,
            idempotency_key: self.idempotency_key,
            created_at: from_unix("payments", &id, self.created_at)?,
            updated_at: from_unix("payments", &id, self.updated_at)?,
            payload,
        })
    }
}
