//! Mock payment gateway.
//!
//! Stands in for a real provider: a payment is opened `pending` and moves to
//! `succeeded` when the owner says they paid. A real gateway replaces
//! [`MockGateway::confirm`] with its webhook or poll result; nothing
//! downstream changes.

use serde_json::json;
use uuid::Uuid;
use vpnsub_core::{IdentityId, Payment, PaymentId, PaymentStatus};
use vpnsub_ledger::{Ledger, LedgerError, NewPayment};

use crate::error::EngineError;

/// Provider name recorded on payments opened through [`MockGateway`].
pub const PROVIDER: &str = "payment_mock";

/// A payment handed back to the purchaser.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedPayment {
    pub payment: Payment,
    /// `true` when an in-flight pending payment was resumed instead of
    /// opening a new one.
    pub resumed: bool,
}

/// Payment gateway that settles payments on the owner's word.
#[derive(Debug, Clone)]
pub struct MockGateway {
    ledger: Ledger,
}

impl MockGateway {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Open a payment for `amount` `currency`, resuming the newest pending
    /// one on the same terms if there is one.
    pub async fn open_payment(
        &self,
        identity: IdentityId,
        amount: i64,
        currency: &str,
    ) -> Result<OpenedPayment, LedgerError> {
        if let Some(payment) = self
            .ledger
            .find_latest_pending_payment(identity, PROVIDER, amount, currency)
            .await?
        {
            tracing::debug!(payment_id = %payment.id, %identity, "resuming pending payment");
            return Ok(OpenedPayment {
                payment,
                resumed: true,
            });
        }

        let payment = self
            .ledger
            .create_payment(NewPayment {
                identity,
                provider: PROVIDER.to_string(),
                amount,
                currency: currency.to_string(),
                idempotency_key: Uuid::new_v4().simple().to_string(),
                payload: json!({}),
            })
            .await?;
        tracing::info!(payment_id = %payment.id, %identity, amount, currency, "payment opened");

        Ok(OpenedPayment {
            payment,
            resumed: false,
        })
    }

    /// Settle a pending payment owned by `identity`.
    ///
    /// Settled payments are returned unchanged.
    pub async fn confirm(
        &self,
        payment_id: PaymentId,
        identity: IdentityId,
    ) -> Result<Payment, EngineError> {
        let payment = self.ledger.get_payment(payment_id).await?;
        if payment.identity != identity {
            return Err(EngineError::Forbidden(format!(
                "payment {payment_id} does not belong to identity {identity}"
            )));
        }
        if payment.status != PaymentStatus::Pending {
            return Ok(payment);
        }

        let confirmed = self
            .ledger
            .set_payment_status(payment_id, PaymentStatus::Succeeded)
            .await?;
        Ok(confirmed)
    }
}
