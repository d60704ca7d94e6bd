//! # Provisioning Orchestrator
//!
//! Turns a settled payment into exactly one panel credential recorded as a
//! subscription. Both entry points are safe under at-least-once invocation.
//!
//! ## Flow
//!
//! | Step | Action | On failure |
//! |------|--------|------------|
//! | 1 | Load payment, check owner | `NotFound` / `Forbidden` |
//! | 2 | Settled with a subscription already? Return it | |
//! | 3 | Settle a pending payment through the gateway | `Store` |
//! | 4 | Still not settled? Report the payment | |
//! | 5 | Resolve endpoint, generate secret and label | `Panel` / `Timeout` |
//! | 6 | `add_client` with `now + validity` | `Panel` / `Timeout` |
//! | 7 | Build connection descriptor | never fails |
//! | 8 | `create_subscription`, `Conflict` returns the winner | `Store` |
//!
//! ## Serialization
//!
//! Nothing here holds a lock or a transaction across steps. The unique
//! constraint on `subscriptions.payment_id` decides which of two concurrent
//! flows wins at step 8; the loser removes the credential it issued and
//! returns the winner's subscription.
//!
//! ## Orphaned credentials
//!
//! If step 8 fails for any reason other than `Conflict`, the credential from
//! step 6 exists on the panel with no ledger row. The failure is logged at
//! error level with the endpoint and label, and removal is attempted once.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;
use vpnsub_core::{IdentityId, Payment, PaymentId, PaymentStatus, Subscription};
use vpnsub_ledger::{Ledger, LedgerError, NewPayment, NewSubscription};
use vpnsub_panel_client::{build_descriptor, PanelClient};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::payments::{MockGateway, OpenedPayment};

/// Provider name recorded on privileged grant payments.
pub const GRANT_PROVIDER: &str = "admin_grant";

/// Expiry of privileged grants: 2100-01-01T00:00:00Z.
pub const GRANT_EXPIRES_AT: i64 = 4_102_444_800;

const PURCHASE_LABEL_PREFIX: &str = "tg";
const GRANT_LABEL_PREFIX: &str = "admin";

/// Result of [`Provisioner::confirm_and_provision`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// A subscription exists for the payment. `replayed` is `true` when it
    /// was created by an earlier or concurrent call.
    Provisioned {
        subscription: Subscription,
        replayed: bool,
    },
    /// The payment did not settle; nothing was provisioned.
    PaymentNotSucceeded { payment: Payment },
}

/// Result of [`Provisioner::start_purchase`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    /// The identity already holds an unexpired subscription.
    AlreadyActive { subscription: Subscription },
    /// A payment awaits confirmation.
    Pending { payment: Payment, resumed: bool },
}

/// Diagnostic view of one identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityStatus {
    pub identity: IdentityId,
    pub privileged: bool,
    pub active_subscription: Option<Subscription>,
}

/// Coordinates the gateway, the panel and the ledger. Holds no state of its
/// own; cheap to clone.
#[derive(Debug, Clone)]
pub struct Provisioner {
    ledger: Ledger,
    panel: PanelClient,
    gateway: MockGateway,
    config: Arc<EngineConfig>,
}

impl Provisioner {
    pub fn new(ledger: Ledger, panel: PanelClient, config: Arc<EngineConfig>) -> Self {
        Self {
            gateway: MockGateway::new(ledger.clone()),
            ledger,
            panel,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open (or resume) a purchase for `identity`, unless it already holds
    /// an active subscription.
    pub async fn start_purchase(&self, identity: IdentityId) -> Result<PurchaseOutcome, EngineError> {
        self.ledger.ensure_identity(identity).await?;

        if let Some(subscription) = self.ledger.get_active_subscription(identity, Utc::now()).await? {
            return Ok(PurchaseOutcome::AlreadyActive { subscription });
        }

        let OpenedPayment { payment, resumed } = self
            .gateway
            .open_payment(identity, self.config.price, &self.config.currency)
            .await?;
        Ok(PurchaseOutcome::Pending { payment, resumed })
    }

    /// Settle `payment_id` and provision its subscription.
    pub async fn confirm_and_provision(
        &self,
        payment_id: PaymentId,
        identity: IdentityId,
    ) -> Result<ProvisionOutcome, EngineError> {
        let payment = self.ledger.get_payment(payment_id).await?;
        if payment.identity != identity {
            tracing::warn!(%payment_id, %identity, owner = %payment.identity, "payment owner mismatch");
            return Err(EngineError::Forbidden(format!(
                "payment {payment_id} does not belong to identity {identity}"
            )));
        }

        if payment.is_succeeded() {
            if let Some(subscription) = self.ledger.get_subscription_by_payment(payment_id).await? {
                return Ok(ProvisionOutcome::Provisioned {
                    subscription,
                    replayed: true,
                });
            }
        }

        let payment = if payment.status == PaymentStatus::Pending {
            self.gateway.confirm(payment_id, identity).await?
        } else {
            payment
        };
        if !payment.is_succeeded() {
            tracing::info!(%payment_id, status = %payment.status, "payment not settled; nothing provisioned");
            return Ok(ProvisionOutcome::PaymentNotSucceeded { payment });
        }

        let starts_at = Utc::now();
        let expires_at = starts_at
            .checked_add_signed(Duration::days(i64::from(self.config.validity_days)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let (subscription, replayed) = self
            .issue(identity, payment_id, PURCHASE_LABEL_PREFIX, starts_at, expires_at)
            .await?;
        Ok(ProvisionOutcome::Provisioned {
            subscription,
            replayed,
        })
    }

    /// Give an allow-listed identity an unbounded subscription.
    ///
    /// Returns the new subscription, or `None` when the identity is not
    /// privileged or already covered.
    pub async fn grant_privileged(
        &self,
        identity: IdentityId,
    ) -> Result<Option<Subscription>, EngineError> {
        if !self.config.is_privileged(identity) {
            return Ok(None);
        }
        if self
            .ledger
            .get_active_subscription(identity, Utc::now())
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let payment = self.grant_payment(identity).await?;
        if self.ledger.get_subscription_by_payment(payment.id).await?.is_some() {
            return Ok(None);
        }

        let expires_at = DateTime::from_timestamp(GRANT_EXPIRES_AT, 0).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let (subscription, replayed) = self
            .issue(identity, payment.id, GRANT_LABEL_PREFIX, Utc::now(), expires_at)
            .await?;
        if replayed {
            return Ok(None);
        }
        tracing::info!(%identity, subscription_id = %subscription.id, "privileged subscription granted");
        Ok(Some(subscription))
    }

    /// The identity's active subscription, if any.
    pub async fn active_subscription(
        &self,
        identity: IdentityId,
    ) -> Result<Option<Subscription>, EngineError> {
        Ok(self.ledger.get_active_subscription(identity, Utc::now()).await?)
    }

    /// The identity's newest subscription in any state.
    pub async fn latest_subscription(
        &self,
        identity: IdentityId,
    ) -> Result<Option<Subscription>, EngineError> {
        Ok(self.ledger.get_latest_subscription(identity).await?)
    }

    pub async fn identity_status(&self, identity: IdentityId) -> Result<IdentityStatus, EngineError> {
        Ok(IdentityStatus {
            identity,
            privileged: self.config.is_privileged(identity),
            active_subscription: self.active_subscription(identity).await?,
        })
    }

    /// The identity's grant payment, created on first use and always settled.
    async fn grant_payment(&self, identity: IdentityId) -> Result<Payment, EngineError> {
        let key = format!("admin-grant:{identity}");

        let payment = match self.ledger.find_payment_by_idempotency_key(&key).await? {
            Some(existing) => existing,
            None => {
                let created = self
                    .ledger
                    .create_payment(NewPayment {
                        identity,
                        provider: GRANT_PROVIDER.to_string(),
                        amount: 0,
                        currency: self.config.currency.clone(),
                        idempotency_key: key.clone(),
                        payload: json!({}),
                    })
                    .await;
                match created {
                    Ok(payment) => payment,
                    Err(LedgerError::Conflict(_)) => self
                        .ledger
                        .find_payment_by_idempotency_key(&key)
                        .await?
                        .ok_or_else(|| EngineError::NotFound(format!("grant payment {key}")))?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if payment.is_succeeded() {
            return Ok(payment);
        }
        Ok(self
            .ledger
            .set_payment_status(payment.id, PaymentStatus::Succeeded)
            .await?)
    }

    /// Issue a credential on the panel and record it.
    async fn issue(
        &self,
        identity: IdentityId,
        payment_id: PaymentId,
        label_prefix: &str,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(Subscription, bool), EngineError> {
        let endpoint = self.panel.resolve_endpoint(&self.config.selector).await?;
        let secret = Uuid::new_v4().to_string();
        let label = format!("{label_prefix}{identity}-{}", &secret[..8]);

        self.panel
            .add_client(endpoint.id, &secret, &label, expires_at)
            .await?;

        let connection_descriptor =
            build_descriptor(&endpoint, &self.config.public_host, &secret, &label);

        let recorded = self
            .ledger
            .create_subscription(NewSubscription {
                identity,
                payment_id,
                endpoint_id: endpoint.id,
                credential_secret: secret.clone(),
                credential_label: label.clone(),
                connection_descriptor,
                starts_at,
                expires_at,
            })
            .await;

        match recorded {
            Ok(subscription) => Ok((subscription, false)),
            Err(LedgerError::Conflict(_)) => {
                tracing::info!(
                    %payment_id,
                    endpoint_id = endpoint.id,
                    %label,
                    "payment already provisioned by a concurrent call; discarding this credential"
                );
                self.discard_credential(endpoint.id, &secret, &label).await;
                let winner = self
                    .ledger
                    .get_subscription_by_payment(payment_id)
                    .await?
                    .ok_or_else(|| {
                        EngineError::Conflict(format!("payment {payment_id} conflicted but has no subscription"))
                    })?;
                Ok((winner, true))
            }
            Err(err) => {
                tracing::error!(
                    %payment_id,
                    endpoint_id = endpoint.id,
                    %label,
                    error = %err,
                    "subscription not recorded; panel credential is orphaned"
                );
                self.discard_credential(endpoint.id, &secret, &label).await;
                Err(err.into())
            }
        }
    }

    async fn discard_credential(&self, endpoint_id: i64, secret: &str, label: &str) {
        if let Err(e) = self.panel.remove_client(endpoint_id, secret).await {
            tracing::warn!(endpoint_id, label, error = %e, "could not remove unused panel credential");
        }
    }
}
