//! # vpnsub-engine -- Subscription provisioning and reconciliation
//!
//! The part of the system with real invariants:
//!
//! - **[`Provisioner`]** turns a settled payment into exactly one panel
//!   credential recorded as a subscription, and grants unbounded
//!   subscriptions to allow-listed identities.
//! - **[`Reconciler`]** revokes credentials whose validity window has
//!   closed, on a fixed interval, until shut down.
//! - **[`MockGateway`]** opens and settles payments without a real provider.
//!
//! Both the provisioner and the reconciler are stateless coordinators over a
//! shared [`vpnsub_ledger::Ledger`] and [`vpnsub_panel_client::PanelClient`].

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod payments;
pub mod reconcile;

pub use config::{ConfigError, EngineConfig};
pub use error::EngineError;
pub use orchestrator::{
    IdentityStatus, ProvisionOutcome, Provisioner, PurchaseOutcome, GRANT_EXPIRES_AT,
    GRANT_PROVIDER,
};
pub use payments::{MockGateway, OpenedPayment, PROVIDER};
pub use reconcile::{Reconciler, ReconcilerHandle, SweepReport};
