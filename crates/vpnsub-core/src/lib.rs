//! # vpnsub-core — Foundational Types
//!
//! Defines the records the rest of the workspace passes around: who a user is,
//! what they paid, and what access they were granted. Every other crate
//! depends on `vpnsub-core`; it depends on nothing internal.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `vpnsub-*` crates.
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.
//! - Lifecycle statuses are closed enums with explicit string forms; the
//!   string form is what the ledger stores.

pub mod error;
pub mod identity;
pub mod payment;
pub mod subscription;

pub use error::ParseStatusError;
pub use identity::{IdentityId, PaymentId, SubscriptionId};
pub use payment::{Payment, PaymentStatus};
pub use subscription::{Subscription, SubscriptionStatus};
