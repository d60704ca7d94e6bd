//! # API Route Modules
//!
//! - `payments` — open a purchase and confirm it into a subscription.
//! - `subscriptions` — read an identity's active or latest subscription.
//! - `identities` — privileged grants and identity diagnostics.
//!
//! Every route is keyed by the front end's identity id in the path.

pub mod identities;
pub mod payments;
pub mod subscriptions;
