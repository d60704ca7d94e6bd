//! # vpnsub-panel-client -- Typed Rust client for the x-ui / 3x-ui resource panel
//!
//! Provides typed access to the panel operations the provisioning engine
//! needs:
//! - **Session** via cookie login, renewed once on a 401/403 answer
//! - **Endpoints** via the inbound listing, parsed tolerantly
//! - **Credentials** via add/remove client calls
//!
//! Plus the pure [`build_descriptor`] that renders an issued credential as a
//! `vless://` connection URI.
//!
//! ## Architecture
//!
//! This crate is the only code that talks to the panel. It knows nothing
//! about payments or subscriptions; the engine decides when credentials are
//! issued and revoked.

pub mod client;
pub mod config;
pub mod descriptor;
pub mod endpoint;
pub mod error;

pub use client::PanelClient;
pub use config::{ConfigError, PanelConfig};
pub use descriptor::build_descriptor;
pub use endpoint::{select_endpoint, Endpoint, EndpointSelector, ACCESS_PROTOCOL};
pub use error::PanelError;
