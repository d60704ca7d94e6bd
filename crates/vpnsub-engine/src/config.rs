//! Engine configuration.
//!
//! Everything the orchestrator and the reconciler need besides their
//! collaborators: what a subscription costs, how long it lasts, where
//! credentials are issued and who is privileged.

use std::collections::BTreeSet;
use std::time::Duration;

use vpnsub_core::IdentityId;
use vpnsub_panel_client::EndpointSelector;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Host embedded in connection descriptors.
    pub public_host: String,
    /// Which panel endpoint credentials are issued on.
    pub selector: EndpointSelector,
    /// Validity window of a purchased subscription, in days.
    pub validity_days: u32,
    /// Price of one subscription, in the currency's display units.
    pub price: i64,
    pub currency: String,
    /// Pause between reconciliation sweeps.
    pub watch_interval: Duration,
    /// Identities entitled to a free, unbounded subscription.
    pub privileged: BTreeSet<IdentityId>,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `VPN_PUBLIC_HOST` | required |
    /// | `XUI_INBOUND_ID` | unset |
    /// | `XUI_INBOUND_REMARK` | unset |
    /// | `SUBSCRIPTION_DAYS` | 30 |
    /// | `SUBSCRIPTION_PRICE` | 199 |
    /// | `SUBSCRIPTION_CURRENCY` | RUB |
    /// | `SUBSCRIPTION_WATCH_INTERVAL_SEC` | 60 |
    /// | `ADMIN_IDS` | empty (comma-separated identity ids) |
    ///
    /// `SUBSCRIPTION_PRICE_RUB` and `ADMIN_TG_IDS` are read when the
    /// corresponding primary name is unset, so older deployment files keep
    /// working.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let public_host = get("VPN_PUBLIC_HOST").ok_or(ConfigError::MissingVar("VPN_PUBLIC_HOST"))?;

        let selector = EndpointSelector {
            id: parse_opt(&get, "XUI_INBOUND_ID")?,
            label: get("XUI_INBOUND_REMARK"),
        };

        let validity_days: u32 = parse_opt(&get, "SUBSCRIPTION_DAYS")?.unwrap_or(30);
        if validity_days == 0 {
            return Err(ConfigError::Invalid {
                var: "SUBSCRIPTION_DAYS",
                value: "0".to_string(),
            });
        }

        let interval_secs: u64 = parse_opt(&get, "SUBSCRIPTION_WATCH_INTERVAL_SEC")?.unwrap_or(60);
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "SUBSCRIPTION_WATCH_INTERVAL_SEC",
                value: "0".to_string(),
            });
        }

        let price = match parse_opt(&get, "SUBSCRIPTION_PRICE")? {
            Some(price) => price,
            None => parse_opt(&get, "SUBSCRIPTION_PRICE_RUB")?.unwrap_or(199),
        };
        let admin_ids = get("ADMIN_IDS").or_else(|| get("ADMIN_TG_IDS"));

        Ok(Self {
            public_host,
            selector,
            validity_days,
            price,
            currency: get("SUBSCRIPTION_CURRENCY").unwrap_or_else(|| "RUB".to_string()),
            watch_interval: Duration::from_secs(interval_secs),
            privileged: parse_identity_list(admin_ids.as_deref().unwrap_or(""))?,
        })
    }

    /// Whether `identity` is on the privileged allow-list.
    pub fn is_privileged(&self, identity: IdentityId) -> bool {
        self.privileged.contains(&identity)
    }
}

fn parse_opt<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}

/// Parse a comma-separated list of identity ids. Empty items are ignored.
pub fn parse_identity_list(raw: &str) -> Result<BTreeSet<IdentityId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<IdentityId>().map_err(|_| ConfigError::Invalid {
                var: "ADMIN_IDS",
                value: part.to_string(),
            })
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}
