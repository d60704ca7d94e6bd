//! Resource panel client configuration.
//!
//! Points the client at one x-ui / 3x-ui panel. Defaults match a panel
//! listening on the local host. Override via environment variables or
//! explicit construction for testing.

use url::Url;
use zeroize::Zeroizing;

/// Configuration for connecting to the resource panel.
///
/// Custom `Debug` implementation redacts the `password` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct PanelConfig {
    /// Panel base URL, including any web base path the panel is served under.
    /// Default: <http://127.0.0.1:54321>
    pub base_url: Url,
    /// Panel login name.
    pub username: String,
    /// Panel login password. Zeroized on drop.
    pub password: Zeroizing<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PanelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl PanelConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `XUI_BASE_URL` (default: `http://127.0.0.1:54321`)
    /// - `XUI_USERNAME` (required)
    /// - `XUI_PASSWORD` (required)
    /// - `XUI_TIMEOUT_SECS` (default: 15)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };

        let raw_url = lookup("XUI_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "http://127.0.0.1:54321".to_string());
        let base_url = Url::parse(raw_url.trim())
            .map_err(|e| ConfigError::InvalidUrl("XUI_BASE_URL".to_string(), e.to_string()))?;

        Ok(Self {
            base_url,
            username: required("XUI_USERNAME")?,
            password: Zeroizing::new(required("XUI_PASSWORD")?),
            timeout_secs: lookup("XUI_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(15),
        })
    }

    /// Create a configuration pointing at a local mock panel (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `base_url` cannot be parsed.
    pub fn local_mock(base_url: &str) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUrl(base_url.to_string(), e.to_string()))?;
        Ok(Self {
            base_url,
            username: "admin".to_string(),
            password: Zeroizing::new("admin".to_string()),
            timeout_secs: 5,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}
