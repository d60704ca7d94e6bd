//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor. The [`Provisioner`] carries the ledger and
//! panel handles; everything persistent lives in the ledger.

use thiserror::Error;
use vpnsub_engine::Provisioner;
use zeroize::Zeroizing;

/// Default store location when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/vpnsub.sqlite3";

/// Error loading [`AppConfig`] from the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Server configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Static bearer token the front end presents.
    /// If `None`, authentication is disabled.
    pub auth_token: Option<Zeroizing<String>>,
    /// sqlx connection URL for the ledger.
    pub database_url: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("database_url", &self.database_url)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            database_url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

impl AppConfig {
    /// Read `PORT`, `API_AUTH_TOKEN` and `DATABASE_URL`.
    ///
    /// When `DATABASE_URL` is unset, a bare file path in `SQLITE_PATH` is
    /// accepted instead.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match lookup("PORT").filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                value: raw,
            })?,
            None => defaults.port,
        };

        let auth_token = lookup("API_AUTH_TOKEN")
            .filter(|v| !v.is_empty())
            .map(Zeroizing::new);

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                lookup("SQLITE_PATH")
                    .map(|path| path.trim().to_string())
                    .filter(|path| !path.is_empty())
                    .map(|path| format!("sqlite://{path}"))
            })
            .unwrap_or(defaults.database_url);

        Ok(Self {
            port,
            auth_token,
            database_url,
        })
    }
}

/// State shared by every handler. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub provisioner: Provisioner,
}

impl AppState {
    pub fn new(config: AppConfig, provisioner: Provisioner) -> Self {
        Self {
            config,
            provisioner,
        }
    }
}
