//! Resource panel client error types.

/// Errors from resource panel calls.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The call did not complete within the configured timeout.
    #[error("panel call {endpoint} timed out")]
    Timeout { endpoint: String },
    /// The panel returned a non-2xx status.
    #[error("panel {endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// The panel answered 2xx but reported `success: false`.
    #[error("panel {endpoint} rejected the request: {message}")]
    Rejected { endpoint: String, message: String },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: serde_json::Error,
    },
    /// No endpoint matched the selector.
    #[error("endpoint not found: {0}")]
    NotFound(String),
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl PanelError {
    /// Classify a transport error, separating timeouts from other failures.
    pub(crate) fn transport(endpoint: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else {
            Self::Http {
                endpoint: endpoint.to_string(),
                source,
            }
        }
    }

    /// `true` for 401/403 answers, which warrant a fresh login.
    pub(crate) fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}
