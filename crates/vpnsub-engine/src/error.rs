//! Engine error taxonomy.
//!
//! Collapses ledger and panel failures into the categories callers act on.
//! `Conflict` from the ledger never escapes provisioning: it is the
//! idempotency signal and is turned into a replayed result.

use vpnsub_ledger::LedgerError;
use vpnsub_panel_client::PanelError;

/// Errors from orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A referenced payment or subscription does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected a write outside the provisioning path.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller does not own the referenced record.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The resource panel failed or answered unexpectedly.
    #[error("panel error: {0}")]
    Panel(#[source] PanelError),

    /// A panel call did not complete in time.
    #[error("panel call timed out: {0}")]
    Timeout(String),

    /// The ledger failed.
    #[error("store error: {0}")]
    Store(#[source] LedgerError),
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound { entity, id } => Self::NotFound(format!("{entity} {id}")),
            LedgerError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Store(other),
        }
    }
}

impl From<PanelError> for EngineError {
    fn from(err: PanelError) -> Self {
        match err {
            PanelError::Timeout { endpoint } => Self::Timeout(endpoint),
            other => Self::Panel(other),
        }
    }
}
