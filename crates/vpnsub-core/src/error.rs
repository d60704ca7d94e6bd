//! Errors raised when decoding core types from their stored form.

use thiserror::Error;

/// A status string did not name any known lifecycle state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} status: {value:?}")]
pub struct ParseStatusError {
    /// Which lifecycle the status belongs to ("payment", "subscription").
    pub kind: &'static str,
    /// The rejected value.
    pub value: String,
}

impl ParseStatusError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
