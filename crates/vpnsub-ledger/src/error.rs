//! Ledger error types.

use thiserror::Error;

/// Errors from ledger operations.
///
/// `Conflict` is not a failure in the usual sense: callers use it as the
/// signal that a uniqueness constraint already holds the row they tried to
/// create, and re-fetch instead.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row could not be decoded into a domain record.
    #[error("corrupt {table} row {id}: {reason}")]
    Corrupt {
        table: &'static str,
        id: String,
        reason: String,
    },

    /// The database rejected or failed the statement.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Schema migration failed at startup.
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The store location could not be prepared.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Map a unique-constraint violation to [`LedgerError::Conflict`], keeping
    /// every other database error as [`LedgerError::Store`].
    pub(crate) fn from_write(err: sqlx::Error, conflict: impl FnOnce() -> String) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(conflict()),
            _ => Self::Store(err),
        }
    }
}
