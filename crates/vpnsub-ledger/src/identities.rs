//! Identity persistence operations.

use vpnsub_core::IdentityId;

use crate::{now, Ledger, LedgerError};

impl Ledger {
    /// Record `identity` if it has not been seen before. No-op otherwise.
    pub async fn ensure_identity(&self, identity: IdentityId) -> Result<(), LedgerError> {
        sqlx::query("INSERT OR IGNORE INTO identities (id, created_at) VALUES (?, ?)")
            .bind(identity.get())
            .bind(now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether `identity` has been recorded.
    pub async fn identity_exists(&self, identity: IdentityId) -> Result<bool, LedgerError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM identities WHERE id = ?")
            .bind(identity.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
