//! # vpnsub-ledger — Durable Ledger
//!
//! Persists identities, payments and subscriptions to SQLite via SQLx. The
//! ledger is the only owner of durable state: the orchestrator and the
//! reconciler are stateless coordinators that re-derive everything from here.
//!
//! ## Atomicity
//!
//! Every operation is a single statement, or a single transaction where a
//! write spans two tables. No partial write is ever observable. Multi-step
//! check-then-act sequences in the engine are serialized by the unique
//! constraint on `subscriptions.payment_id`, not by transactions.
//!
//! ## Schema
//!
//! Embedded migrations in `migrations/` run on every [`Ledger::connect`].
//! Already-applied migrations are skipped, so startup is idempotent.
//!
//! ## Timestamps
//!
//! Stored as whole unix seconds. Records returned from writes carry the
//! truncated values, so they compare equal to the same rows read back.

pub mod error;
mod identities;
mod payments;
mod subscriptions;

pub use error::LedgerError;
pub use payments::NewPayment;
pub use subscriptions::NewSubscription;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Handle to the durable store. Cheap to clone; clones share one pool.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Open (creating if missing) the SQLite database at `url` and apply
    /// migrations.
    ///
    /// `url` takes the `sqlite://path/to/file.sqlite3` form.
    pub async fn connect(url: &str) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        tracing::info!(url, "connected to SQLite ledger");

        let ledger = Self { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    /// Build a private in-memory ledger with the schema applied.
    ///
    /// The pool is pinned to one connection that never idles out: an
    /// in-memory SQLite database lives exactly as long as its connection.
    pub async fn in_memory() -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.migrate().await?;
        Ok(ledger)
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        MIGRATOR.run(&self.pool).await?;
        tracing::debug!("ledger migrations applied");
        Ok(())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection. Subsequent operations fail with
    /// [`LedgerError::Store`].
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Whole-second resolution, matching what the store keeps.
pub(crate) fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

pub(crate) fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

pub(crate) fn from_unix(
    table: &'static str,
    id: &dyn std::fmt::Display,
    secs: i64,
) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| LedgerError::Corrupt {
        table,
        id: id.to_string(),
        reason: format!("timestamp out of range: {secs}"),
    })
}

