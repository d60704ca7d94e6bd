//! # Reconciliation Loop
//!
//! Brings panel state in line with subscription expiry. Each cycle lists
//! the active subscriptions whose window has closed, removes their panel
//! credentials and marks them expired.
//!
//! ## Revocation policy
//!
//! Panel removal is best-effort. A subscription whose credential could not
//! be removed is still marked expired: one unreachable credential must not
//! hold back every later entry in the batch. The failure is logged at warn
//! level with the endpoint and label so the credential can be found.
//!
//! ## Cancellation
//!
//! Shutdown is observed only while sleeping between sweeps; a sweep in
//! progress always runs to completion.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vpnsub_ledger::{Ledger, LedgerError};
use vpnsub_panel_client::PanelClient;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired-active subscriptions found.
    pub examined: usize,
    /// Subscriptions whose panel credential was removed.
    pub revoked: usize,
    /// Subscriptions marked expired although panel removal failed.
    pub revoke_failures: usize,
}

/// Periodic expiry sweeper.
#[derive(Debug, Clone)]
pub struct Reconciler {
    ledger: Ledger,
    panel: PanelClient,
    interval: Duration,
}

impl Reconciler {
    pub fn new(ledger: Ledger, panel: PanelClient, interval: Duration) -> Self {
        Self {
            ledger,
            panel,
            interval,
        }
    }

    /// Run one sweep against the wall-clock instant `at`.
    ///
    /// A ledger failure aborts the sweep; subscriptions already handled
    /// stay handled.
    pub async fn sweep(&self, at: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        let due = self.ledger.list_expired_active(at).await?;
        let mut report = SweepReport {
            examined: due.len(),
            ..SweepReport::default()
        };

        for subscription in due {
            match self
                .panel
                .remove_client(subscription.endpoint_id, &subscription.credential_secret)
                .await
            {
                Ok(()) => report.revoked += 1,
                Err(e) => {
                    report.revoke_failures += 1;
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        endpoint_id = subscription.endpoint_id,
                        label = %subscription.credential_label,
                        error = %e,
                        "panel revoke failed; marking subscription expired anyway"
                    );
                }
            }

            if self.ledger.mark_expired(subscription.id).await? {
                tracing::info!(
                    subscription_id = %subscription.id,
                    identity = %subscription.identity,
                    expires_at = %subscription.expires_at,
                    "subscription expired"
                );
            }
        }

        Ok(report)
    }

    /// Sweep, then sleep, until `shutdown` flips to `true` or its sender is
    /// dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "reconciliation loop started");

        loop {
            match self.sweep(Utc::now()).await {
                Ok(report) if report.examined > 0 => {
                    tracing::info!(
                        examined = report.examined,
                        revoked = report.revoked,
                        revoke_failures = report.revoke_failures,
                        "reconciliation sweep finished"
                    );
                }
                Ok(_) => tracing::debug!("reconciliation sweep found nothing due"),
                Err(e) => tracing::error!(error = %e, "reconciliation sweep aborted"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("reconciliation loop stopped");
    }

    /// Run the loop on a background task.
    pub fn spawn(self) -> ReconcilerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        ReconcilerHandle { shutdown_tx, task }
    }
}

/// Handle to a spawned [`Reconciler`].
#[derive(Debug)]
pub struct ReconcilerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Ask the loop to stop and wait for it. An in-flight sweep finishes
    /// first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "reconciliation task ended abnormally");
        }
    }
}
