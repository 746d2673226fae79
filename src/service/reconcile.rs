//! Reconciliation between the local history and the remote store.
//!
//! Newer wins, keyed on snapshot timestamps. Both latest snapshots are read
//! before anything is written, so an I/O error anywhere leaves both stores
//! untouched.

use super::BackupService;
use crate::Result;
use std::cmp::Ordering;
use std::fmt;
use tracing::instrument;

/// Result of one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The server held the newer snapshot; the local history was updated.
    ServerNewer,
    /// The local history held the newer snapshot; it was pushed to the server.
    LocalNewer,
    /// Both sides already agree; nothing was written.
    InSync,
}

impl SyncOutcome {
    /// The status line the admin surface shows for this outcome.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ServerNewer => "Dati aggiornati dal server",
            Self::LocalNewer => "Dati locali sincronizzati sul server",
            Self::InSync => "Dati già sincronizzati",
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::ServerNewer => "server-newer",
            Self::LocalNewer => "local-newer",
            Self::InSync => "synced",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BackupService {
    /// Reconciles the local history with the remote store.
    ///
    /// Compares the newest snapshot on each side by capture timestamp and
    /// copies the newer one over. A missing side is treated as infinitely
    /// old: a remote-only snapshot is pulled into the local history, a
    /// local-only snapshot is pushed to the server, and two empty stores are
    /// trivially in sync. Equal timestamps write nothing, so running
    /// reconciliation twice in a row is a no-op the second time.
    ///
    /// Runs under the same single-flight lock as [`capture`], so a
    /// reconciliation never reads the local history mid-replace.
    ///
    /// # Errors
    ///
    /// Any read or write failure surfaces as the corresponding [`crate::Error`];
    /// on a read failure nothing has been written to either side.
    ///
    /// [`capture`]: BackupService::capture
    #[instrument(skip(self), fields(operation = "backup.sync"))]
    pub async fn sync_with_server(&self) -> Result<SyncOutcome> {
        let _guard = self.flight.lock().await;

        // Both reads happen before any write.
        let local_latest = self.local.latest()?;
        let remote_latest = self.remote.latest_snapshot().await?;

        let outcome = match (local_latest, remote_latest) {
            (None, None) => SyncOutcome::InSync,
            (None, Some(remote)) => {
                self.local.push(&remote)?;
                SyncOutcome::ServerNewer
            },
            (Some(local), None) => {
                self.remote.save_snapshot(&local).await?;
                SyncOutcome::LocalNewer
            },
            (Some(local), Some(remote)) => match remote.timestamp.cmp(&local.timestamp) {
                Ordering::Greater => {
                    self.local.push(&remote)?;
                    SyncOutcome::ServerNewer
                },
                Ordering::Less => {
                    self.remote.save_snapshot(&local).await?;
                    SyncOutcome::LocalNewer
                },
                Ordering::Equal => SyncOutcome::InSync,
            },
        };

        tracing::info!(outcome = %outcome, "reconciliation finished");
        metrics::counter!("sync.operations", "outcome" => outcome.as_str()).increment(1);

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_messages() {
        assert_eq!(SyncOutcome::ServerNewer.message(), "Dati aggiornati dal server");
        assert_eq!(
            SyncOutcome::LocalNewer.message(),
            "Dati locali sincronizzati sul server"
        );
        assert_eq!(SyncOutcome::InSync.message(), "Dati già sincronizzati");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(SyncOutcome::ServerNewer.to_string(), "server-newer");
        assert_eq!(SyncOutcome::LocalNewer.to_string(), "local-newer");
        assert_eq!(SyncOutcome::InSync.to_string(), "synced");
    }
}
