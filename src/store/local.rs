//! Bounded local snapshot history.
//!
//! The browser build kept its history in a single `localStorage` slot; this
//! store keeps the same shape on disk: one JSON file holding an array of
//! snapshots, newest first, truncated to the retention cap on every push.
//! Writes go through a temp sibling plus rename, so a crash mid-write can
//! never leave a half-written history behind.

use crate::models::BackupSnapshot;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Storage key the history file is named after.
pub const BACKUP_KEY: &str = "frannie-clients-backup";

/// File-backed, bounded snapshot history.
#[derive(Debug)]
pub struct LocalStore {
    /// Path of the history file.
    path: PathBuf,
    /// Maximum number of snapshots kept.
    retention: usize,
}

impl LocalStore {
    /// Opens (or initializes) the history under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the data directory cannot be created.
    pub fn new(data_dir: impl Into<PathBuf>, retention: usize) -> Result<Self> {
        let data_dir = data_dir.into();

        fs::create_dir_all(&data_dir).map_err(|e| Error::Storage {
            operation: "create_data_dir".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            path: data_dir.join(format!("{BACKUP_KEY}.json")),
            retention,
        })
    }

    /// Inserts a snapshot and truncates the history to the retention cap.
    ///
    /// The history is kept ordered by capture timestamp, newest first, and
    /// eviction drops the oldest timestamps. A push carrying an older stamp
    /// than existing entries (clock skew, a restored backup) lands in its
    /// timestamp position instead of displacing newer snapshots.
    ///
    /// Returns the number of snapshots now stored.
    pub fn push(&self, snapshot: &BackupSnapshot) -> Result<usize> {
        let mut history = self.read_history()?;
        history.push(snapshot.clone());
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history.truncate(self.retention);
        self.write_history(&history)?;

        tracing::debug!(
            stored = history.len(),
            timestamp = %snapshot.timestamp.to_rfc3339(),
            "snapshot stored locally"
        );

        Ok(history.len())
    }

    /// Returns the newest snapshot, if any.
    pub fn latest(&self) -> Result<Option<BackupSnapshot>> {
        Ok(self.read_history()?.into_iter().next())
    }

    /// Returns the full history, newest first.
    pub fn history(&self) -> Result<Vec<BackupSnapshot>> {
        self.read_history()
    }

    /// Removes the history file entirely.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| Error::Storage {
                operation: "clear_history".to_string(),
                cause: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Summarizes the stored history.
    pub fn stats(&self) -> Result<LocalStoreStats> {
        let history = self.read_history()?;

        Ok(LocalStoreStats {
            total_backups: history.len(),
            latest_backup: history.first().map(|s| s.timestamp),
            oldest_backup: history.last().map(|s| s.timestamp),
            total_clients: history.first().map_or(0, BackupSnapshot::clients_count),
        })
    }

    /// Path of the history file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    fn read_history(&self) -> Result<Vec<BackupSnapshot>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| Error::Storage {
            operation: "read_history".to_string(),
            cause: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| Error::Storage {
            operation: "parse_history".to_string(),
            cause: e.to_string(),
        })
    }

    /// Writes the history atomically: temp sibling first, then rename.
    fn write_history(&self, history: &[BackupSnapshot]) -> Result<()> {
        let json = serde_json::to_string_pretty(history).map_err(|e| Error::Storage {
            operation: "serialize_history".to_string(),
            cause: e.to_string(),
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| Error::Storage {
            operation: "write_history_tmp".to_string(),
            cause: e.to_string(),
        })?;

        fs::rename(&tmp_path, &self.path).map_err(|e| Error::Storage {
            operation: "commit_history".to_string(),
            cause: e.to_string(),
        })
    }
}

/// Summary of the local history, shaped like the admin page expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStoreStats {
    /// Number of snapshots currently stored.
    pub total_backups: usize,
    /// Timestamp of the newest snapshot.
    pub latest_backup: Option<DateTime<Utc>>,
    /// Timestamp of the oldest snapshot.
    pub oldest_backup: Option<DateTime<Utc>>,
    /// Record count of the newest snapshot (0 when empty).
    pub total_clients: usize,
}

impl LocalStoreStats {
    /// One-line operator summary.
    #[must_use]
    pub fn summary(&self) -> String {
        match self.latest_backup {
            Some(latest) => format!(
                "{} backup locali, ultimo {} con {} clienti",
                self.total_backups,
                latest.to_rfc3339(),
                self.total_clients
            ),
            None => "nessun backup locale".to_string(),
        }
    }
}
