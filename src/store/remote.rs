//! Remote backup store speaking the salon backup HTTP API.
//!
//! Every write and read against the server goes through the [`RetryExecutor`]
//! so transient failures (network drops, 5xx, timeouts) are retried with
//! exponential backoff. The one exception is [`RemoteStore::database_health`]:
//! the health watcher polls on its own schedule, so a probe is a single
//! attempt and its failure is an answer, not an error to retry.

use crate::models::{BackupSnapshot, ClientRecord, SnapshotSource};
use crate::notify::Notifier;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Remote half of the backup pipeline.
///
/// The service depends on this trait, not on a concrete HTTP client, so tests
/// can swap in an in-memory double and drive failure paths deterministically.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches the live client roster from the primary database.
    async fn fetch_clients(&self) -> Result<Vec<ClientRecord>>;

    /// Uploads a snapshot. The server derives the file name from the
    /// snapshot timestamp and evicts past its retention cap.
    async fn save_snapshot(&self, snapshot: &BackupSnapshot) -> Result<SaveReceipt>;

    /// Newest remote snapshot, or `None` when the server holds none.
    async fn latest_snapshot(&self) -> Result<Option<BackupSnapshot>>;

    /// All remote snapshots, newest first.
    async fn list_snapshots(&self) -> Result<Vec<RemoteBackupEntry>>;

    /// Fetches one remote snapshot by file name.
    async fn restore_snapshot(&self, file_name: &str) -> Result<BackupSnapshot>;

    /// Probes database health. Single attempt, never retried.
    async fn database_health(&self) -> Result<HealthReport>;

    /// Aggregate statistics over the server's backup directory.
    async fn backup_stats(&self) -> Result<RemoteBackupStats>;
}

/// Server acknowledgement of a stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReceipt {
    /// File name the server stored the snapshot under.
    pub file_name: String,
    /// Number of client records the server counted.
    pub clients_count: usize,
}

/// One row of the remote backup listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBackupEntry {
    /// Backup file name.
    pub file_name: String,
    /// Capture timestamp recorded inside the snapshot.
    pub timestamp: DateTime<Utc>,
    /// Number of client records in the snapshot.
    pub clients_count: usize,
    /// File size in bytes.
    pub file_size: u64,
    /// Where the snapshot was captured from.
    pub source: SnapshotSource,
}

/// Database health probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Whether the primary database answered the probe.
    pub healthy: bool,
    /// Server-side probe timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Aggregate statistics over the remote backup directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBackupStats {
    /// Number of backup files on the server.
    pub total_backups: usize,
    /// Timestamp of the newest backup, by file-name timestamp.
    pub latest_backup: Option<DateTime<Utc>>,
    /// Timestamp of the oldest backup, by file-name timestamp.
    pub oldest_backup: Option<DateTime<Utc>>,
    /// Combined size of all backup files in bytes.
    pub total_size: u64,
    /// Combined size in megabytes, rounded to two decimals.
    #[serde(default)]
    pub total_size_mb: f64,
}

#[derive(Debug, Deserialize)]
struct ClientsResponse {
    clients: Vec<ClientRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    backups: Vec<RemoteBackupEntry>,
}

#[derive(Debug, Deserialize)]
struct RestoreResponse {
    data: BackupSnapshot,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    stats: RemoteBackupStats,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// [`RemoteStore`] backed by the backup HTTP API.
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    client: reqwest::Client,
    retry: RetryExecutor,
}

impl HttpRemoteStore {
    /// Creates a store pointed at `base_url` (scheme, host, port; no path).
    #[must_use]
    pub fn new(base_url: impl Into<String>, policy: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!("frannie-backup/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            retry: RetryExecutor::new(policy),
        }
    }

    /// Routes retry-exhaustion notices through `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.retry = self.retry.with_notifier(notifier);
        self
    }

    /// Base URL this store talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

/// Maps a non-success response to the error taxonomy, carrying the server's
/// `message` field when the body has one.
fn classify_error(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| format!("HTTP {status}"));
    Error::from_status(status, message)
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_clients(&self) -> Result<Vec<ClientRecord>> {
        let response: ClientsResponse = self
            .retry
            .execute("fetch_clients", || async move {
                self.get_json("/api/admin/clients").await
            })
            .await?;
        Ok(response.clients)
    }

    async fn save_snapshot(&self, snapshot: &BackupSnapshot) -> Result<SaveReceipt> {
        self.retry
            .execute("save_backup", || async move {
                let response = self
                    .client
                    .post(self.url("/api/backup/save"))
                    .json(snapshot)
                    .send()
                    .await
                    .map_err(|e| Error::Transport(e.to_string()))?;
                let response = Self::check_status(response).await?;
                response
                    .json()
                    .await
                    .map_err(|e| Error::Transport(e.to_string()))
            })
            .await
    }

    async fn latest_snapshot(&self) -> Result<Option<BackupSnapshot>> {
        self.retry
            .execute("latest_backup", || async move {
                let response = self
                    .client
                    .get(self.url("/api/backup/latest"))
                    .send()
                    .await
                    .map_err(|e| Error::Transport(e.to_string()))?;
                // An empty backup directory is an answer, not a failure.
                if response.status().as_u16() == 404 {
                    return Ok(None);
                }
                let response = Self::check_status(response).await?;
                let snapshot: BackupSnapshot = response
                    .json()
                    .await
                    .map_err(|e| Error::Transport(e.to_string()))?;
                Ok(Some(snapshot))
            })
            .await
    }

    async fn list_snapshots(&self) -> Result<Vec<RemoteBackupEntry>> {
        let response: ListResponse = self
            .retry
            .execute("list_backups", || async move {
                self.get_json("/api/backup/list").await
            })
            .await?;
        Ok(response.backups)
    }

    async fn restore_snapshot(&self, file_name: &str) -> Result<BackupSnapshot> {
        let response: RestoreResponse = self
            .retry
            .execute("restore_backup", || async move {
                let response = self
                    .client
                    .post(self.url(&format!("/api/backup/restore/{file_name}")))
                    .send()
                    .await
                    .map_err(|e| Error::Transport(e.to_string()))?;
                let response = Self::check_status(response).await?;
                response
                    .json()
                    .await
                    .map_err(|e| Error::Transport(e.to_string()))
            })
            .await?;
        Ok(response.data)
    }

    async fn database_health(&self) -> Result<HealthReport> {
        self.get_json("/api/health/database").await
    }

    async fn backup_stats(&self) -> Result<RemoteBackupStats> {
        let response: StatsResponse = self
            .retry
            .execute("backup_stats", || async move {
                self.get_json("/api/backup/stats").await
            })
            .await?;
        Ok(response.stats)
    }
}
