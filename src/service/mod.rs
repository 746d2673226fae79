//! Backup and reconciliation service.
//!
//! [`BackupService`] owns the whole pipeline: periodic roster captures into
//! the bounded local history, mirroring to the remote backup API, a database
//! health watch that raises an advisory recovery mode, caller-driven
//! reconciliation between the two stores, and snapshot export.
//!
//! The service is an explicitly constructed component: every collaborator
//! (local store, remote store, notifier) is injected, and the scheduler is
//! started and stopped by the caller. Tests instantiate isolated services
//! with in-memory doubles.
//!
//! # Concurrency
//!
//! The capture loop and the health watch run as independent tokio tasks tied
//! to a shared shutdown channel. Capture and reconciliation both take the
//! single-flight lock, so at most one of the two touches the stores at any
//! instant; health probes never touch the stores and run unguarded.

mod export;
mod reconcile;

pub use export::{ExportFormat, render_snapshot};
pub use reconcile::SyncOutcome;

use crate::config::BackupConfig;
use crate::models::{BackupSnapshot, SnapshotSource};
use crate::notify::Notifier;
use crate::store::{LocalStore, LocalStoreStats, RemoteStore};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Outcome of one capture cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A fresh snapshot was captured and stored locally.
    Completed {
        /// Capture timestamp.
        timestamp: DateTime<Utc>,
        /// Number of client records captured.
        clients_count: usize,
        /// What happened on the remote side.
        remote: RemoteWriteStatus,
    },
    /// The roster fetch failed but an earlier local snapshot covers us.
    Recovered {
        /// Timestamp of the covering local snapshot.
        timestamp: DateTime<Utc>,
        /// Number of client records in that snapshot.
        clients_count: usize,
    },
    /// The roster fetch failed and no local snapshot exists.
    Failed {
        /// Classified error message.
        error: String,
    },
}

/// Result of the remote half of a capture cycle.
///
/// A remote write failure never fails the cycle; it is carried here so
/// callers can observe it without parsing logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWriteStatus {
    /// The server stored the snapshot.
    Saved {
        /// File name the server stored it under.
        file_name: String,
    },
    /// The remote save failed; the local copy is the only one.
    Failed {
        /// Classified error message.
        message: String,
    },
}

impl CaptureOutcome {
    /// One-line operator summary.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Completed {
                timestamp,
                clients_count,
                remote,
            } => match remote {
                RemoteWriteStatus::Saved { file_name } => format!(
                    "Backup completato: {clients_count} clienti salvati alle {} (server: {file_name})",
                    timestamp.to_rfc3339()
                ),
                RemoteWriteStatus::Failed { message } => format!(
                    "Backup completato: {clients_count} clienti salvati alle {} (solo copia locale: {message})",
                    timestamp.to_rfc3339()
                ),
            },
            Self::Recovered {
                timestamp,
                clients_count,
            } => format!(
                "Database non raggiungibile, backup locale del {} disponibile ({clients_count} clienti)",
                timestamp.to_rfc3339()
            ),
            Self::Failed { error } => format!("Backup fallito: {error}"),
        }
    }

    /// Whether the cycle left the system with at least one usable snapshot.
    #[must_use]
    pub const fn is_covered(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Current health-watch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// The database answered its last probe.
    Healthy,
    /// The database is down; the advisory recovery banner is up.
    RecoveryActive,
}

/// Handles for the running scheduler loops.
struct SchedulerHandles {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Client roster backup service.
///
/// Construct with [`BackupService::new`], then either drive it manually
/// (`capture`, `sync_with_server`, `export`) or run the scheduler with
/// [`start`](Self::start) / [`stop`](Self::stop).
pub struct BackupService {
    config: BackupConfig,
    local: LocalStore,
    remote: Arc<dyn RemoteStore>,
    notifier: Arc<dyn Notifier>,
    /// Single-flight lock over capture and reconciliation.
    flight: tokio::sync::Mutex<()>,
    /// Whether the recovery banner is currently raised.
    recovery_active: AtomicBool,
    scheduler: tokio::sync::Mutex<Option<SchedulerHandles>>,
}

impl BackupService {
    /// Creates a service from its collaborators.
    #[must_use]
    pub fn new(
        config: BackupConfig,
        local: LocalStore,
        remote: Arc<dyn RemoteStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            local,
            remote,
            notifier,
            flight: tokio::sync::Mutex::new(()),
            recovery_active: AtomicBool::new(false),
            scheduler: tokio::sync::Mutex::new(None),
        }
    }

    /// The configuration this service runs under.
    #[must_use]
    pub const fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// The local snapshot store.
    #[must_use]
    pub const fn local_store(&self) -> &LocalStore {
        &self.local
    }

    /// Starts the scheduler: one immediate capture, then the periodic
    /// capture loop and the health watch.
    ///
    /// Returns the outcome of the initial capture once it has completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] if the scheduler is already running, or
    /// [`Error::Storage`] if the initial capture cannot write the local
    /// history.
    pub async fn start(self: &Arc<Self>) -> Result<CaptureOutcome> {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_some() {
            return Err(Error::Service("backup service already started".to_string()));
        }

        let outcome = self.capture().await?;
        tracing::info!(outcome = %outcome.summary(), "initial capture");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let capture_task = tokio::spawn(Self::capture_loop(
            Arc::clone(self),
            Duration::from_secs(self.config.backup_interval_secs),
            shutdown_rx.clone(),
        ));
        let health_task = tokio::spawn(Self::health_loop(
            Arc::clone(self),
            Duration::from_secs(self.config.health_check_interval_secs),
            shutdown_rx,
        ));

        *scheduler = Some(SchedulerHandles {
            shutdown: shutdown_tx,
            tasks: vec![capture_task, health_task],
        });

        Ok(outcome)
    }

    /// Stops the scheduler.
    ///
    /// Pending timers are cancelled; an in-flight capture or probe is
    /// allowed to finish and its result is discarded. Calling `stop` on a
    /// service that was never started is a no-op.
    pub async fn stop(&self) {
        let Some(handles) = self.scheduler.lock().await.take() else {
            return;
        };

        // Receivers see the change and break out of their loops.
        let _ = handles.shutdown.send(true);
        for task in handles.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "scheduler task did not shut down cleanly");
            }
        }
        tracing::info!("backup scheduler stopped");
    }

    /// Whether the scheduler loops are currently running.
    pub async fn is_running(&self) -> bool {
        self.scheduler.lock().await.is_some()
    }

    /// Periodic capture loop. Logs every outcome and never exits on failure.
    async fn capture_loop(
        service: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut timer = tokio::time::interval(period);
        // The first tick completes immediately; the initial capture already
        // ran in start(), so consume it.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match service.capture().await {
                        Ok(outcome) => {
                            tracing::info!(outcome = %outcome.summary(), "scheduled capture");
                        },
                        Err(e) => {
                            tracing::error!(error = %e, "scheduled capture could not write local history");
                        },
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Periodic health watch loop.
    async fn health_loop(
        service: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut timer = tokio::time::interval(period);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    service.run_health_check().await;
                },
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Runs one capture cycle.
    ///
    /// Fetches the roster from the backup API, stores a fresh snapshot
    /// locally, then mirrors it to the server. A roster fetch failure falls
    /// back to the newest local snapshot ([`CaptureOutcome::Recovered`]); a
    /// remote save failure is recorded in the outcome but never fails the
    /// cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] only when the local history cannot be
    /// written; the local store is the last line of defense.
    #[instrument(skip(self), fields(operation = "backup.capture"))]
    pub async fn capture(&self) -> Result<CaptureOutcome> {
        let _guard = self.flight.lock().await;
        let start = Instant::now();

        let outcome = match self.remote.fetch_clients().await {
            Ok(clients) => {
                let snapshot = BackupSnapshot::new(clients, SnapshotSource::Database);
                self.local.push(&snapshot)?;

                let remote = match self.remote.save_snapshot(&snapshot).await {
                    Ok(receipt) => RemoteWriteStatus::Saved {
                        file_name: receipt.file_name,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "remote save failed, keeping local copy only");
                        metrics::counter!("backup.remote_write_failures").increment(1);
                        RemoteWriteStatus::Failed {
                            message: e.user_message(),
                        }
                    },
                };

                CaptureOutcome::Completed {
                    timestamp: snapshot.timestamp,
                    clients_count: snapshot.clients_count(),
                    remote,
                }
            },
            Err(e) => match self.local.latest()? {
                Some(snapshot) => {
                    tracing::warn!(
                        error = %e,
                        fallback_timestamp = %snapshot.timestamp.to_rfc3339(),
                        "roster fetch failed, covered by local snapshot"
                    );
                    CaptureOutcome::Recovered {
                        timestamp: snapshot.timestamp,
                        clients_count: snapshot.clients_count(),
                    }
                },
                None => {
                    tracing::error!(error = %e, "roster fetch failed with no local snapshot");
                    CaptureOutcome::Failed {
                        error: e.user_message(),
                    }
                },
            },
        };

        let status = match &outcome {
            CaptureOutcome::Completed { .. } => "completed",
            CaptureOutcome::Recovered { .. } => "recovered",
            CaptureOutcome::Failed { .. } => "failed",
        };
        metrics::counter!("backup.captures", "status" => status).increment(1);
        metrics::histogram!("backup.capture_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        Ok(outcome)
    }

    /// Runs one database health probe and updates the recovery state.
    ///
    /// A failing or negative probe raises the persistent recovery advisory
    /// once, on the transition into [`HealthState::RecoveryActive`]; repeat
    /// failures stay silent because the banner is already up. A succeeding
    /// probe lowers the state again. Purely advisory: captures and
    /// reconciliation are never blocked by recovery mode.
    #[instrument(skip(self), fields(operation = "backup.health_check"))]
    pub async fn run_health_check(&self) -> HealthState {
        let healthy = match self.remote.database_health().await {
            Ok(report) => report.healthy,
            Err(e) => {
                tracing::warn!(error = %e, "database health probe failed");
                false
            },
        };

        if healthy {
            if self.recovery_active.swap(false, Ordering::SeqCst) {
                tracing::info!("database reachable again, recovery mode cleared");
            }
            return HealthState::Healthy;
        }

        let was_active = self.recovery_active.swap(true, Ordering::SeqCst);
        if !was_active {
            match self.local.latest() {
                Ok(Some(snapshot)) => {
                    self.notifier
                        .recovery_alert(snapshot.timestamp, snapshot.clients_count());
                },
                Ok(None) => {
                    self.notifier.notify(
                        crate::notify::Severity::Error,
                        "Database non raggiungibile e nessun backup locale disponibile",
                    );
                },
                Err(e) => {
                    tracing::error!(error = %e, "cannot read local history for recovery alert");
                },
            }
        }
        HealthState::RecoveryActive
    }

    /// Current health-watch state.
    #[must_use]
    pub fn health_state(&self) -> HealthState {
        if self.recovery_active.load(Ordering::SeqCst) {
            HealthState::RecoveryActive
        } else {
            HealthState::Healthy
        }
    }

    /// Statistics over the local snapshot history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the history cannot be read.
    pub fn local_stats(&self) -> Result<LocalStoreStats> {
        self.local.stats()
    }
}
