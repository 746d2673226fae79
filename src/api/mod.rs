//! The backup HTTP API server.
//!
//! File-backed remote store behind the endpoints the service consumes:
//! roster fetch, snapshot save/latest/list/restore, database health, and
//! aggregate statistics. Each snapshot lives in its own JSON file named
//! after its capture timestamp ([`crate::store::naming`]); the embedded
//! timestamp is the single ordering key for listing, latest-selection,
//! statistics, and retention eviction.
//!
//! The roster source is a seam ([`RosterProvider`]): the shipped provider
//! serves a JSON seed file, tests inject a static roster, and the salon
//! database proper stays out of scope.

use crate::models::{BackupSnapshot, ClientRecord};
use crate::store::naming;
use crate::{Error, Result};
use axum::Router;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Source of the authoritative client roster.
pub trait RosterProvider: Send + Sync {
    /// Returns the current roster.
    fn roster(&self) -> Result<Vec<ClientRecord>>;
}

/// Roster served from a JSON seed file (array of clients).
pub struct FileRoster {
    path: PathBuf,
}

impl FileRoster {
    /// Creates a provider reading `path` on every request.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RosterProvider for FileRoster {
    fn roster(&self) -> Result<Vec<ClientRecord>> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| Error::Storage {
            operation: "read_roster".to_string(),
            cause: e.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|e| Error::Storage {
            operation: "parse_roster".to_string(),
            cause: e.to_string(),
        })
    }
}

/// Fixed in-memory roster, for tests and for serving without a seed file.
#[derive(Debug, Default)]
pub struct StaticRoster {
    clients: Vec<ClientRecord>,
}

impl StaticRoster {
    /// Creates a provider always answering with `clients`.
    #[must_use]
    pub const fn new(clients: Vec<ClientRecord>) -> Self {
        Self { clients }
    }
}

impl RosterProvider for StaticRoster {
    fn roster(&self) -> Result<Vec<ClientRecord>> {
        Ok(self.clients.clone())
    }
}

/// Shared state behind the API handlers.
pub struct ApiState {
    backup_dir: PathBuf,
    retention: usize,
    roster: Arc<dyn RosterProvider>,
}

impl ApiState {
    /// Creates the state, bootstrapping the backup directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backup directory cannot be created.
    pub fn new(
        backup_dir: impl Into<PathBuf>,
        roster: Arc<dyn RosterProvider>,
        retention: usize,
    ) -> Result<Self> {
        let backup_dir = backup_dir.into();
        std::fs::create_dir_all(&backup_dir).map_err(|e| Error::Storage {
            operation: "create_backup_dir".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self {
            backup_dir,
            retention,
            roster,
        })
    }

    /// Directory the snapshot files live in.
    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }
}

/// Builds the API router over shared state.
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/admin/clients", get(get_clients))
        .route("/api/backup/save", post(save_backup))
        .route("/api/backup/latest", get(latest_backup))
        .route("/api/backup/list", get(list_backups))
        .route("/api/backup/restore/{file_name}", post(restore_backup))
        .route("/api/health/database", get(database_health))
        .route("/api/backup/stats", get(backup_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the API server until ctrl-c.
///
/// # Errors
///
/// Returns [`Error::Service`] if the listener cannot bind or the server
/// fails while running.
pub async fn serve(addr: std::net::SocketAddr, state: Arc<ApiState>) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Service(format!("cannot bind {addr}: {e}")))?;

    tracing::info!(%addr, "backup API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .map_err(|e| Error::Service(format!("server error: {e}")))
}

/// Valid backup file names in the directory, newest first by the
/// name-embedded timestamp. Foreign files are ignored.
fn backup_file_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| naming::timestamp_from_name(name).is_some())
        .collect();
    // Fixed-width timestamps: lexicographic order is chronological order.
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

/// Deletes files beyond the retention cap, oldest first.
fn apply_retention(dir: &Path, retention: usize) {
    let Ok(names) = backup_file_names(dir) else {
        return;
    };
    for name in names.iter().skip(retention) {
        if let Err(e) = std::fs::remove_file(dir.join(name)) {
            tracing::warn!(file = %name, error = %e, "retention eviction failed");
        } else {
            tracing::debug!(file = %name, "evicted old backup");
        }
    }
}

fn internal_error(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "message": message })),
    )
}

/// GET `/api/admin/clients`: the authoritative roster.
async fn get_clients(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<Value>) {
    metrics::counter!("api.requests", "endpoint" => "clients").increment(1);

    match state.roster.roster() {
        Ok(clients) => (
            StatusCode::OK,
            Json(json!({ "success": true, "clients": clients })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "roster read failed");
            internal_error("Errore durante la lettura dei clienti")
        },
    }
}

/// POST `/api/backup/save`: validate and persist one snapshot.
async fn save_backup(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    metrics::counter!("api.requests", "endpoint" => "save").increment(1);

    let snapshot = match BackupSnapshot::from_value(payload) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(error = %e, "rejected invalid backup payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "message": "Dati backup non validi" })),
            );
        },
    };

    let file_name = naming::file_name_for(snapshot.timestamp);
    let contents = match serde_json::to_string_pretty(&snapshot) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!(error = %e, "snapshot serialization failed");
            return internal_error("Errore durante il salvataggio del backup");
        },
    };

    if let Err(e) = std::fs::write(state.backup_dir.join(&file_name), contents) {
        tracing::error!(file = %file_name, error = %e, "backup write failed");
        return internal_error("Errore durante il salvataggio del backup");
    }

    apply_retention(&state.backup_dir, state.retention);

    tracing::info!(
        file = %file_name,
        clients = snapshot.clients_count(),
        "backup stored"
    );

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Backup salvato con successo",
            "fileName": file_name,
            "clientsCount": snapshot.clients_count(),
        })),
    )
}

/// GET `/api/backup/latest`: the newest snapshot, raw.
async fn latest_backup(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<Value>) {
    metrics::counter!("api.requests", "endpoint" => "latest").increment(1);

    let names = match backup_file_names(&state.backup_dir) {
        Ok(names) => names,
        Err(e) => {
            tracing::error!(error = %e, "backup dir listing failed");
            return internal_error("Errore durante la lettura dei backup");
        },
    };

    let Some(newest) = names.first() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Nessun backup trovato" })),
        );
    };

    match read_snapshot_value(&state.backup_dir.join(newest)) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(e) => {
            tracing::error!(file = %newest, error = %e, "backup read failed");
            internal_error("Errore durante la lettura del backup")
        },
    }
}

/// GET `/api/backup/list`: all snapshots, newest first.
async fn list_backups(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<Value>) {
    metrics::counter!("api.requests", "endpoint" => "list").increment(1);

    let names = match backup_file_names(&state.backup_dir) {
        Ok(names) => names,
        Err(e) => {
            tracing::error!(error = %e, "backup dir listing failed");
            return internal_error("Errore durante la lettura dei backup");
        },
    };

    let mut backups = Vec::with_capacity(names.len());
    for name in names {
        let path = state.backup_dir.join(&name);
        // Unreadable or unparsable files are skipped, never a 500.
        let snapshot = match read_snapshot(&path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "skipping unreadable backup");
                continue;
            },
        };
        let file_size = std::fs::metadata(&path).map_or(0, |m| m.len());

        backups.push(json!({
            "fileName": name,
            "timestamp": snapshot.timestamp,
            "clientsCount": snapshot.clients_count(),
            "fileSize": file_size,
            "source": snapshot.source,
        }));
    }

    (
        StatusCode::OK,
        Json(json!({ "success": true, "backups": backups })),
    )
}

/// POST `/api/backup/restore/{fileName}`: one snapshot's contents by name.
async fn restore_backup(
    State(state): State<Arc<ApiState>>,
    AxumPath(file_name): AxumPath<String>,
) -> (StatusCode, Json<Value>) {
    metrics::counter!("api.requests", "endpoint" => "restore").increment(1);

    if !naming::is_valid_backup_name(&file_name) {
        tracing::warn!(file = %file_name, "rejected restore with invalid name");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": "Nome file backup non valido" })),
        );
    }

    let path = state.backup_dir.join(&file_name);
    if !path.exists() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Backup non trovato" })),
        );
    }

    match read_snapshot(&path) {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Backup ripristinato",
                "data": snapshot,
                "clientsCount": snapshot.clients_count(),
            })),
        ),
        Err(e) => {
            tracing::error!(file = %file_name, error = %e, "backup restore read failed");
            internal_error("Errore durante il ripristino del backup")
        },
    }
}

/// GET `/api/health/database`: roster-source liveness probe.
async fn database_health(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<Value>) {
    metrics::counter!("api.requests", "endpoint" => "health").increment(1);

    match state.roster.roster() {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "healthy": true,
                "timestamp": chrono::Utc::now(),
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "healthy": false,
                "error": e.to_string(),
            })),
        ),
    }
}

/// GET `/api/backup/stats`: aggregates over the backup directory.
async fn backup_stats(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<Value>) {
    metrics::counter!("api.requests", "endpoint" => "stats").increment(1);

    let names = match backup_file_names(&state.backup_dir) {
        Ok(names) => names,
        Err(e) => {
            tracing::error!(error = %e, "backup dir listing failed");
            return internal_error("Errore durante la lettura delle statistiche");
        },
    };

    let total_size: u64 = names
        .iter()
        .filter_map(|name| std::fs::metadata(state.backup_dir.join(name)).ok())
        .map(|m| m.len())
        .sum();

    #[allow(clippy::cast_precision_loss)]
    let total_size_mb = (total_size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;

    let latest = names.first().and_then(|n| naming::timestamp_from_name(n));
    let oldest = names.last().and_then(|n| naming::timestamp_from_name(n));

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "stats": {
                "totalBackups": names.len(),
                "latestBackup": latest,
                "oldestBackup": oldest,
                "totalSize": total_size,
                "totalSizeMB": total_size_mb,
            },
        })),
    )
}

fn read_snapshot(path: &Path) -> Result<BackupSnapshot> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Storage {
        operation: "read_backup".to_string(),
        cause: e.to_string(),
    })?;
    let value: Value = serde_json::from_str(&contents).map_err(|e| Error::Storage {
        operation: "parse_backup".to_string(),
        cause: e.to_string(),
    })?;
    BackupSnapshot::from_value(value)
}

fn read_snapshot_value(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Storage {
        operation: "read_backup".to_string(),
        cause: e.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| Error::Storage {
        operation: "parse_backup".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SnapshotSource;
    use tempfile::TempDir;

    fn snapshot_at(text: &str) -> BackupSnapshot {
        BackupSnapshot {
            clients: Vec::new(),
            timestamp: text.parse().expect("valid timestamp"),
            version: "1.0.0".to_string(),
            source: SnapshotSource::Database,
        }
    }

    fn write_snapshot(dir: &Path, snapshot: &BackupSnapshot) -> String {
        let name = naming::file_name_for(snapshot.timestamp);
        std::fs::write(
            dir.join(&name),
            serde_json::to_string_pretty(snapshot).unwrap(),
        )
        .unwrap();
        name
    }

    #[test]
    fn test_names_sorted_newest_first() {
        let dir = TempDir::new().unwrap();
        write_snapshot(dir.path(), &snapshot_at("2025-01-01T10:00:00Z"));
        write_snapshot(dir.path(), &snapshot_at("2025-03-01T10:00:00Z"));
        write_snapshot(dir.path(), &snapshot_at("2025-02-01T10:00:00Z"));
        // Foreign files are ignored
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let names = backup_file_names(dir.path()).unwrap();
        assert_eq!(names.len(), 3);
        assert!(names[0].contains("2025-03-01"));
        assert!(names[2].contains("2025-01-01"));
    }

    #[test]
    fn test_retention_evicts_oldest_by_name() {
        let dir = TempDir::new().unwrap();
        for day in 1..=5 {
            write_snapshot(dir.path(), &snapshot_at(&format!("2025-01-0{day}T10:00:00Z")));
        }

        apply_retention(dir.path(), 3);

        let names = backup_file_names(dir.path()).unwrap();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| !n.contains("2025-01-01")));
        assert!(names.iter().all(|n| !n.contains("2025-01-02")));
        assert!(names.iter().any(|n| n.contains("2025-01-05")));
    }

    #[test]
    fn test_read_snapshot_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clients-backup-2025-01-01T10-00-00-000Z.json");
        std::fs::write(&path, "{\"clients\": 3}").unwrap();

        assert!(read_snapshot(&path).is_err());
    }

    #[test]
    fn test_file_roster_round_trip() {
        let dir = TempDir::new().unwrap();
        let roster_path = dir.path().join("roster.json");
        std::fs::write(&roster_path, "[]").unwrap();

        let roster = FileRoster::new(&roster_path);
        assert!(roster.roster().unwrap().is_empty());

        std::fs::remove_file(&roster_path).unwrap();
        assert!(roster.roster().is_err());
    }
}
