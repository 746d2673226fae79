//! End-to-end tests driving [`HttpRemoteStore`] against a real backup API
//! server bound to an ephemeral port.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use frannie_backup::api::{ApiState, RosterProvider, StaticRoster, router};
use frannie_backup::store::naming;
use frannie_backup::{
    BackupConfig, BackupService, BackupSnapshot, CaptureOutcome, ClientRecord, Error,
    HttpRemoteStore, LocalStore, LogNotifier, Notifier, RemoteStore, RetryPolicy, SnapshotSource,
    SyncOutcome,
};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn sample_clients() -> Vec<ClientRecord> {
    vec![
        ClientRecord {
            id: 1,
            full_name: "Maria Rossi".to_string(),
            phone_number: "+39 333 1234567".to_string(),
            unique_code: "FRN-001".to_string(),
            client_app_code: Some("APP-77".to_string()),
            credit_balance: 25.5,
            advance_balance: 0.0,
            last_visit: "2025-01-10".to_string(),
            next_appointment: Some("2025-02-01".to_string()),
            total_visits: 12,
            favorite_service: "Gel".to_string(),
            notes: "preferisce il sabato".to_string(),
            is_active: true,
        },
        ClientRecord {
            id: 2,
            full_name: "Anna Bianchi".to_string(),
            phone_number: "+39 333 7654321".to_string(),
            unique_code: "FRN-002".to_string(),
            client_app_code: None,
            credit_balance: 0.0,
            advance_balance: 10.0,
            last_visit: "2024-12-20".to_string(),
            next_appointment: None,
            total_visits: 3,
            favorite_service: "Semipermanente".to_string(),
            notes: String::new(),
            is_active: false,
        },
    ]
}

fn snapshot_at(text: &str) -> BackupSnapshot {
    BackupSnapshot {
        clients: sample_clients(),
        timestamp: text.parse().expect("valid timestamp"),
        version: "1.0.0".to_string(),
        source: SnapshotSource::Database,
    }
}

struct Server {
    base_url: String,
    _dir: TempDir,
}

/// Binds the API on an ephemeral port and serves it in the background.
async fn spawn_server(retention: usize, roster: Arc<dyn RosterProvider>) -> Server {
    let dir = TempDir::new().unwrap();
    let state = Arc::new(ApiState::new(dir.path().join("backups"), roster, retention).unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server {
        base_url: format!("http://{addr}"),
        _dir: dir,
    }
}

fn store_for(server: &Server) -> HttpRemoteStore {
    HttpRemoteStore::new(&server.base_url, RetryPolicy::single_attempt())
}

#[tokio::test]
async fn test_fetch_clients_round_trip() {
    let server = spawn_server(48, Arc::new(StaticRoster::new(sample_clients()))).await;
    let store = store_for(&server);

    let clients = store.fetch_clients().await.unwrap();
    assert_eq!(clients, sample_clients());
}

#[tokio::test]
async fn test_save_latest_restore_round_trip() {
    let server = spawn_server(48, Arc::new(StaticRoster::default())).await;
    let store = store_for(&server);

    let snapshot = snapshot_at("2025-01-01T10:00:00Z");
    let receipt = store.save_snapshot(&snapshot).await.unwrap();
    assert_eq!(
        receipt.file_name,
        "clients-backup-2025-01-01T10-00-00-000Z.json"
    );
    assert_eq!(receipt.clients_count, 2);

    let latest = store.latest_snapshot().await.unwrap().unwrap();
    assert_eq!(latest, snapshot);

    let restored = store.restore_snapshot(&receipt.file_name).await.unwrap();
    assert_eq!(restored, snapshot);
}

#[tokio::test]
async fn test_latest_on_empty_directory_is_none() {
    let server = spawn_server(48, Arc::new(StaticRoster::default())).await;
    let store = store_for(&server);

    assert!(store.latest_snapshot().await.unwrap().is_none());
}

#[tokio::test]
async fn test_latest_picks_newest_by_name() {
    let server = spawn_server(48, Arc::new(StaticRoster::default())).await;
    let store = store_for(&server);

    // Saved out of chronological order on purpose.
    store
        .save_snapshot(&snapshot_at("2025-02-01T10:00:00Z"))
        .await
        .unwrap();
    store
        .save_snapshot(&snapshot_at("2025-03-01T10:00:00Z"))
        .await
        .unwrap();
    store
        .save_snapshot(&snapshot_at("2025-01-01T10:00:00Z"))
        .await
        .unwrap();

    let latest = store.latest_snapshot().await.unwrap().unwrap();
    assert_eq!(latest.timestamp, snapshot_at("2025-03-01T10:00:00Z").timestamp);
}

#[tokio::test]
async fn test_list_is_newest_first() {
    let server = spawn_server(48, Arc::new(StaticRoster::default())).await;
    let store = store_for(&server);

    for text in [
        "2025-01-01T10:00:00Z",
        "2025-01-03T10:00:00Z",
        "2025-01-02T10:00:00Z",
    ] {
        store.save_snapshot(&snapshot_at(text)).await.unwrap();
    }

    let entries = store.list_snapshots().await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries[0].file_name.contains("2025-01-03"));
    assert!(entries[2].file_name.contains("2025-01-01"));
    for entry in &entries {
        assert_eq!(entry.clients_count, 2);
        assert!(entry.file_size > 0);
        assert_eq!(entry.source, SnapshotSource::Database);
        assert_eq!(naming::file_name_for(entry.timestamp), entry.file_name);
    }
}

#[tokio::test]
async fn test_stats_aggregate_backup_files() {
    let server = spawn_server(48, Arc::new(StaticRoster::default())).await;
    let store = store_for(&server);

    let empty = store.backup_stats().await.unwrap();
    assert_eq!(empty.total_backups, 0);
    assert!(empty.latest_backup.is_none());
    assert_eq!(empty.total_size, 0);

    store
        .save_snapshot(&snapshot_at("2025-01-01T10:00:00Z"))
        .await
        .unwrap();
    store
        .save_snapshot(&snapshot_at("2025-01-05T10:00:00Z"))
        .await
        .unwrap();

    let stats = store.backup_stats().await.unwrap();
    assert_eq!(stats.total_backups, 2);
    assert_eq!(
        stats.latest_backup,
        Some(snapshot_at("2025-01-05T10:00:00Z").timestamp)
    );
    assert_eq!(
        stats.oldest_backup,
        Some(snapshot_at("2025-01-01T10:00:00Z").timestamp)
    );
    assert!(stats.total_size > 0);
    assert!(stats.total_size_mb >= 0.0);
}

#[tokio::test]
async fn test_database_health_probe() {
    let server = spawn_server(48, Arc::new(StaticRoster::default())).await;
    let store = store_for(&server);

    let report = store.database_health().await.unwrap();
    assert!(report.healthy);
}

/// Router wired to a throwaway backup directory, for in-process requests.
fn test_router(dir: &TempDir) -> axum::Router {
    let state = Arc::new(
        ApiState::new(
            dir.path().join("backups"),
            Arc::new(StaticRoster::default()) as Arc<dyn RosterProvider>,
            48,
        )
        .unwrap(),
    );
    router(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_save_rejects_malformed_payload() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/backup/save")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"clients": 5}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Dati backup non validi");
}

#[tokio::test]
async fn test_restore_rejects_invalid_names() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    for name in ["latest.json", "clients-backup-..evil.json", "notes.txt"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/backup/restore/{name}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "name {name} got through"
        );
        let body = body_json(response).await;
        assert_eq!(body["message"], "Nome file backup non valido");
    }
}

#[tokio::test]
async fn test_restore_missing_backup_is_not_found() {
    let server = spawn_server(48, Arc::new(StaticRoster::default())).await;
    let store = store_for(&server);

    let err = store
        .restore_snapshot("clients-backup-2025-01-01T10-00-00-000Z.json")
        .await
        .unwrap_err();
    match err {
        Error::RetriesExhausted {
            attempts,
            message,
            retryable,
        } => {
            assert_eq!(attempts, 1);
            assert_eq!(message, "Risorsa non trovata");
            assert!(!retryable);
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_remote_retention_evicts_oldest() {
    let server = spawn_server(3, Arc::new(StaticRoster::default())).await;
    let store = store_for(&server);

    for day in 1..=5 {
        store
            .save_snapshot(&snapshot_at(&format!("2025-01-0{day}T10:00:00Z")))
            .await
            .unwrap();
    }

    let entries = store.list_snapshots().await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries[0].file_name.contains("2025-01-05"));
    assert!(entries[2].file_name.contains("2025-01-03"));
}

#[tokio::test]
async fn test_capture_and_sync_against_real_server() {
    let server = spawn_server(48, Arc::new(StaticRoster::new(sample_clients()))).await;

    let data_dir = TempDir::new().unwrap();
    let config = BackupConfig::new()
        .with_api_base_url(&server.base_url)
        .with_data_dir(data_dir.path())
        .with_retry(RetryPolicy::single_attempt());
    let local = LocalStore::new(data_dir.path(), config.local_retention).unwrap();
    let remote = Arc::new(HttpRemoteStore::new(
        &server.base_url,
        config.retry.clone(),
    ));

    let service = BackupService::new(
        config,
        local,
        remote as Arc<dyn RemoteStore>,
        Arc::new(LogNotifier::new()) as Arc<dyn Notifier>,
    );

    let outcome = service.capture().await.unwrap();
    match outcome {
        CaptureOutcome::Completed { clients_count, .. } => assert_eq!(clients_count, 2),
        other => panic!("unexpected outcome: {other:?}"),
    }

    // Capture mirrored the snapshot, so a reconciliation finds both sides equal.
    assert_eq!(
        service.sync_with_server().await.unwrap(),
        SyncOutcome::InSync
    );
}
