//! Property-based tests for the invariants the rest of the system leans on:
//! the retry attempt budget, the file-name timestamp round trip, the local
//! retention cap, and export round trips.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use chrono::{DateTime, TimeZone, Utc};
use frannie_backup::store::naming;
use frannie_backup::{
    BackupSnapshot, ClientRecord, Error, ExportFormat, LocalStore, RetryExecutor, RetryPolicy,
    SnapshotSource, service::render_snapshot,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Millisecond-precision timestamps in a sane range (2000..2100).
fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (946_684_800i64..4_102_444_800i64, 0u32..1000).prop_map(|(secs, millis)| {
        Utc.timestamp_opt(secs, millis * 1_000_000)
            .single()
            .expect("valid timestamp")
    })
}

fn arb_text() -> impl Strategy<Value = String> {
    // Free text with the characters CSV cares about.
    proptest::string::string_regex("[a-zA-Z0-9àèéìòù ,\"';:-]{0,30}").expect("valid regex")
}

fn arb_client() -> impl Strategy<Value = ClientRecord> {
    (
        (1i64..100_000, arb_text(), "[0-9+ ]{6,15}", "[A-Z]{3}-[0-9]{3}"),
        (
            proptest::option::of("[A-Z]{3}-[0-9]{2}"),
            0.0f64..500.0,
            0.0f64..500.0,
            "[0-9]{4}-[0-9]{2}-[0-9]{2}",
        ),
        (
            proptest::option::of("[0-9]{4}-[0-9]{2}-[0-9]{2}"),
            0u32..200,
            arb_text(),
            arb_text(),
            any::<bool>(),
        ),
    )
        .prop_map(
            |(
                (id, full_name, phone_number, unique_code),
                (client_app_code, credit_balance, advance_balance, last_visit),
                (next_appointment, total_visits, favorite_service, notes, is_active),
            )| ClientRecord {
                id,
                full_name,
                phone_number,
                unique_code,
                client_app_code,
                credit_balance,
                advance_balance,
                last_visit,
                next_appointment,
                total_visits,
                favorite_service,
                notes,
                is_active,
            },
        )
}

fn arb_snapshot() -> impl Strategy<Value = BackupSnapshot> {
    (
        proptest::collection::vec(arb_client(), 0..8),
        arb_timestamp(),
    )
        .prop_map(|(clients, timestamp)| BackupSnapshot {
            clients,
            timestamp,
            version: "1.0.0".to_string(),
            source: SnapshotSource::Database,
        })
}

proptest! {
    /// A permanently failing retryable operation is attempted exactly
    /// `max_retries + 1` times.
    #[test]
    fn prop_retry_budget_is_max_retries_plus_one(max_retries in 0u32..5) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");

        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(
            RetryPolicy::default()
                .with_max_retries(max_retries)
                .with_retry_delay_ms(0)
                .with_notifications(false),
        );

        let result: frannie_backup::Result<()> = runtime.block_on(executor.execute("op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Transport("down".to_string())) }
        }));

        prop_assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
        match result {
            Err(Error::RetriesExhausted { attempts, .. }) => {
                prop_assert_eq!(attempts, max_retries + 1);
            },
            other => return Err(proptest::test_runner::TestCaseError::fail(format!(
                "unexpected outcome: {other:?}"
            ))),
        }
    }

    /// A non-retryable failure stops after one attempt regardless of budget.
    #[test]
    fn prop_terminal_failure_short_circuits(max_retries in 0u32..5) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");

        let calls = AtomicU32::new(0);
        let executor = RetryExecutor::new(
            RetryPolicy::default()
                .with_max_retries(max_retries)
                .with_retry_delay_ms(0)
                .with_notifications(false),
        );

        let result: frannie_backup::Result<()> = runtime.block_on(executor.execute("op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::from_status(403, "no")) }
        }));

        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        prop_assert!(result.is_err());
    }

    /// Backoff delays never shrink as the attempt index grows.
    #[test]
    fn prop_backoff_is_monotone(base in 0u64..10_000, a in 0u32..64, b in 0u32..64) {
        let policy = RetryPolicy::default().with_retry_delay_ms(base);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(policy.delay_for_attempt(lo) <= policy.delay_for_attempt(hi));
    }

    /// Every millisecond-precision timestamp survives the file-name round trip.
    #[test]
    fn prop_file_name_round_trips(ts in arb_timestamp()) {
        let name = naming::file_name_for(ts);
        prop_assert!(naming::is_valid_backup_name(&name));
        prop_assert_eq!(naming::timestamp_from_name(&name), Some(ts));
    }

    /// Lexicographic file-name order is chronological order.
    #[test]
    fn prop_name_order_is_time_order(a in arb_timestamp(), b in arb_timestamp()) {
        let name_a = naming::file_name_for(a);
        let name_b = naming::file_name_for(b);
        prop_assert_eq!(name_a.cmp(&name_b), a.cmp(&b));
    }

    /// Whatever order pushes arrive in, the history holds the largest
    /// timestamps, newest first.
    #[test]
    fn prop_retention_keeps_largest_timestamps(
        stamps in proptest::collection::btree_set(946_684_800i64..1_900_000_000, 1..25)
            .prop_map(|set| {
                set.into_iter()
                    .map(|secs| {
                        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
                    })
                    .collect::<Vec<_>>()
            })
            .prop_shuffle(),
        cap in 1usize..10,
    ) {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStore::new(dir.path(), cap).expect("store");

        for ts in &stamps {
            let snapshot = BackupSnapshot {
                clients: Vec::new(),
                timestamp: *ts,
                version: "1.0.0".to_string(),
                source: SnapshotSource::Database,
            };
            store.push(&snapshot).expect("push");
        }

        let mut expected = stamps.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        expected.truncate(cap);

        let stored: Vec<_> = store
            .history()
            .expect("history")
            .into_iter()
            .map(|s| s.timestamp)
            .collect();
        prop_assert_eq!(stored, expected);
    }

    /// The local history never exceeds the cap and keeps the newest pushes.
    #[test]
    fn prop_local_store_respects_cap(cap in 1usize..20, pushes in 0usize..40) {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStore::new(dir.path(), cap).expect("store");

        for i in 0..pushes {
            let snapshot = BackupSnapshot {
                clients: Vec::new(),
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64, 0)
                    .single()
                    .expect("valid timestamp"),
                version: "1.0.0".to_string(),
                source: SnapshotSource::Database,
            };
            store.push(&snapshot).expect("push");
        }

        let history = store.history().expect("history");
        prop_assert_eq!(history.len(), pushes.min(cap));
        for pair in history.windows(2) {
            prop_assert!(pair[0].timestamp > pair[1].timestamp);
        }
        if let Some(newest) = history.first() {
            prop_assert_eq!(
                newest.timestamp.timestamp(),
                1_700_000_000 + (pushes as i64) - 1
            );
        }
    }

    /// JSON export parses back into the identical snapshot.
    #[test]
    fn prop_json_export_round_trips(snapshot in arb_snapshot()) {
        let json = render_snapshot(&snapshot, ExportFormat::Json).expect("render");
        let back: BackupSnapshot = serde_json::from_str(&json).expect("parse");
        prop_assert_eq!(back, snapshot);
    }

    /// CSV export always yields one 13-column row per client, whatever the
    /// free-text fields contain.
    #[test]
    fn prop_csv_export_keeps_column_count(snapshot in arb_snapshot()) {
        let csv_text = render_snapshot(&snapshot, ExportFormat::Csv).expect("render");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv_text.as_bytes());

        let rows: Vec<csv::StringRecord> =
            reader.records().map(|r| r.expect("row")).collect();
        prop_assert_eq!(rows.len(), snapshot.clients.len());
        for (row, client) in rows.iter().zip(&snapshot.clients) {
            prop_assert_eq!(row.len(), 13);
            prop_assert_eq!(&row[1], client.full_name.as_str());
            prop_assert_eq!(&row[11], client.notes.as_str());
        }
    }
}
