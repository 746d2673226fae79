//! Data models for the backup system.
//!
//! Wire shapes are contractual: field names are camelCase to stay compatible
//! with the existing backup files and API payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A salon client as carried in roster snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    /// Roster identifier.
    pub id: i64,
    /// Display name.
    pub full_name: String,
    /// Contact phone number.
    pub phone_number: String,
    /// Salon-assigned unique code.
    pub unique_code: String,
    /// Code used by the client-facing app, when enrolled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_app_code: Option<String>,
    /// Prepaid credit balance.
    pub credit_balance: f64,
    /// Advance payment balance.
    pub advance_balance: f64,
    /// Date of the last completed visit.
    pub last_visit: String,
    /// Date of the next booked appointment, if any.
    #[serde(default)]
    pub next_appointment: Option<String>,
    /// Lifetime visit count.
    pub total_visits: u32,
    /// The treatment the client books most often.
    pub favorite_service: String,
    /// Free-form staff notes.
    pub notes: String,
    /// Whether the client is currently active.
    pub is_active: bool,
}

/// Where a snapshot's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotSource {
    /// Captured from the live roster database.
    #[serde(rename = "database")]
    Database,
    /// Recovered from the local snapshot history.
    #[serde(rename = "localStorage")]
    LocalStorage,
}

impl SnapshotSource {
    /// Returns the wire tag for this source.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::LocalStorage => "localStorage",
        }
    }
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time capture of the client roster.
///
/// Snapshots are immutable once created: capture and reconciliation only
/// ever append whole snapshots or replace whole history entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    /// The roster at capture time.
    pub clients: Vec<ClientRecord>,
    /// Capture timestamp (UTC, RFC 3339 on the wire).
    pub timestamp: DateTime<Utc>,
    /// Version of the software that produced the snapshot.
    pub version: String,
    /// Origin of the data.
    pub source: SnapshotSource,
}

impl BackupSnapshot {
    /// Creates a snapshot of the given roster, stamped now.
    #[must_use]
    pub fn new(clients: Vec<ClientRecord>, source: SnapshotSource) -> Self {
        Self {
            clients,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            source,
        }
    }

    /// Number of client records in this snapshot.
    #[must_use]
    pub fn clients_count(&self) -> usize {
        self.clients.len()
    }

    /// Parses and validates a snapshot from an untyped JSON value.
    ///
    /// This is the schema gate for payloads arriving over the wire: missing
    /// `clients` or `timestamp`, or a malformed timestamp, come back as
    /// [`crate::Error::Validation`] instead of surfacing as parse failures
    /// deeper in the pipeline.
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        let snapshot: Self =
            serde_json::from_value(value).map_err(|e| crate::Error::Validation(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Validates snapshot fields beyond what serde enforces.
    pub fn validate(&self) -> crate::Result<()> {
        if self.version.trim().is_empty() {
            return Err(crate::Error::Validation(
                "snapshot version must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_client() -> ClientRecord {
        ClientRecord {
            id: 1,
            full_name: "Maria Rossi".to_string(),
            phone_number: "+39 333 1234567".to_string(),
            unique_code: "FRN-001".to_string(),
            client_app_code: Some("APP-77".to_string()),
            credit_balance: 25.5,
            advance_balance: 0.0,
            last_visit: "2025-01-10".to_string(),
            next_appointment: None,
            total_visits: 12,
            favorite_service: "Gel".to_string(),
            notes: "preferisce il sabato".to_string(),
            is_active: true,
        }
    }

    #[test]
    fn test_client_record_wire_names() {
        let value = serde_json::to_value(sample_client()).expect("serialize");
        assert_eq!(value["fullName"], "Maria Rossi");
        assert_eq!(value["phoneNumber"], "+39 333 1234567");
        assert_eq!(value["clientAppCode"], "APP-77");
        assert_eq!(value["isActive"], true);
        // nextAppointment is nullable, not omitted
        assert!(value["nextAppointment"].is_null());
        assert!(value.get("next_appointment").is_none());
    }

    #[test]
    fn test_client_app_code_omitted_when_absent() {
        let mut client = sample_client();
        client.client_app_code = None;
        let value = serde_json::to_value(client).expect("serialize");
        assert!(value.get("clientAppCode").is_none());
    }

    #[test]
    fn test_source_tags() {
        assert_eq!(
            serde_json::to_value(SnapshotSource::Database).expect("serialize"),
            json!("database")
        );
        assert_eq!(
            serde_json::to_value(SnapshotSource::LocalStorage).expect("serialize"),
            json!("localStorage")
        );
    }

    #[test]
    fn test_snapshot_new_stamps_version() {
        let snapshot = BackupSnapshot::new(vec![sample_client()], SnapshotSource::Database);
        assert_eq!(snapshot.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(snapshot.clients_count(), 1);
        assert_eq!(snapshot.source, SnapshotSource::Database);
    }

    #[test]
    fn test_from_value_accepts_wire_payload() {
        let value = json!({
            "clients": [serde_json::to_value(sample_client()).expect("serialize")],
            "timestamp": "2025-01-01T10:00:00.000Z",
            "version": "1.0.0",
            "source": "database"
        });

        let snapshot = BackupSnapshot::from_value(value).expect("valid payload");
        assert_eq!(snapshot.clients_count(), 1);
        assert_eq!(snapshot.version, "1.0.0");
    }

    #[test]
    fn test_from_value_rejects_missing_fields() {
        let missing_clients = json!({
            "timestamp": "2025-01-01T10:00:00.000Z",
            "version": "1.0.0",
            "source": "database"
        });
        assert!(matches!(
            BackupSnapshot::from_value(missing_clients),
            Err(crate::Error::Validation(_))
        ));

        let missing_timestamp = json!({
            "clients": [],
            "version": "1.0.0",
            "source": "database"
        });
        assert!(matches!(
            BackupSnapshot::from_value(missing_timestamp),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn test_from_value_rejects_bad_timestamp() {
        let value = json!({
            "clients": [],
            "timestamp": "not-a-date",
            "version": "1.0.0",
            "source": "database"
        });
        assert!(matches!(
            BackupSnapshot::from_value(value),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let snapshot = BackupSnapshot::new(vec![sample_client()], SnapshotSource::Database);
        let text = serde_json::to_string_pretty(&snapshot).expect("serialize");
        let back: BackupSnapshot = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, snapshot);
    }
}
