//! Snapshot export for operator download.
//!
//! JSON export is the snapshot as-is, pretty-printed, and round-trips back
//! through serde. CSV export matches the sheet the salon has always worked
//! with: Italian headers, the three free-text columns quoted, booleans as
//! `Sì`/`No`.

use super::BackupService;
use crate::models::{BackupSnapshot, ClientRecord};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Export format for the newest local snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed JSON of the whole snapshot.
    Json,
    /// Flattened per-client table with Italian headers.
    Csv,
}

/// CSV header row, in roster-sheet column order.
const CSV_HEADER: &str = "ID,Nome Completo,Telefono,Codice Unico,Codice App,Credito,Anticipo,\
                          Ultima Visita,Prossimo Appuntamento,Visite Totali,Servizio Preferito,\
                          Note,Attiva";

/// Renders a snapshot in the requested format.
///
/// # Errors
///
/// Returns [`Error::Storage`] if JSON serialization fails.
pub fn render_snapshot(snapshot: &BackupSnapshot, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => {
            serde_json::to_string_pretty(snapshot).map_err(|e| Error::Storage {
                operation: "export_json".to_string(),
                cause: e.to_string(),
            })
        },
        ExportFormat::Csv => Ok(render_csv(snapshot)),
    }
}

fn render_csv(snapshot: &BackupSnapshot) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for client in &snapshot.clients {
        out.push_str(&csv_row(client));
        out.push('\n');
    }
    out
}

fn csv_row(client: &ClientRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{}",
        client.id,
        quote(&client.full_name),
        client.phone_number,
        client.unique_code,
        client.client_app_code.as_deref().unwrap_or(""),
        client.credit_balance,
        client.advance_balance,
        client.last_visit,
        client.next_appointment.as_deref().unwrap_or(""),
        client.total_visits,
        quote(&client.favorite_service),
        quote(&client.notes),
        if client.is_active { "Sì" } else { "No" }
    )
}

/// Quotes a free-text field, doubling embedded quotes per RFC 4180.
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

impl BackupService {
    /// Exports the newest local snapshot in the requested format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBackup`] when the local history is empty, or
    /// [`Error::Storage`] if the history cannot be read.
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        let snapshot = self.local_store().latest()?.ok_or(Error::NoBackup)?;
        metrics::counter!("export.operations").increment(1);
        render_snapshot(&snapshot, format)
    }
}
