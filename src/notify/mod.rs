//! Operator notification seam.
//!
//! The browser build of this system raised toasts; a daemon has no toast
//! surface, so notifications go through the [`Notifier`] trait instead. The
//! shipped [`LogNotifier`] writes structured log events; tests inject a
//! recording implementation.

use chrono::{DateTime, Utc};
use std::fmt;

/// How loud a notification should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Routine confirmation.
    Info,
    /// Something degraded but the system is coping.
    Warning,
    /// An operation failed and the operator should know.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Destination for operator-facing notifications.
pub trait Notifier: Send + Sync {
    /// Delivers a transient message to the operator.
    fn notify(&self, severity: Severity, message: &str);

    /// Raises the persistent recovery advisory.
    ///
    /// Fired when the database health watch trips; names the newest local
    /// snapshot so staff know how stale their safety net is. Purely
    /// advisory: nothing is restored automatically.
    fn recovery_alert(&self, backup_timestamp: DateTime<Utc>, clients_count: usize);
}

/// Notifier that writes to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    /// Creates a log-backed notifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!(notification = message, "operator notification"),
            Severity::Warning => tracing::warn!(notification = message, "operator notification"),
            Severity::Error => tracing::error!(notification = message, "operator notification"),
        }
    }

    fn recovery_alert(&self, backup_timestamp: DateTime<Utc>, clients_count: usize) {
        tracing::error!(
            backup_timestamp = %backup_timestamp.to_rfc3339(),
            clients = clients_count,
            "Modalità recovery attiva: il database principale non è accessibile, \
             in uso il backup locale. Contattare il supporto tecnico."
        );
    }
}

/// Notifier that records everything for assertions.
#[cfg(test)]
pub struct RecordingNotifier {
    messages: std::sync::Mutex<Vec<(Severity, String)>>,
    recovery_alerts: std::sync::Mutex<Vec<(DateTime<Utc>, usize)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self {
            messages: std::sync::Mutex::new(Vec::new()),
            recovery_alerts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Messages delivered so far.
    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.messages.lock().expect("lock").clone()
    }

    /// Recovery alerts raised so far.
    pub fn recovery_alerts(&self) -> Vec<(DateTime<Utc>, usize)> {
        self.recovery_alerts.lock().expect("lock").clone()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        self.messages
            .lock()
            .expect("lock")
            .push((severity, message.to_string()));
    }

    fn recovery_alert(&self, backup_timestamp: DateTime<Utc>, clients_count: usize) {
        self.recovery_alerts
            .lock()
            .expect("lock")
            .push((backup_timestamp, clients_count));
    }
}
