//! # Frannie Backup
//!
//! Client roster backup, reconciliation, and recovery service for the
//! Frannie NAILS salon platform.
//!
//! The service continuously captures the client roster into a bounded local
//! snapshot history, mirrors snapshots to a file-backed backup API, and can
//! reconcile the two stores in either direction. A reusable retry executor
//! shields every remote call from transient network and server failures, and
//! a periodic health watch raises an advisory recovery mode when the
//! database stops responding.
//!
//! ## Features
//!
//! - Bounded local snapshot history (24 entries, atomic write-back)
//! - Remote mirroring over HTTP with retention (48 files, oldest evicted)
//! - Bidirectional reconciliation keyed on snapshot timestamps
//! - Exponential-backoff retry with HTTP-aware failure classification
//! - Advisory recovery mode backed by a 5-minute database health watch
//! - JSON and CSV export of the newest snapshot
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use frannie_backup::{
//!     BackupConfig, BackupService, HttpRemoteStore, LocalStore, LogNotifier,
//! };
//!
//! let config = BackupConfig::load_default()?;
//! let local = LocalStore::new(&config.data_dir, config.local_retention)?;
//! let remote = Arc::new(HttpRemoteStore::new(&config.api_base_url, config.retry.clone()));
//! let service = Arc::new(BackupService::new(
//!     config,
//!     local,
//!     remote,
//!     Arc::new(LogNotifier::new()),
//! ));
//!
//! let outcome = service.start().await?;
//! println!("{}", outcome.summary());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod api;
pub mod config;
pub mod models;
pub mod notify;
pub mod retry;
pub mod service;
pub mod store;

// Re-exports for convenience
pub use config::BackupConfig;
pub use models::{BackupSnapshot, ClientRecord, SnapshotSource};
pub use notify::{LogNotifier, Notifier, Severity};
pub use retry::{RetryExecutor, RetryPolicy};
pub use service::{BackupService, CaptureOutcome, ExportFormat, HealthState, SyncOutcome};
pub use store::{HttpRemoteStore, LocalStore, RemoteStore};

/// HTTP status codes that warrant a retry.
///
/// Request timeout, rate limiting, and the transient 5xx family. Everything
/// else fails fast.
pub const RETRYABLE_HTTP_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Error type for backup operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Transport` | Connection refused, DNS failure, timeout, body read error |
/// | `Server` | HTTP 5xx responses, plus 408/429 |
/// | `Client` | Other HTTP 4xx responses (401, 403, 404, ...) |
/// | `Validation` | Snapshot payload fails schema validation |
/// | `Storage` | Local snapshot store I/O or serialization fails |
/// | `RetriesExhausted` | The retry executor spent its attempt budget |
/// | `NoBackup` | An export or inspect operation found no local snapshot |
/// | `Config` | Configuration file cannot be read, parsed, or validated |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Transport-level failure before an HTTP status was obtained.
    ///
    /// Always considered retryable.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a failure status (5xx, 408, 429).
    #[error("server failure (HTTP {status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response detail or status text.
        message: String,
    },

    /// The server rejected the request (4xx). Never retried.
    #[error("request rejected (HTTP {status}): {message}")]
    Client {
        /// HTTP status code.
        status: u16,
        /// Response detail or status text.
        message: String,
    },

    /// A snapshot payload failed schema validation.
    ///
    /// Raised when:
    /// - The save endpoint receives a body without `clients` or `timestamp`
    /// - A stored backup file does not parse as a snapshot
    /// - A backup file name fails the naming convention check
    #[error("invalid backup payload: {0}")]
    Validation(String),

    /// A local snapshot store operation failed.
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The retry executor exhausted its attempt budget.
    ///
    /// Carries the final classified error's message and whether that error
    /// was itself retryable.
    #[error("request failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Total attempts made (`max_retries + 1`).
        attempts: u32,
        /// Message of the last classified error.
        message: String,
        /// Whether the last error was retryable.
        retryable: bool,
    },

    /// No local snapshot exists for the requested operation.
    #[error("no backup available")]
    NoBackup,

    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The service lifecycle was misused (e.g. started twice).
    #[error("service error: {0}")]
    Service(String),
}

impl Error {
    /// Classifies an HTTP failure status into `Server` or `Client`.
    ///
    /// 5xx plus the timeout/rate-limit codes (408, 429) are server-side
    /// trouble; every other 4xx is the caller's problem.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 || status == 408 || status == 429 {
            Self::Server { status, message }
        } else {
            Self::Client { status, message }
        }
    }

    /// Returns `true` if the status code is in the retryable set.
    #[must_use]
    pub fn is_retryable_status(status: u16) -> bool {
        RETRYABLE_HTTP_STATUSES.contains(&status)
    }

    /// Returns `true` if retrying the failed operation might succeed.
    ///
    /// Transport failures are always retryable. Status-bearing failures are
    /// retryable exactly when the status is in [`RETRYABLE_HTTP_STATUSES`].
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Server { status, .. } | Self::Client { status, .. } => {
                Self::is_retryable_status(*status)
            },
            Self::RetriesExhausted { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns the operator-facing message for this error.
    ///
    /// The salon staff sees these, so they stay in the product language.
    /// Statuses without a dedicated message fall back to the transported
    /// detail.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => "Connessione di rete persa".to_string(),
            Self::Server { status, .. } if *status >= 500 => {
                "Errore del server, riprovo...".to_string()
            },
            Self::Client { status: 404, .. } => "Risorsa non trovata".to_string(),
            Self::Client { status: 401, .. } => {
                "Sessione scaduta, rieffettua il login".to_string()
            },
            Self::Client { status: 403, .. } => "Accesso negato".to_string(),
            Self::Server { message, .. } | Self::Client { message, .. } => message.clone(),
            Self::RetriesExhausted { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }
}

/// Result type alias for backup operations.
pub type Result<T> = std::result::Result<T, Error>;
