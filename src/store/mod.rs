//! Dual-store persistence: bounded local history plus the remote backup API.
//!
//! The local store is the system of record during outages; the remote store
//! mirrors snapshots to the file-backed backup API for off-device retention.
//! Both sides agree on the canonical file naming scheme in [`naming`].

mod local;
pub mod naming;
mod remote;

pub use local::{BACKUP_KEY, LocalStore, LocalStoreStats};
pub use remote::{
    HealthReport, HttpRemoteStore, RemoteBackupEntry, RemoteBackupStats, RemoteStore, SaveReceipt,
};
