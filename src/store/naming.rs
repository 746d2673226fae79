//! Canonical backup file naming.
//!
//! Every remote backup file is named
//! `clients-backup-<timestamp>.json`, where the timestamp is the snapshot's
//! capture time in RFC 3339 with `:` and `.` replaced by `-` (for example
//! `clients-backup-2025-01-01T10-00-00-000Z.json`). All components are
//! fixed-width and zero-padded, so lexicographic file-name order equals
//! chronological order.
//!
//! The embedded timestamp is the single ordering key for latest-selection,
//! listing, statistics, and retention eviction. Filesystem mtime is never
//! consulted: it changes on copy and differs across filesystems, the
//! embedded timestamp does not.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Prefix shared by all backup files.
pub const BACKUP_FILE_PREFIX: &str = "clients-backup-";

/// Extension shared by all backup files.
pub const BACKUP_FILE_SUFFIX: &str = ".json";

/// Timestamp layout inside a file name (millisecond precision, `Z` suffix).
const NAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// Builds the canonical file name for a snapshot timestamp.
#[must_use]
pub fn file_name_for(timestamp: DateTime<Utc>) -> String {
    let stamp = timestamp.format(NAME_TIMESTAMP_FORMAT);
    format!("{BACKUP_FILE_PREFIX}{stamp}{BACKUP_FILE_SUFFIX}")
}

/// Extracts the embedded timestamp from a backup file name.
///
/// Returns `None` when the name does not follow the convention.
#[must_use]
pub fn timestamp_from_name(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(BACKUP_FILE_PREFIX)?
        .strip_suffix(BACKUP_FILE_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, NAME_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Checks that a client-supplied file name is a plausible backup file.
///
/// Used by the restore endpoint before touching the filesystem: the name
/// must carry the backup prefix and `.json` extension, and must not smuggle
/// path separators or parent-directory components.
#[must_use]
pub fn is_valid_backup_name(name: &str) -> bool {
    name.len() <= 255
        && name.starts_with(BACKUP_FILE_PREFIX)
        && name.ends_with(BACKUP_FILE_SUFFIX)
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
