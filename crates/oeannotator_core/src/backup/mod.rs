//! Rotating snapshots of the durable store.
//!
//! # Responsibility
//! - Snapshot the store on a fixed interval and before destructive
//!   operations (schema migration, restore).
//! - Keep only the newest `retention_count` snapshot pairs.
//! - Restore a snapshot into the live store.
//!
//! # Invariants
//! - Snapshots are taken through SQLite's online backup API, so they only
//!   ever contain committed state.
//! - Every data file `<stem>_YYYY-MM-DD_HH-MM-SS.<ext>` has a sidecar
//!   `<same stem>.json` written after the data file is complete.
//! - Failures are reported to the caller; none of them affect the live store.
//!
//! # See also
//! - crate::db::open_db_with_backup

mod metadata;
mod scheduler;
mod timer;

pub use metadata::{BackupMetadata, BackupProject};
pub use scheduler::{BackupEntry, BackupScheduler, RestoreOutcome};
pub use timer::BackupTimer;

use crate::db::DbError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug)]
pub enum BackupError {
    Io(std::io::Error),
    Sqlite(rusqlite::Error),
    Metadata(serde_json::Error),
    StoreMissing(PathBuf),
    InvalidConfig(String),
    /// Restored data could not be brought to the current schema.
    Migration(DbError),
}

impl Display for BackupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "backup io error: {err}"),
            Self::Sqlite(err) => write!(f, "backup sqlite error: {err}"),
            Self::Metadata(err) => write!(f, "backup metadata error: {err}"),
            Self::StoreMissing(path) => write!(f, "store file not found: {}", path.display()),
            Self::InvalidConfig(message) => write!(f, "invalid backup configuration: {message}"),
            Self::Migration(err) => write!(f, "restored store could not be migrated: {err}"),
        }
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Sqlite(err) => Some(err),
            Self::Metadata(err) => Some(err),
            Self::Migration(err) => Some(err),
            Self::StoreMissing(_) | Self::InvalidConfig(_) => None,
        }
    }
}

impl From<std::io::Error> for BackupError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for BackupError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(value: serde_json::Error) -> Self {
        Self::Metadata(value)
    }
}

/// What caused a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupTrigger {
    Scheduled,
    Manual,
    PreMigration,
    PreRestore,
}

impl BackupTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::PreMigration => "pre_migration",
            Self::PreRestore => "pre_restore",
        }
    }
}
