//! Backup sidecar metadata.

use super::{BackupResult, BackupTrigger};
use crate::db::schema_version;
use crate::repo::list_project_summaries;
use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Contents of the `<stem>.json` file next to each snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub projects: Vec<BackupProject>,
    pub app_version: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub migration_version: Option<u32>,
    #[serde(default)]
    pub trigger: Option<BackupTrigger>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub token_count: u64,
}

impl BackupMetadata {
    /// Describes the snapshot open on `snapshot`.
    ///
    /// Falls back to metadata without projects when the snapshot cannot be
    /// queried; the data file is still a valid backup.
    pub(super) fn collect(
        snapshot: &Connection,
        trigger: BackupTrigger,
        now: DateTime<Utc>,
        size_bytes: u64,
    ) -> Self {
        let projects = match list_project_summaries(snapshot) {
            Ok(summaries) => summaries
                .into_iter()
                .map(|summary| BackupProject {
                    id: summary.id.to_string(),
                    name: summary.name,
                    updated_at: Some(summary.updated_at),
                    token_count: summary.token_count,
                })
                .collect(),
            Err(err) => {
                warn!(
                    "event=backup_metadata module=backup status=degraded trigger={} error={}",
                    trigger.as_str(),
                    err
                );
                Vec::new()
            }
        };

        Self {
            created_at: now,
            projects,
            app_version: crate::core_version().to_string(),
            size_bytes,
            migration_version: schema_version(snapshot).ok(),
            trigger: Some(trigger),
        }
    }

    pub(super) fn write(&self, path: &Path) -> BackupResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reads a sidecar; unreadable sidecars are logged and skipped.
    pub(super) fn read(path: &Path) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!(
                    "event=backup_metadata_read module=backup status=error error={}",
                    err
                );
                None
            }
        }
    }
}
