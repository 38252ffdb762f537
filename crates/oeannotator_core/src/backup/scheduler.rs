//! Interval-driven snapshot scheduler with retention.

use super::metadata::BackupMetadata;
use super::{BackupError, BackupResult, BackupTrigger};
use crate::db::migrations::apply_migrations;
use crate::settings::BackupSettings;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use log::{info, warn};
use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const FILE_TIMESTAMP_LEN: usize = 19;

/// One snapshot pair on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub data_path: PathBuf,
    pub metadata_path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Same-second collision suffix from the file name; `0` when absent.
    pub sequence: u32,
    /// `None` when the sidecar is missing or unreadable.
    pub metadata: Option<BackupMetadata>,
}

impl BackupEntry {
    pub fn file_name(&self) -> String {
        self.data_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Result of restoring a snapshot into the live store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Snapshot of the live store taken right before it was overwritten.
    pub pre_restore: BackupEntry,
    /// Sidecar of the restored snapshot, if readable.
    pub restored: Option<BackupMetadata>,
}

#[derive(Debug)]
pub struct BackupScheduler {
    store_path: PathBuf,
    directory: PathBuf,
    interval: Duration,
    retention: usize,
    last_backup_at: Option<DateTime<Utc>>,
}

impl BackupScheduler {
    /// Creates a scheduler for the store at `store_path`.
    ///
    /// `last_backup_at` starts from the newest snapshot already on disk, so a
    /// restart does not trigger an immediate backup.
    pub fn new(store_path: impl Into<PathBuf>, settings: &BackupSettings) -> BackupResult<Self> {
        settings
            .validate()
            .map_err(|err| BackupError::InvalidConfig(err.to_string()))?;
        let store_path = store_path.into();
        let mut scheduler = Self {
            directory: settings.directory_for(&store_path),
            store_path,
            interval: interval_from_minutes(settings.interval_minutes)?,
            retention: settings.retention_count,
            last_backup_at: None,
        };
        scheduler.last_backup_at = scheduler
            .list_backups()?
            .first()
            .map(|entry| entry.created_at);
        Ok(scheduler)
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn last_backup_at(&self) -> Option<DateTime<Utc>> {
        self.last_backup_at
    }

    /// Updates interval and retention. Retention is applied on the next
    /// snapshot.
    pub fn configure(&mut self, interval_minutes: u32, retention_count: usize) -> BackupResult<()> {
        let settings = BackupSettings {
            interval_minutes,
            retention_count,
            directory: Some(self.directory.clone()),
        };
        settings
            .validate()
            .map_err(|err| BackupError::InvalidConfig(err.to_string()))?;
        self.interval = interval_from_minutes(interval_minutes)?;
        self.retention = retention_count;
        info!(
            "event=backup_configure module=backup status=ok interval_minutes={} retention={}",
            interval_minutes, retention_count
        );
        Ok(())
    }

    /// Whether a scheduled snapshot is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.last_backup_at
            .map_or(true, |last| now - last >= self.interval)
    }

    /// Takes a scheduled snapshot when the interval has elapsed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> BackupResult<Option<BackupEntry>> {
        if !self.is_due(now) {
            return Ok(None);
        }
        self.snapshot(BackupTrigger::Scheduled, now).map(Some)
    }

    /// Takes a snapshot unconditionally, then enforces retention.
    ///
    /// Retention failures are logged and do not fail the snapshot.
    pub fn snapshot(&mut self, trigger: BackupTrigger, now: DateTime<Utc>) -> BackupResult<BackupEntry> {
        let started_at = Instant::now();
        match self.write_snapshot(trigger, now) {
            Ok(entry) => {
                self.last_backup_at = Some(now);
                info!(
                    "event=backup_snapshot module=backup status=ok trigger={} duration_ms={} size_bytes={}",
                    trigger.as_str(),
                    started_at.elapsed().as_millis(),
                    entry.metadata.as_ref().map_or(0, |m| m.size_bytes)
                );
                if let Err(err) = self.enforce_retention() {
                    warn!(
                        "event=backup_retention module=backup status=error error={}",
                        err
                    );
                }
                Ok(entry)
            }
            Err(err) => {
                warn!(
                    "event=backup_snapshot module=backup status=error trigger={} duration_ms={} error={}",
                    trigger.as_str(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn write_snapshot(&self, trigger: BackupTrigger, now: DateTime<Utc>) -> BackupResult<BackupEntry> {
        if !self.store_path.is_file() {
            return Err(BackupError::StoreMissing(self.store_path.clone()));
        }
        fs::create_dir_all(&self.directory)?;
        let (data_path, sequence) = self.free_data_path(now);
        let metadata_path = data_path.with_extension("json");

        // Without CREATE: a store deleted between the check and here errors.
        let source = Connection::open_with_flags(&self.store_path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        let mut snapshot = Connection::open(&data_path)?;
        {
            let backup = Backup::new(&source, &mut snapshot)?;
            backup.step(-1)?;
        }
        drop(source);

        let size_bytes = fs::metadata(&data_path)?.len();
        let metadata = BackupMetadata::collect(&snapshot, trigger, now, size_bytes);
        drop(snapshot);
        metadata.write(&metadata_path)?;

        Ok(BackupEntry {
            sequence,
            data_path,
            metadata_path,
            created_at: now,
            metadata: Some(metadata),
        })
    }

    /// Lists snapshots of this store, newest first.
    pub fn list_backups(&self) -> BackupResult<Vec<BackupEntry>> {
        let read_dir = match fs::read_dir(&self.directory) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let prefix = format!("{}_", self.store_stem());
        let extension = self.store_extension();
        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let data_path = dir_entry?.path();
            if data_path.extension().and_then(|ext| ext.to_str()) != Some(extension.as_str()) {
                continue;
            }
            let Some(stem) = data_path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let Some(stamp) = stem.strip_prefix(&prefix) else {
                continue;
            };
            let Some((named_at, sequence)) = parse_file_timestamp(stamp) else {
                continue;
            };
            let metadata_path = data_path.with_extension("json");
            let metadata = BackupMetadata::read(&metadata_path);
            entries.push(BackupEntry {
                created_at: metadata.as_ref().map_or(named_at, |m| m.created_at),
                sequence,
                data_path,
                metadata_path,
                metadata,
            });
        }
        entries.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.sequence.cmp(&left.sequence))
        });
        Ok(entries)
    }

    /// Deletes snapshot pairs beyond the retention count. Returns how many
    /// pairs were removed.
    pub fn enforce_retention(&self) -> BackupResult<usize> {
        let entries = self.list_backups()?;
        let mut removed = 0;
        for entry in entries.iter().skip(self.retention) {
            remove_if_exists(&entry.data_path)?;
            remove_if_exists(&entry.metadata_path)?;
            removed += 1;
        }
        if removed > 0 {
            info!(
                "event=backup_retention module=backup status=ok removed={} kept={}",
                removed, self.retention
            );
        }
        Ok(removed)
    }

    /// Replaces the live store's content with a snapshot.
    ///
    /// The chosen snapshot is staged in memory before anything else happens,
    /// so retention run by the pre-restore snapshot cannot remove it first.
    /// If the pre-restore snapshot fails nothing is restored. The restored
    /// data is migrated to the current schema before returning.
    pub fn restore(
        &mut self,
        live: &mut Connection,
        backup_path: &Path,
        now: DateTime<Utc>,
    ) -> BackupResult<RestoreOutcome> {
        if !backup_path.is_file() {
            return Err(BackupError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("backup not found: {}", backup_path.display()),
            )));
        }
        let restored = BackupMetadata::read(&backup_path.with_extension("json"));
        let mut staged = Connection::open_in_memory()?;
        {
            let source =
                Connection::open_with_flags(backup_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
            let backup = Backup::new(&source, &mut staged)?;
            backup.step(-1)?;
        }

        let pre_restore = self.snapshot(BackupTrigger::PreRestore, now)?;

        {
            let backup = Backup::new(&staged, live)?;
            backup.step(-1)?;
        }
        drop(staged);
        apply_migrations(live).map_err(BackupError::Migration)?;

        info!(
            "event=backup_restore module=backup status=ok pre_restore={}",
            pre_restore.file_name()
        );
        Ok(RestoreOutcome {
            pre_restore,
            restored,
        })
    }

    fn store_stem(&self) -> String {
        self.store_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string())
    }

    fn store_extension(&self) -> String {
        self.store_path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| "db".to_string())
    }

    /// `<stem>_<timestamp>.<ext>`, with `-n` appended on a same-second clash.
    /// Returns the path and `n` (`0` without a suffix).
    fn free_data_path(&self, now: DateTime<Utc>) -> (PathBuf, u32) {
        let base = format!(
            "{}_{}",
            self.store_stem(),
            now.format(FILE_TIMESTAMP_FORMAT)
        );
        let extension = self.store_extension();
        let mut candidate = self.directory.join(format!("{base}.{extension}"));
        let mut sequence = 0;
        while candidate.exists() {
            sequence += 1;
            candidate = self.directory.join(format!("{base}-{sequence}.{extension}"));
        }
        (candidate, sequence)
    }
}

fn interval_from_minutes(minutes: u32) -> BackupResult<Duration> {
    Duration::try_minutes(i64::from(minutes)).ok_or_else(|| {
        BackupError::InvalidConfig(format!("interval of {minutes} minutes is out of range"))
    })
}

/// Splits `YYYY-MM-DD_HH-MM-SS[-n]` into its timestamp and suffix `n`.
fn parse_file_timestamp(stamp: &str) -> Option<(DateTime<Utc>, u32)> {
    let head = stamp.get(..FILE_TIMESTAMP_LEN)?;
    let rest = stamp.get(FILE_TIMESTAMP_LEN..)?;
    let sequence = if rest.is_empty() {
        0
    } else {
        rest.strip_prefix('-')?.parse().ok()?
    };
    let named_at = NaiveDateTime::parse_from_str(head, FILE_TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();
    Some((named_at, sequence))
}

fn remove_if_exists(path: &Path) -> BackupResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
