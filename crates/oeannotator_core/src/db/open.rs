//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned file connections use `journal_mode=WAL`.
//! - Returned connections have migrations fully applied.
//! - An existing store is never migrated without a successful snapshot when
//!   opened through `open_db_with_backup`.

use super::migrations::{apply_migrations, pending_migrations, schema_version};
use super::{DbError, DbResult};
use crate::backup::{BackupScheduler, BackupTrigger};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    File,
    Memory,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with(Mode::File, || Connection::open(path.as_ref()), |_| Ok(()))
}

/// Opens an in-memory SQLite database and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(Mode::Memory, Connection::open_in_memory, |_| Ok(()))
}

/// Opens a SQLite database file, snapshotting it before any migration.
///
/// A snapshot is taken only when the store already carries a schema and at
/// least one migration is pending. `scheduler` must point at `path`.
///
/// # Errors
/// - `PreMigrationBackup` when the snapshot failed; the store is untouched.
pub fn open_db_with_backup(
    path: impl AsRef<Path>,
    scheduler: &mut BackupScheduler,
    now: DateTime<Utc>,
) -> DbResult<Connection> {
    open_with(
        Mode::File,
        || Connection::open(path.as_ref()),
        |conn| {
            let from_version = schema_version(conn)?;
            if from_version == 0 || !pending_migrations(conn)? {
                return Ok(());
            }
            match scheduler.snapshot(BackupTrigger::PreMigration, now) {
                Ok(entry) => {
                    info!(
                        "event=db_pre_migration_backup module=db status=ok from_version={} file={}",
                        from_version,
                        entry.file_name()
                    );
                    Ok(())
                }
                Err(err) => {
                    warn!(
                        "event=db_pre_migration_backup module=db status=error from_version={} error={}",
                        from_version, err
                    );
                    Err(DbError::PreMigrationBackup(Box::new(err)))
                }
            }
        },
    )
}

fn open_with(
    mode: Mode,
    opener: impl FnOnce() -> rusqlite::Result<Connection>,
    before_migrate: impl FnOnce(&Connection) -> DbResult<()>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={}", mode.as_str());

    let mut conn = match opener() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    let bootstrapped = configure_connection(&conn, mode)
        .and_then(|()| before_migrate(&conn))
        .and_then(|()| apply_migrations(&mut conn));
    match bootstrapped {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode.as_str(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn configure_connection(conn: &Connection, mode: Mode) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    if mode == Mode::File {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    Ok(())
}
