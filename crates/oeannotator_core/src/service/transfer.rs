//! Export/import use-cases over the durable store.
//!
//! # Responsibility
//! - Export a stored project as a versioned document.
//! - Import a document as a new project in one transaction.
//!
//! # Invariants
//! - Every decode, migration and validation step finishes before the first
//!   write; a failed import leaves the store untouched.
//! - Exports carry the store's schema version as `migration_version`.

use crate::db::{schema_version, DbError};
use crate::model::project::ProjectId;
use crate::repo::{ProjectRepository, RepoError, SqliteProjectRepository};
use crate::serializer::{
    export_project, import_document, parse_document, ImportError, ProjectDocument,
};
use log::{info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type TransferResult<T> = Result<T, TransferError>;

#[derive(Debug)]
pub enum TransferError {
    Import(ImportError),
    Repo(RepoError),
    ProjectNotFound(ProjectId),
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Import(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
        }
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Import(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::ProjectNotFound(_) => None,
        }
    }
}

impl From<ImportError> for TransferError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

impl From<RepoError> for TransferError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::ProjectNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<DbError> for TransferError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

/// What an import produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub project_id: ProjectId,
    /// Final name, suffixed with ` (n)` when the requested name was taken.
    pub name: String,
    pub renamed: bool,
    pub source_version: u32,
    pub migrated: bool,
}

/// Reads project `id` from the store and builds its export document.
pub fn export_project_by_id(
    conn: &mut Connection,
    id: ProjectId,
) -> TransferResult<ProjectDocument> {
    let migration_version = schema_version(conn)?;
    let repo = SqliteProjectRepository::try_new(conn)?;
    let project = repo
        .load_project(id)?
        .ok_or(TransferError::ProjectNotFound(id))?;
    info!(
        "event=project_export module=service status=ok project_id={} migration_version={} sentences={}",
        id,
        migration_version,
        project.sentences.len()
    );
    Ok(export_project(&project, migration_version))
}

/// Imports a JSON document as a new project.
///
/// # Errors
/// - `Import(IncompatibleVersion)` / `Import(CorruptDocument)` before any
///   write.
/// - `Repo` when the insert transaction fails; it is rolled back.
pub fn import_project_json(conn: &mut Connection, json: &str) -> TransferResult<ImportOutcome> {
    let started_at = Instant::now();
    let imported = match parse_document(json).and_then(import_document) {
        Ok(imported) => imported,
        Err(err) => {
            warn!(
                "event=project_import module=service status=rejected duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    let mut repo = SqliteProjectRepository::try_new(conn)?;
    let inserted = repo.insert_imported(&imported.project)?;
    info!(
        "event=project_import module=service status=ok project_id={} source_version={} renamed={} duration_ms={}",
        inserted.id,
        imported.source_version,
        inserted.renamed,
        started_at.elapsed().as_millis()
    );
    Ok(ImportOutcome {
        project_id: inserted.id,
        name: inserted.name,
        renamed: inserted.renamed,
        source_version: imported.source_version,
        migrated: imported.was_migrated(),
    })
}
