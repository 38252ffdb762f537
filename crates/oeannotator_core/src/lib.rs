//! Core persistence and versioning for Old English text annotation.
//! This crate is the single source of truth for annotation, note range and
//! project versioning invariants.

pub mod annotate;
pub mod autosave;
pub mod backup;
pub mod db;
pub mod filter;
pub mod history;
pub mod logging;
pub mod model;
pub mod ranges;
pub mod repo;
pub mod serializer;
pub mod service;
pub mod settings;
pub mod tokenize;

pub use annotate::{AnnotationStore, FieldMemory};
pub use autosave::Autosave;
pub use backup::{BackupError, BackupScheduler, BackupTimer, BackupTrigger};
pub use db::{open_db, open_db_in_memory, open_db_with_backup, DbError};
pub use filter::{AnnotationStatistics, PosFilter, TokenFilter, TokenMatch};
pub use history::{Edit, History, HistoryError};
pub use logging::{default_log_level, init_logging, init_logging_from_settings, logging_status};
pub use model::annotation::{
    Annotation, AnnotationInput, FieldPatch, InvalidFieldError, PartOfSpeech, PosFields,
};
pub use model::project::{Note, NoteId, Project, ProjectId, Sentence, Token};
pub use ranges::{InvalidRangeError, NoteRange, TokenEdit};
pub use repo::{ProjectRepository, ProjectSummary, RepoError, SqliteProjectRepository};
pub use serializer::{ImportError, ProjectDocument};
pub use service::session::{EditingSession, SessionError};
pub use service::transfer::{export_project_by_id, import_project_json, ImportOutcome};
pub use settings::Settings;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
