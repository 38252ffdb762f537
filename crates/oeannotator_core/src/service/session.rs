//! Editing session facade.
//!
//! # Responsibility
//! - Expose the editing operations consumed by presentation and automation
//!   layers: annotation, notes, sentence edits, export/import, backups and
//!   saving.
//! - Wire the in-memory project to the annotation store, field memory,
//!   undo history, debounced autosave and repository.
//!
//! # Invariants
//! - The in-memory project is authoritative; storage is written only by the
//!   autosave saver or `force_save`.
//! - Every successful mutation restarts the autosave quiet period; rejected
//!   mutations change nothing and trigger nothing.
//! - Every successful project edit is recorded for undo; undo and redo count
//!   as mutations.
//! - Export reads the persisted store after a synchronous save.

use crate::annotate::{AnnotationStore, FieldMemory};
use crate::autosave::{Autosave, SaveError};
use crate::backup::{BackupError, BackupScheduler};
use crate::filter::{self, AnnotationStatistics, TokenFilter, TokenMatch};
use crate::history::{Edit, History, HistoryError, SentenceEditKind};
use crate::model::annotation::{Annotation, AnnotationInput, InvalidFieldError};
use crate::model::project::{Note, NoteId, Project, ProjectId, Sentence, Token};
use crate::ranges::{self, InvalidRangeError, TokenEdit};
use crate::repo::{ProjectRepository, RepoError, SqliteProjectRepository};
use crate::serializer::migrate::{validate_builtin_chain, ChainError};
use crate::serializer::ProjectDocument;
use crate::service::transfer::{
    export_project_by_id, import_project_json, ImportOutcome, TransferError,
};
use crate::settings::Settings;
use crate::tokenize::retokenize;
use chrono::Utc;
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug)]
pub enum SessionError {
    InvalidField(InvalidFieldError),
    InvalidRange(InvalidRangeError),
    SentenceNotFound(usize),
    TokenNotFound { sentence: usize, token: usize },
    ProjectNotFound(ProjectId),
    Repo(RepoError),
    Transfer(TransferError),
    Backup(BackupError),
    /// `configure_backup` was called on a session without a scheduler.
    BackupNotConfigured,
    Chain(ChainError),
    History(HistoryError),
    Save(SaveError),
    Io(std::io::Error),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidField(err) => write!(f, "{err}"),
            Self::InvalidRange(err) => write!(f, "{err}"),
            Self::SentenceNotFound(index) => write!(f, "sentence not found: {index}"),
            Self::TokenNotFound { sentence, token } => {
                write!(f, "token {token} not found in sentence {sentence}")
            }
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Transfer(err) => write!(f, "{err}"),
            Self::Backup(err) => write!(f, "{err}"),
            Self::BackupNotConfigured => write!(f, "no backup scheduler attached to session"),
            Self::Chain(err) => write!(f, "{err}"),
            Self::History(err) => write!(f, "{err}"),
            Self::Save(err) => write!(f, "save failed: {err}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidField(err) => Some(err),
            Self::InvalidRange(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Transfer(err) => Some(err),
            Self::Backup(err) => Some(err),
            Self::Chain(err) => Some(err),
            Self::History(err) => Some(err),
            Self::Save(err) => Some(err.as_ref()),
            Self::Io(err) => Some(err),
            Self::SentenceNotFound(_)
            | Self::TokenNotFound { .. }
            | Self::ProjectNotFound(_)
            | Self::BackupNotConfigured => None,
        }
    }
}

impl From<InvalidFieldError> for SessionError {
    fn from(value: InvalidFieldError) -> Self {
        Self::InvalidField(value)
    }
}

impl From<InvalidRangeError> for SessionError {
    fn from(value: InvalidRangeError) -> Self {
        Self::InvalidRange(value)
    }
}

impl From<RepoError> for SessionError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::ProjectNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<TransferError> for SessionError {
    fn from(value: TransferError) -> Self {
        Self::Transfer(value)
    }
}

impl From<BackupError> for SessionError {
    fn from(value: BackupError) -> Self {
        Self::Backup(value)
    }
}

impl From<ChainError> for SessionError {
    fn from(value: ChainError) -> Self {
        Self::Chain(value)
    }
}

impl From<HistoryError> for SessionError {
    fn from(value: HistoryError) -> Self {
        Self::History(value)
    }
}

impl From<std::io::Error> for SessionError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// One project opened for editing.
pub struct EditingSession {
    project_id: ProjectId,
    conn: Arc<Mutex<Connection>>,
    project: Arc<Mutex<Project>>,
    store: AnnotationStore,
    history: History,
    autosave: Autosave,
    backup: Option<Arc<Mutex<BackupScheduler>>>,
}

impl EditingSession {
    /// Loads `project_id` and starts the autosave worker.
    ///
    /// Field memory starts empty for every session.
    pub fn open(
        conn: Arc<Mutex<Connection>>,
        project_id: ProjectId,
        settings: &Settings,
    ) -> SessionResult<Self> {
        validate_builtin_chain()?;
        let loaded = {
            let mut guard = conn.lock();
            SqliteProjectRepository::try_new(&mut guard)?.load_project(project_id)?
        };
        let project = Arc::new(Mutex::new(
            loaded.ok_or(SessionError::ProjectNotFound(project_id))?,
        ));

        let saver_conn = Arc::clone(&conn);
        let saver_project = Arc::clone(&project);
        let autosave = Autosave::new(
            Duration::from_millis(settings.autosave_debounce_ms),
            Box::new(move || -> Result<(), SaveError> {
                let snapshot = {
                    let mut project = saver_project.lock();
                    project.updated_at = Utc::now();
                    project.clone()
                };
                let mut guard = saver_conn.lock();
                SqliteProjectRepository::try_new(&mut guard)?.save_project(&snapshot)?;
                Ok(())
            }),
        )?;

        info!("event=session_open module=service status=ok project_id={project_id}");
        Ok(Self {
            project_id,
            conn,
            project,
            store: AnnotationStore::new(FieldMemory::new()),
            history: History::new(settings.undo_limit),
            autosave,
            backup: None,
        })
    }

    /// Attaches the scheduler that `configure_backup` adjusts.
    pub fn with_backup(mut self, scheduler: Arc<Mutex<BackupScheduler>>) -> Self {
        self.backup = Some(scheduler);
        self
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Copy of the current in-memory project.
    pub fn project(&self) -> Project {
        self.project.lock().clone()
    }

    pub fn field_memory(&self) -> &FieldMemory {
        self.store.memory()
    }

    pub fn has_pending_save(&self) -> bool {
        self.autosave.is_pending()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.history.undo_description()
    }

    pub fn redo_description(&self) -> Option<String> {
        self.history.redo_description()
    }

    pub fn apply_annotation(
        &mut self,
        sentence: usize,
        token: usize,
        input: &AnnotationInput,
    ) -> SessionResult<Annotation> {
        let (annotation, before) = {
            let mut project = self.project.lock();
            let target = token_mut(&mut project, sentence, token)?;
            let before = target.annotation.clone();
            (self.store.apply(target, input)?, before)
        };
        self.history
            .record(Edit::annotate(sentence, token, before, annotation.clone()));
        self.autosave.trigger();
        Ok(annotation)
    }

    pub fn clear_annotation(&mut self, sentence: usize, token: usize) -> SessionResult<()> {
        let edit = {
            let mut project = self.project.lock();
            let target = token_mut(&mut project, sentence, token)?;
            let before = target.annotation.clone();
            self.store.clear(target);
            Edit::annotate(sentence, token, before, target.annotation.clone())
        };
        self.history.record(edit);
        self.autosave.trigger();
        Ok(())
    }

    pub fn add_note(
        &mut self,
        sentence: usize,
        start: usize,
        end: usize,
        text: &str,
    ) -> SessionResult<Note> {
        self.mutate_sentence(sentence, SentenceEditKind::AddNote, |target| {
            Ok(ranges::add_note(target, start, end, text)?)
        })
    }

    pub fn delete_note(&mut self, sentence: usize, note: NoteId) -> SessionResult<Note> {
        self.mutate_sentence(sentence, SentenceEditKind::DeleteNote, |target| {
            Ok(ranges::delete_note(target, note)?)
        })
    }

    pub fn update_note_text(
        &mut self,
        sentence: usize,
        note: NoteId,
        text: &str,
    ) -> SessionResult<()> {
        self.mutate_sentence(sentence, SentenceEditKind::UpdateNote, |target| {
            Ok(ranges::update_note_text(target, note, text)?)
        })
    }

    /// Replaces the sentence text and re-tokenizes it, keeping unchanged
    /// tokens' annotations. Returns the structural edits applied to notes.
    pub fn update_sentence_text(
        &mut self,
        sentence: usize,
        text: &str,
    ) -> SessionResult<Vec<TokenEdit>> {
        self.mutate_sentence(sentence, SentenceEditKind::EditText, |target| {
            Ok(retokenize(target, text))
        })
    }

    pub fn update_translation(&mut self, sentence: usize, text: &str) -> SessionResult<()> {
        self.mutate_sentence(sentence, SentenceEditKind::EditTranslation, |target| {
            target.translation = text.to_string();
            Ok(())
        })
    }

    /// Appends sentence `sentence + 1` to `sentence`, keeping annotations and
    /// moving notes with their tokens.
    pub fn merge_sentences(&mut self, sentence: usize) -> SessionResult<()> {
        let edit = {
            let mut project = self.project.lock();
            if sentence >= project.sentences.len() {
                return Err(SessionError::SentenceNotFound(sentence));
            }
            let before = project
                .sentences
                .get(sentence..sentence + 2)
                .ok_or(SessionError::SentenceNotFound(sentence + 1))?
                .to_vec();
            project.merge_with_next(sentence);
            Edit::Sentences {
                kind: SentenceEditKind::Merge,
                at: sentence,
                before,
                after: vec![project.sentences[sentence].clone()],
            }
        };
        self.history.record(edit);
        self.autosave.trigger();
        Ok(())
    }

    /// Reverts the newest recorded edit. Returns `false` when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> SessionResult<bool> {
        let undone = self.history.undo(&mut self.project.lock())?;
        if undone {
            self.autosave.trigger();
        }
        Ok(undone)
    }

    /// Re-applies the newest undone edit. Returns `false` when there is
    /// nothing to redo.
    pub fn redo(&mut self) -> SessionResult<bool> {
        let redone = self.history.redo(&mut self.project.lock())?;
        if redone {
            self.autosave.trigger();
        }
        Ok(redone)
    }

    pub fn find_tokens(&self, filter: &TokenFilter) -> Vec<TokenMatch> {
        filter::find_tokens(&self.project.lock(), filter)
    }

    pub fn statistics(&self) -> AnnotationStatistics {
        filter::statistics(&self.project.lock())
    }

    /// Saves pending edits, then exports the stored project.
    pub fn export_project(&self) -> SessionResult<ProjectDocument> {
        self.force_save()?;
        let mut conn = self.conn.lock();
        Ok(export_project_by_id(&mut conn, self.project_id)?)
    }

    /// Imports a document as a new project next to the one being edited.
    pub fn import_project(&self, json: &str) -> SessionResult<ImportOutcome> {
        let mut conn = self.conn.lock();
        Ok(import_project_json(&mut conn, json)?)
    }

    pub fn configure_backup(
        &self,
        interval_minutes: u32,
        retention_count: usize,
    ) -> SessionResult<()> {
        let scheduler = self
            .backup
            .as_ref()
            .ok_or(SessionError::BackupNotConfigured)?;
        scheduler.lock().configure(interval_minutes, retention_count)?;
        Ok(())
    }

    /// Persists the in-memory project now.
    pub fn force_save(&self) -> SessionResult<()> {
        self.autosave.save_now().map_err(SessionError::Save)
    }

    /// Saves pending edits and stops the autosave worker.
    pub fn close(self) -> SessionResult<()> {
        if self.autosave.is_pending() {
            self.force_save()?;
        }
        info!(
            "event=session_close module=service status=ok project_id={}",
            self.project_id
        );
        Ok(())
    }

    fn mutate_sentence<T>(
        &mut self,
        sentence: usize,
        kind: SentenceEditKind,
        edit: impl FnOnce(&mut Sentence) -> SessionResult<T>,
    ) -> SessionResult<T> {
        let (result, recorded) = {
            let mut project = self.project.lock();
            let target = project
                .sentences
                .get_mut(sentence)
                .ok_or(SessionError::SentenceNotFound(sentence))?;
            let before = target.clone();
            let result = edit(target)?;
            let recorded = Edit::sentence(kind, sentence, before, target.clone());
            (result, recorded)
        };
        self.history.record(recorded);
        self.autosave.trigger();
        Ok(result)
    }
}

fn token_mut(project: &mut Project, sentence: usize, token: usize) -> SessionResult<&mut Token> {
    project
        .sentences
        .get_mut(sentence)
        .ok_or(SessionError::SentenceNotFound(sentence))?
        .tokens
        .get_mut(token)
        .ok_or(SessionError::TokenNotFound { sentence, token })
}
