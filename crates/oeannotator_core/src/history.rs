//! Undo/redo history for in-memory project edits.
//!
//! # Responsibility
//! - Record each successful edit as a before/after pair.
//! - Undo and redo edits against the in-memory project.
//!
//! # Invariants
//! - Recording a new edit clears the redo stack.
//! - At most `limit` edits are kept on each stack; the oldest is dropped.
//! - A failed undo or redo leaves both the project and the stacks unchanged.
//! - Sentence positions stay equal to their index after every undo or redo.

use crate::model::annotation::Annotation;
use crate::model::project::{Project, Sentence};
use crate::settings::DEFAULT_UNDO_LIMIT;
use log::debug;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// What a sentence-level edit did, for descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceEditKind {
    AddNote,
    UpdateNote,
    DeleteNote,
    EditText,
    EditTranslation,
    /// Sentence merged with the one after it.
    Merge,
}

impl SentenceEditKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddNote => "add_note",
            Self::UpdateNote => "update_note",
            Self::DeleteNote => "delete_note",
            Self::EditText => "edit_text",
            Self::EditTranslation => "edit_translation",
            Self::Merge => "merge",
        }
    }
}

/// One undoable edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// A token's annotation was replaced.
    Annotate {
        sentence: usize,
        token: usize,
        before: Box<Annotation>,
        after: Box<Annotation>,
    },
    /// The sentences starting at `at` were replaced: `before` by `after`.
    Sentences {
        kind: SentenceEditKind,
        at: usize,
        before: Vec<Sentence>,
        after: Vec<Sentence>,
    },
}

impl Edit {
    pub fn annotate(sentence: usize, token: usize, before: Annotation, after: Annotation) -> Self {
        Self::Annotate {
            sentence,
            token,
            before: Box::new(before),
            after: Box::new(after),
        }
    }

    /// Edit confined to one sentence.
    pub fn sentence(kind: SentenceEditKind, at: usize, before: Sentence, after: Sentence) -> Self {
        Self::Sentences {
            kind,
            at,
            before: vec![before],
            after: vec![after],
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Annotate {
                sentence, token, ..
            } => format!("annotate token {token} in sentence {sentence}"),
            Self::Sentences {
                kind: SentenceEditKind::Merge,
                at,
                ..
            } => format!("merge sentence {at} with {}", at + 1),
            Self::Sentences { kind, at, .. } => format!("{} in sentence {at}", kind.as_str()),
        }
    }

    fn revert(&self, project: &mut Project) -> Result<(), HistoryError> {
        match self {
            Self::Annotate {
                sentence,
                token,
                before,
                ..
            } => set_annotation(project, *sentence, *token, before),
            Self::Sentences {
                at, before, after, ..
            } => splice_sentences(project, *at, after.len(), before),
        }
    }

    fn reapply(&self, project: &mut Project) -> Result<(), HistoryError> {
        match self {
            Self::Annotate {
                sentence,
                token,
                after,
                ..
            } => set_annotation(project, *sentence, *token, after),
            Self::Sentences {
                at, before, after, ..
            } => splice_sentences(project, *at, before.len(), after),
        }
    }
}

/// The project no longer has the shape an edit was recorded against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryError {
    pub description: String,
}

impl Display for HistoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot replay `{}` on the current project", self.description)
    }
}

impl Error for HistoryError {}

#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<Edit>,
    redo: VecDeque<Edit>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_LIMIT)
    }
}

impl History {
    /// `limit == 0` records nothing.
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn record(&mut self, edit: Edit) {
        self.redo.clear();
        push_capped(&mut self.undo, edit, self.limit);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Description of the edit `undo` would revert.
    pub fn undo_description(&self) -> Option<String> {
        self.undo.back().map(Edit::description)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo.back().map(Edit::description)
    }

    /// Reverts the newest edit. Returns `Ok(false)` when there is nothing to
    /// undo.
    pub fn undo(&mut self, project: &mut Project) -> Result<bool, HistoryError> {
        let Some(edit) = self.undo.pop_back() else {
            return Ok(false);
        };
        if let Err(err) = edit.revert(project) {
            self.undo.push_back(edit);
            return Err(err);
        }
        debug!(
            "event=history_undo module=history status=ok remaining={}",
            self.undo.len()
        );
        push_capped(&mut self.redo, edit, self.limit);
        Ok(true)
    }

    /// Re-applies the newest undone edit. Returns `Ok(false)` when there is
    /// nothing to redo.
    pub fn redo(&mut self, project: &mut Project) -> Result<bool, HistoryError> {
        let Some(edit) = self.redo.pop_back() else {
            return Ok(false);
        };
        if let Err(err) = edit.reapply(project) {
            self.redo.push_back(edit);
            return Err(err);
        }
        debug!(
            "event=history_redo module=history status=ok remaining={}",
            self.redo.len()
        );
        push_capped(&mut self.undo, edit, self.limit);
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

fn push_capped(stack: &mut VecDeque<Edit>, edit: Edit, limit: usize) {
    if limit == 0 {
        return;
    }
    stack.push_back(edit);
    while stack.len() > limit {
        stack.pop_front();
    }
}

fn set_annotation(
    project: &mut Project,
    sentence: usize,
    token: usize,
    annotation: &Annotation,
) -> Result<(), HistoryError> {
    let target = project
        .sentences
        .get_mut(sentence)
        .and_then(|s| s.tokens.get_mut(token))
        .ok_or_else(|| HistoryError {
            description: format!("annotate token {token} in sentence {sentence}"),
        })?;
    target.annotation = annotation.clone();
    Ok(())
}

fn splice_sentences(
    project: &mut Project,
    at: usize,
    remove: usize,
    insert: &[Sentence],
) -> Result<(), HistoryError> {
    if at + remove > project.sentences.len() {
        return Err(HistoryError {
            description: format!("replace sentences {at}..{}", at + remove),
        });
    }
    project
        .sentences
        .splice(at..at + remove, insert.iter().cloned());
    project.reindex_sentences();
    Ok(())
}
