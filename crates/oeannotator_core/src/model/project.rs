//! Project, sentence, token and note domain model.
//!
//! # Responsibility
//! - Own the in-memory project tree edited by one session.
//! - Keep token positions dense and notes consistent on structural edits.
//!
//! # Invariants
//! - `Token::position` equals the token's index in `Sentence::tokens`.
//! - Note ranges reference existing tokens; notes are numbered 1..N in
//!   reading order (see `crate::ranges`).

use crate::model::annotation::Annotation;
use crate::ranges;
use crate::tokenize::{split_sentences, tokenize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Stable project identifier.
pub type ProjectId = Uuid;

/// Note identifier, unique within its sentence and stable across renumbering.
pub type NoteId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sentences: Vec<Sentence>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    /// Ordinal position within the project.
    pub position: usize,
    /// Source text as typed by the annotator.
    pub text: String,
    pub translation: String,
    pub tokens: Vec<Token>,
    /// Kept sorted by reading order.
    pub notes: Vec<Note>,
    /// Next id handed out by `ranges::add_note`.
    pub next_note_id: NoteId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub position: usize,
    pub text: String,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    /// Display number, 1-based.
    pub number: u32,
    /// First token position (inclusive).
    pub start: usize,
    /// Last token position (inclusive).
    pub end: usize,
    pub text: String,
}

impl Project {
    /// Creates an empty project with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: now,
            updated_at: now,
            sentences: Vec::new(),
        }
    }

    /// Creates a project by splitting `text` into sentences and tokens.
    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        let mut project = Self::new(name);
        project.sentences = split_sentences(text)
            .iter()
            .enumerate()
            .map(|(position, sentence)| Sentence::from_text(position, sentence))
            .collect();
        project
    }

    pub fn token_count(&self) -> usize {
        self.sentences.iter().map(|s| s.tokens.len()).sum()
    }

    /// Appends sentence `index + 1` to sentence `index`.
    ///
    /// Tokens keep their annotations, notes move with their tokens and are
    /// renumbered, texts are joined with a space and later sentences move up
    /// one position. Returns `false` when there is no following sentence.
    pub fn merge_with_next(&mut self, index: usize) -> bool {
        if index + 1 >= self.sentences.len() {
            return false;
        }
        let next = self.sentences.remove(index + 1);
        self.sentences[index].absorb(next);
        self.reindex_sentences();
        true
    }

    /// Sets every sentence position to its index.
    pub fn reindex_sentences(&mut self) {
        for (index, sentence) in self.sentences.iter_mut().enumerate() {
            sentence.position = index;
        }
    }

    /// Structural equality ignoring identity and note ids.
    ///
    /// Two projects are content-equal when names, timestamps, sentences,
    /// tokens, annotations and numbered note ranges match.
    pub fn content_eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.created_at == other.created_at
            && self.sentences.len() == other.sentences.len()
            && self
                .sentences
                .iter()
                .zip(&other.sentences)
                .all(|(left, right)| left.content_eq(right))
    }
}

impl Sentence {
    pub fn new(position: usize, text: impl Into<String>, surfaces: &[String]) -> Self {
        Self {
            position,
            text: text.into(),
            translation: String::new(),
            tokens: surfaces
                .iter()
                .enumerate()
                .map(|(index, surface)| Token::new(index, surface.clone()))
                .collect(),
            notes: Vec::new(),
            next_note_id: 1,
        }
    }

    /// Builds a sentence and its tokens from raw text.
    pub fn from_text(position: usize, text: &str) -> Self {
        Self::new(position, text, &tokenize(text))
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    /// Inserts new unannotated tokens before position `at`.
    ///
    /// Notes are shifted or extended, then renumbered.
    pub fn insert_tokens(&mut self, at: usize, surfaces: &[String]) {
        let at = at.min(self.tokens.len());
        let inserted = surfaces
            .iter()
            .map(|surface| Token::new(0, surface.clone()));
        self.tokens.splice(at..at, inserted);
        self.reindex_tokens();
        ranges::on_tokens_inserted(&mut self.notes, at, surfaces.len());
    }

    /// Removes `count` tokens starting at `from`, returning deleted notes.
    pub fn remove_tokens(&mut self, from: usize, count: usize) -> Vec<Note> {
        let from = from.min(self.tokens.len());
        let count = count.min(self.tokens.len() - from);
        self.tokens.drain(from..from + count);
        self.reindex_tokens();
        ranges::on_tokens_removed(&mut self.notes, from, count)
    }

    fn absorb(&mut self, next: Sentence) {
        let offset = self.tokens.len();
        self.text = join_text(&self.text, &next.text);
        self.translation = join_text(&self.translation, &next.translation);
        self.tokens.extend(next.tokens);
        self.reindex_tokens();
        for note in next.notes {
            let id = self.next_note_id;
            self.next_note_id += 1;
            self.notes.push(Note {
                id,
                start: note.start + offset,
                end: note.end + offset,
                ..note
            });
        }
        ranges::renumber(&mut self.notes);
    }

    fn reindex_tokens(&mut self) {
        for (index, token) in self.tokens.iter_mut().enumerate() {
            token.position = index;
        }
    }

    fn content_eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.text == other.text
            && self.translation == other.translation
            && self.tokens == other.tokens
            && self.notes.len() == other.notes.len()
            && self.notes.iter().zip(&other.notes).all(|(left, right)| {
                left.number == right.number
                    && left.start == right.start
                    && left.end == right.end
                    && left.text == right.text
            })
    }
}

fn join_text(left: &str, right: &str) -> String {
    format!("{} {}", left.trim_end(), right.trim_start())
        .trim()
        .to_string()
}

impl Token {
    pub fn new(position: usize, text: impl Into<String>) -> Self {
        Self {
            position,
            text: text.into(),
            annotation: Annotation::empty(),
        }
    }
}
