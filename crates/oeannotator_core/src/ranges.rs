//! Note range tracking under token edits.
//!
//! # Responsibility
//! - Map note ranges through token insertions and removals as a pure function.
//! - Keep note numbering dense and in reading order.
//! - Validate note creation and deletion requests.
//!
//! # Invariants
//! - Every surviving note satisfies `start <= end < token_count`.
//! - Numbers are `1..=N`, ascending by `start`, ties by creation order.
//! - A note whose tokens were all removed is deleted, never kept empty.

use crate::model::project::{Note, NoteId, Sentence};
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Inclusive token span of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteRange {
    pub start: usize,
    pub end: usize,
}

impl NoteRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Structural token edit within one sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEdit {
    /// `count` tokens inserted so the first new token sits at `at`.
    Inserted { at: usize, count: usize },
    /// `count` tokens removed starting at `from`.
    Removed { from: usize, count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidRangeError {
    /// `start > end`.
    Reversed { start: usize, end: usize },
    /// A bound does not reference an existing token.
    OutOfBounds {
        start: usize,
        end: usize,
        token_count: usize,
    },
    NoteNotFound(NoteId),
}

impl Display for InvalidRangeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reversed { start, end } => {
                write!(f, "note range start {start} is after end {end}")
            }
            Self::OutOfBounds {
                start,
                end,
                token_count,
            } => write!(
                f,
                "note range [{start}, {end}] is outside sentence with {token_count} tokens"
            ),
            Self::NoteNotFound(id) => write!(f, "note not found: {id}"),
        }
    }
}

impl Error for InvalidRangeError {}

/// Maps one range through one edit. `None` means the note must be deleted.
pub fn apply_edit(range: NoteRange, edit: TokenEdit) -> Option<NoteRange> {
    match edit {
        TokenEdit::Inserted { count: 0, .. } | TokenEdit::Removed { count: 0, .. } => Some(range),
        TokenEdit::Inserted { at, count } => {
            if range.start >= at {
                Some(NoteRange::new(range.start + count, range.end + count))
            } else if at <= range.end {
                // Inline insertion grows the note.
                Some(NoteRange::new(range.start, range.end + count))
            } else {
                Some(range)
            }
        }
        TokenEdit::Removed { from, count } => {
            let removed_end = from + count;
            if range.end < from {
                return Some(range);
            }
            if range.start >= removed_end {
                return Some(NoteRange::new(range.start - count, range.end - count));
            }
            if range.start >= from && range.end < removed_end {
                return None;
            }
            let start = if range.start < from { range.start } else { from };
            let end = if range.end >= removed_end {
                range.end - count
            } else {
                from - 1
            };
            (start <= end).then(|| NoteRange::new(start, end))
        }
    }
}

/// Maps every range through one edit, preserving input order.
pub fn apply_edit_all(ranges: &[NoteRange], edit: TokenEdit) -> Vec<Option<NoteRange>> {
    ranges.iter().map(|range| apply_edit(*range, edit)).collect()
}

/// Adjusts notes after tokens were inserted at `at`, then renumbers.
pub fn on_tokens_inserted(notes: &mut Vec<Note>, at: usize, count: usize) {
    apply_to_notes(notes, TokenEdit::Inserted { at, count });
}

/// Adjusts notes after tokens were removed, returning the deleted notes.
pub fn on_tokens_removed(notes: &mut Vec<Note>, from: usize, count: usize) -> Vec<Note> {
    apply_to_notes(notes, TokenEdit::Removed { from, count })
}

fn apply_to_notes(notes: &mut Vec<Note>, edit: TokenEdit) -> Vec<Note> {
    let mut deleted = Vec::new();
    let mut kept = Vec::with_capacity(notes.len());
    for mut note in notes.drain(..) {
        match apply_edit(NoteRange::new(note.start, note.end), edit) {
            Some(range) => {
                note.start = range.start;
                note.end = range.end;
                kept.push(note);
            }
            None => deleted.push(note),
        }
    }
    *notes = kept;
    renumber(notes);
    if !deleted.is_empty() {
        debug!(
            "event=notes_collapsed module=ranges status=ok deleted={}",
            deleted.len()
        );
    }
    deleted
}

/// Sorts notes into reading order and assigns numbers `1..=N`.
pub fn renumber(notes: &mut [Note]) {
    notes.sort_by_key(|note| (note.start, note.id));
    for (index, note) in notes.iter_mut().enumerate() {
        note.number = u32::try_from(index + 1).unwrap_or(u32::MAX);
    }
}

/// Checks that `[start, end]` references existing tokens.
pub fn validate_range(
    start: usize,
    end: usize,
    token_count: usize,
) -> Result<NoteRange, InvalidRangeError> {
    if start > end {
        return Err(InvalidRangeError::Reversed { start, end });
    }
    if end >= token_count {
        return Err(InvalidRangeError::OutOfBounds {
            start,
            end,
            token_count,
        });
    }
    Ok(NoteRange::new(start, end))
}

/// Creates a note over `[start, end]` and renumbers the sentence's notes.
pub fn add_note(
    sentence: &mut Sentence,
    start: usize,
    end: usize,
    text: impl Into<String>,
) -> Result<Note, InvalidRangeError> {
    let range = validate_range(start, end, sentence.token_count())?;
    let id = sentence.next_note_id;
    sentence.next_note_id += 1;
    sentence.notes.push(Note {
        id,
        number: 0,
        start: range.start,
        end: range.end,
        text: text.into(),
    });
    renumber(&mut sentence.notes);
    sentence
        .note(id)
        .cloned()
        .ok_or(InvalidRangeError::NoteNotFound(id))
}

/// Deletes a note by id and renumbers the rest.
pub fn delete_note(sentence: &mut Sentence, id: NoteId) -> Result<Note, InvalidRangeError> {
    let index = sentence
        .notes
        .iter()
        .position(|note| note.id == id)
        .ok_or(InvalidRangeError::NoteNotFound(id))?;
    let removed = sentence.notes.remove(index);
    renumber(&mut sentence.notes);
    Ok(removed)
}

/// Replaces the body of an existing note.
pub fn update_note_text(
    sentence: &mut Sentence,
    id: NoteId,
    text: impl Into<String>,
) -> Result<(), InvalidRangeError> {
    let note = sentence
        .notes
        .iter_mut()
        .find(|note| note.id == id)
        .ok_or(InvalidRangeError::NoteNotFound(id))?;
    note.text = text.into();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_edit, apply_edit_all, renumber, NoteRange, TokenEdit};
    use crate::model::project::Note;

    fn note(id: u64, start: usize, end: usize) -> Note {
        Note {
            id,
            number: 0,
            start,
            end,
            text: String::new(),
        }
    }

    #[test]
    fn insertion_before_range_shifts_it() {
        let moved = apply_edit(NoteRange::new(2, 4), TokenEdit::Inserted { at: 2, count: 3 });
        assert_eq!(moved, Some(NoteRange::new(5, 7)));
    }

    #[test]
    fn insertion_inside_range_extends_end() {
        let grown = apply_edit(NoteRange::new(2, 4), TokenEdit::Inserted { at: 3, count: 2 });
        assert_eq!(grown, Some(NoteRange::new(2, 6)));
    }

    #[test]
    fn insertion_after_range_is_ignored() {
        let same = apply_edit(NoteRange::new(2, 4), TokenEdit::Inserted { at: 5, count: 2 });
        assert_eq!(same, Some(NoteRange::new(2, 4)));
    }

    #[test]
    fn removal_covering_range_deletes_it() {
        let gone = apply_edit(NoteRange::new(2, 4), TokenEdit::Removed { from: 2, count: 3 });
        assert_eq!(gone, None);
        let gone = apply_edit(NoteRange::new(2, 4), TokenEdit::Removed { from: 0, count: 9 });
        assert_eq!(gone, None);
    }

    #[test]
    fn removal_inside_range_clips_it() {
        let clipped = apply_edit(NoteRange::new(2, 4), TokenEdit::Removed { from: 3, count: 1 });
        assert_eq!(clipped, Some(NoteRange::new(2, 3)));
    }

    #[test]
    fn removal_overlapping_edges_clips_to_survivors() {
        let head = apply_edit(NoteRange::new(2, 4), TokenEdit::Removed { from: 1, count: 2 });
        assert_eq!(head, Some(NoteRange::new(1, 2)));
        let tail = apply_edit(NoteRange::new(2, 4), TokenEdit::Removed { from: 4, count: 3 });
        assert_eq!(tail, Some(NoteRange::new(2, 3)));
    }

    #[test]
    fn removal_before_range_shifts_left() {
        let ranges = [NoteRange::new(5, 6), NoteRange::new(0, 0)];
        let mapped = apply_edit_all(&ranges, TokenEdit::Removed { from: 1, count: 2 });
        assert_eq!(mapped, vec![Some(NoteRange::new(3, 4)), Some(NoteRange::new(0, 0))]);
    }

    #[test]
    fn renumber_orders_by_start_then_creation() {
        let mut notes = vec![note(3, 4, 4), note(2, 1, 2), note(1, 1, 5)];
        renumber(&mut notes);
        let order: Vec<_> = notes.iter().map(|n| (n.id, n.number)).collect();
        assert_eq!(order, vec![(1, 1), (2, 2), (3, 3)]);
    }
}
