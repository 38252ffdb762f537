//! Annotation store: incremental merge of annotation edits.
//!
//! # Responsibility
//! - Merge a sparse `AnnotationInput` onto a token's current annotation.
//! - Remember the last field values used per part of speech and use them to
//!   pre-fill annotations of the same category.
//!
//! # Invariants
//! - Same part of speech: unset input fields keep the token's prior values.
//! - Different part of speech: unset input fields come from field memory for
//!   the new part of speech, else stay empty. The token's prior fields of
//!   another category are never carried over.
//! - Token-level metadata (uncertain, alternatives, confidence, todo, gloss,
//!   root) is not category-scoped; unset metadata keeps its prior value.
//! - Validation runs before any mutation; a rejected input changes nothing.

use crate::model::annotation::{
    clamp_confidence, Annotation, AnnotationInput, FieldPatch, InvalidFieldError, PartOfSpeech,
    PosFields,
};
use crate::model::project::Token;
use log::debug;
use std::collections::HashMap;

/// Last-used grammatical fields per part of speech.
///
/// Session-scoped and never persisted. Pass one instance per editing session.
#[derive(Debug, Clone, Default)]
pub struct FieldMemory {
    last: HashMap<PartOfSpeech, PosFields>,
}

impl FieldMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the remembered fields for `pos`, if any annotation of that
    /// category was applied in this session.
    pub fn recall(&self, pos: PartOfSpeech) -> Option<&PosFields> {
        self.last.get(&pos)
    }

    pub fn remember(&mut self, fields: &PosFields) {
        self.last.insert(fields.pos(), fields.clone());
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

/// Applies annotation edits to tokens.
#[derive(Debug, Default)]
pub struct AnnotationStore {
    memory: FieldMemory,
}

impl AnnotationStore {
    pub fn new(memory: FieldMemory) -> Self {
        Self { memory }
    }

    pub fn memory(&self) -> &FieldMemory {
        &self.memory
    }

    pub fn into_memory(self) -> FieldMemory {
        self.memory
    }

    /// Computes the merged annotation without touching the token or memory.
    pub fn merge(
        &self,
        existing: &Annotation,
        input: &AnnotationInput,
    ) -> Result<Annotation, InvalidFieldError> {
        input.validate()?;

        let mut fields = match existing.fields.as_ref() {
            Some(current) if current.pos() == input.pos => current.clone(),
            _ => self
                .memory
                .recall(input.pos)
                .cloned()
                .unwrap_or_else(|| PosFields::empty(input.pos)),
        };
        for (key, patch) in &input.fields {
            match patch {
                FieldPatch::Keep => {}
                FieldPatch::Clear => fields.set(key, None)?,
                FieldPatch::Set(value) => fields.set(key, Some(value.clone()))?,
            }
        }

        let mut merged = existing.clone();
        merged.fields = Some(fields);
        if let Some(uncertain) = input.uncertain {
            merged.uncertain = uncertain;
        }
        if let Some(todo) = input.todo {
            merged.todo = todo;
        }
        input.alternatives.clone().apply_to(&mut merged.alternatives);
        input
            .confidence
            .clone()
            .map(clamp_confidence)
            .apply_to(&mut merged.confidence);
        input.gloss.clone().apply_to(&mut merged.gloss);
        input.root.clone().apply_to(&mut merged.root);
        Ok(merged)
    }

    /// Merges `input` onto the token's annotation and stores the result.
    ///
    /// Field memory for the input's part of speech is updated to the
    /// resulting field set.
    ///
    /// # Errors
    /// - `InvalidFieldError` when a field key is not defined for `input.pos`.
    pub fn apply(
        &mut self,
        token: &mut Token,
        input: &AnnotationInput,
    ) -> Result<Annotation, InvalidFieldError> {
        let merged = self.merge(&token.annotation, input)?;
        if let Some(fields) = merged.fields.as_ref() {
            self.memory.remember(fields);
        }
        token.annotation = merged.clone();
        debug!(
            "event=annotation_apply module=annotate status=ok pos={} token={} fields_set={}",
            input.pos,
            token.position,
            merged.fields.as_ref().map_or(0, |f| f.to_map().len())
        );
        Ok(merged)
    }

    /// Resets the token's annotation to empty. Field memory is unchanged.
    pub fn clear(&mut self, token: &mut Token) {
        token.annotation = Annotation::empty();
        debug!(
            "event=annotation_clear module=annotate status=ok token={}",
            token.position
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{AnnotationStore, FieldMemory};
    use crate::model::annotation::{AnnotationInput, PartOfSpeech};
    use crate::model::project::Token;

    #[test]
    fn rejected_input_leaves_token_and_memory_untouched() {
        let mut store = AnnotationStore::new(FieldMemory::new());
        let mut token = Token::new(0, "cyning");
        store
            .apply(&mut token, &AnnotationInput::new(PartOfSpeech::Noun).set("case", "n"))
            .unwrap();
        let before = token.annotation.clone();

        let bad = AnnotationInput::new(PartOfSpeech::Noun)
            .set("gender", "m")
            .set("tense", "past");
        assert!(store.apply(&mut token, &bad).is_err());
        assert_eq!(token.annotation, before);
        assert_eq!(
            store
                .memory()
                .recall(PartOfSpeech::Noun)
                .and_then(|f| f.get("gender").ok().flatten()),
            None
        );
    }

    #[test]
    fn clear_keeps_field_memory() {
        let mut store = AnnotationStore::new(FieldMemory::new());
        let mut token = Token::new(0, "ƿer");
        store
            .apply(&mut token, &AnnotationInput::new(PartOfSpeech::Noun).set("gender", "m"))
            .unwrap();
        store.clear(&mut token);
        assert!(token.annotation.is_empty());
        assert_eq!(store.memory().len(), 1);
    }
}
