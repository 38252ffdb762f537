//! Token queries and annotation statistics over a project.
//!
//! # Responsibility
//! - Find tokens by part of speech, completeness, review flags and
//!   confidence.
//! - Summarize annotation progress for a project.
//!
//! # Invariants
//! - Queries are read-only and return matches in reading order.
//! - A token counts as annotated once a part of speech is chosen.
//! - An annotation is incomplete when a required field of its part of speech
//!   is unset; parts of speech without required fields are never incomplete.

use crate::model::annotation::{Annotation, PartOfSpeech};
use crate::model::project::Project;
use std::collections::BTreeMap;

/// Part-of-speech condition of a token query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PosFilter {
    /// Every token, annotated or not.
    #[default]
    All,
    /// Tokens with any part of speech chosen.
    Any,
    Only(PartOfSpeech),
}

/// Conditions a token must meet; unset conditions match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenFilter {
    pub pos: PosFilter,
    /// Only annotations missing a required field.
    pub incomplete: bool,
    /// Only annotations whose part of speech defines this field and leaves it
    /// unset.
    pub missing_field: Option<String>,
    pub uncertain: Option<bool>,
    pub todo: Option<bool>,
    pub has_alternatives: Option<bool>,
    /// Tokens without a confidence value pass both bounds.
    pub min_confidence: Option<u8>,
    pub max_confidence: Option<u8>,
}

impl TokenFilter {
    pub fn matches(&self, annotation: &Annotation) -> bool {
        let pos = annotation.pos();
        let pos_ok = match self.pos {
            PosFilter::All => true,
            PosFilter::Any => pos.is_some(),
            PosFilter::Only(wanted) => pos == Some(wanted),
        };
        pos_ok
            && (!self.incomplete || is_incomplete(annotation))
            && self
                .missing_field
                .as_deref()
                .map_or(true, |key| is_missing(annotation, key))
            && self.uncertain.map_or(true, |flag| annotation.uncertain == flag)
            && self.todo.map_or(true, |flag| annotation.todo == flag)
            && self
                .has_alternatives
                .map_or(true, |flag| has_alternatives(annotation) == flag)
            && within(annotation.confidence, self.min_confidence, self.max_confidence)
    }
}

/// One token returned by `find_tokens`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMatch {
    pub sentence: usize,
    pub token: usize,
    pub text: String,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationStatistics {
    pub total_tokens: usize,
    pub annotated_tokens: usize,
    pub unannotated_tokens: usize,
    /// Keyed by canonical part-of-speech name.
    pub pos_distribution: BTreeMap<String, usize>,
    pub uncertain_count: usize,
    pub incomplete_count: usize,
    pub todo_count: usize,
}

/// Fields an annotation needs before it counts as complete.
pub fn required_fields(pos: PartOfSpeech) -> &'static [&'static str] {
    match pos {
        PartOfSpeech::Noun | PartOfSpeech::Adjective => &["gender", "number", "case"],
        PartOfSpeech::Verb => &["tense", "mood", "person", "number"],
        PartOfSpeech::Pronoun => &["pronoun_type", "gender", "number", "case"],
        PartOfSpeech::Preposition => &["prep_case"],
        PartOfSpeech::Article
        | PartOfSpeech::Adverb
        | PartOfSpeech::Conjunction
        | PartOfSpeech::Interjection => &[],
    }
}

pub fn is_incomplete(annotation: &Annotation) -> bool {
    let Some(fields) = &annotation.fields else {
        return false;
    };
    required_fields(fields.pos())
        .iter()
        .any(|key| matches!(fields.get(key), Ok(None)))
}

fn is_missing(annotation: &Annotation, key: &str) -> bool {
    annotation
        .fields
        .as_ref()
        .is_some_and(|fields| matches!(fields.get(key), Ok(None)))
}

fn has_alternatives(annotation: &Annotation) -> bool {
    annotation
        .alternatives
        .as_deref()
        .is_some_and(|text| !text.trim().is_empty())
}

fn within(confidence: Option<u8>, min: Option<u8>, max: Option<u8>) -> bool {
    let Some(value) = confidence else {
        return true;
    };
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

/// Tokens matching `filter`, in reading order.
pub fn find_tokens(project: &Project, filter: &TokenFilter) -> Vec<TokenMatch> {
    let mut found = Vec::new();
    for (sentence_index, sentence) in project.sentences.iter().enumerate() {
        for (token_index, token) in sentence.tokens.iter().enumerate() {
            if filter.matches(&token.annotation) {
                found.push(TokenMatch {
                    sentence: sentence_index,
                    token: token_index,
                    text: token.text.clone(),
                    annotation: token.annotation.clone(),
                });
            }
        }
    }
    found
}

pub fn statistics(project: &Project) -> AnnotationStatistics {
    let mut stats = AnnotationStatistics::default();
    for token in project.sentences.iter().flat_map(|s| &s.tokens) {
        let annotation = &token.annotation;
        stats.total_tokens += 1;
        if let Some(pos) = annotation.pos() {
            stats.annotated_tokens += 1;
            *stats
                .pos_distribution
                .entry(pos.as_str().to_string())
                .or_default() += 1;
        }
        if annotation.uncertain {
            stats.uncertain_count += 1;
        }
        if annotation.todo {
            stats.todo_count += 1;
        }
        if is_incomplete(annotation) {
            stats.incomplete_count += 1;
        }
    }
    stats.unannotated_tokens = stats.total_tokens - stats.annotated_tokens;
    stats
}
