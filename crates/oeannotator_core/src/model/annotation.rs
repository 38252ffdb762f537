//! Annotation domain model.
//!
//! # Responsibility
//! - Define the closed set of parts of speech and their grammatical fields.
//! - Represent sparse annotation edits (`AnnotationInput`) distinctly from
//!   stored annotation state (`Annotation`).
//!
//! # Invariants
//! - Every field is independently optional; an annotation with no fields set
//!   is still valid.
//! - Field keys are checked against the part of speech at the boundary;
//!   unknown keys are rejected, never dropped.
//! - `confidence` is always within `0..=100`.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Part-of-speech category. One category selects one grammatical field set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    Pronoun,
    Article,
    Adverb,
    Conjunction,
    Preposition,
    Interjection,
}

impl PartOfSpeech {
    pub const ALL: [PartOfSpeech; 9] = [
        Self::Noun,
        Self::Verb,
        Self::Adjective,
        Self::Pronoun,
        Self::Article,
        Self::Adverb,
        Self::Conjunction,
        Self::Preposition,
        Self::Interjection,
    ];

    /// Canonical lowercase name used in documents and storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Noun => "noun",
            Self::Verb => "verb",
            Self::Adjective => "adjective",
            Self::Pronoun => "pronoun",
            Self::Article => "article",
            Self::Adverb => "adverb",
            Self::Conjunction => "conjunction",
            Self::Preposition => "preposition",
            Self::Interjection => "interjection",
        }
    }

    /// Single-letter code used by older exports.
    pub fn code(self) -> &'static str {
        match self {
            Self::Noun => "N",
            Self::Verb => "V",
            Self::Adjective => "A",
            Self::Pronoun => "R",
            Self::Article => "D",
            Self::Adverb => "B",
            Self::Conjunction => "C",
            Self::Preposition => "E",
            Self::Interjection => "I",
        }
    }

    /// Parses either the canonical name or the single-letter code.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        Self::ALL.into_iter().find(|pos| {
            pos.as_str().eq_ignore_ascii_case(trimmed) || pos.code() == trimmed
        })
    }

    /// Field keys accepted for this part of speech.
    pub fn field_keys(self) -> &'static [&'static str] {
        match self {
            Self::Noun => NounFields::KEYS,
            Self::Verb => VerbFields::KEYS,
            Self::Adjective => AdjectiveFields::KEYS,
            Self::Pronoun => PronounFields::KEYS,
            Self::Article => ArticleFields::KEYS,
            Self::Adverb => AdverbFields::KEYS,
            Self::Conjunction => ConjunctionFields::KEYS,
            Self::Preposition => PrepositionFields::KEYS,
            Self::Interjection => InterjectionFields::KEYS,
        }
    }

    pub fn accepts_field(self, key: &str) -> bool {
        self.field_keys().contains(&key)
    }
}

impl Display for PartOfSpeech {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field key was used that the part of speech does not define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFieldError {
    pub pos: PartOfSpeech,
    pub field: String,
}

impl Display for InvalidFieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "field `{}` is not defined for part of speech `{}`",
            self.field, self.pos
        )
    }
}

impl Error for InvalidFieldError {}

macro_rules! pos_fields {
    ($(#[$meta:meta])* $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name {
            $(pub $field: Option<String>,)+
        }

        impl $name {
            pub const KEYS: &'static [&'static str] = &[$(stringify!($field)),+];

            fn slot(&self, key: &str) -> Option<&Option<String>> {
                match key {
                    $(stringify!($field) => Some(&self.$field),)+
                    _ => None,
                }
            }

            fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
                match key {
                    $(stringify!($field) => Some(&mut self.$field),)+
                    _ => None,
                }
            }
        }
    };
}

pos_fields!(
    /// Noun fields.
    NounFields { gender, number, case, declension }
);
pos_fields!(
    /// Verb fields.
    VerbFields { verb_class, tense, mood, person, number, aspect, form }
);
pos_fields!(AdjectiveFields { degree, inflection, gender, number, case });
pos_fields!(PronounFields { pronoun_type, gender, number, case });
pos_fields!(
    /// Article/determiner fields.
    ArticleFields { article_type, gender, number, case }
);
pos_fields!(AdverbFields { degree });
pos_fields!(ConjunctionFields { conj_type });
pos_fields!(PrepositionFields { prep_case });
pos_fields!(InterjectionFields { interjection_type });

/// Grammatical fields tagged by part of speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PosFields {
    Noun(NounFields),
    Verb(VerbFields),
    Adjective(AdjectiveFields),
    Pronoun(PronounFields),
    Article(ArticleFields),
    Adverb(AdverbFields),
    Conjunction(ConjunctionFields),
    Preposition(PrepositionFields),
    Interjection(InterjectionFields),
}

impl PosFields {
    /// Creates an all-unset field set for `pos`.
    pub fn empty(pos: PartOfSpeech) -> Self {
        match pos {
            PartOfSpeech::Noun => Self::Noun(NounFields::default()),
            PartOfSpeech::Verb => Self::Verb(VerbFields::default()),
            PartOfSpeech::Adjective => Self::Adjective(AdjectiveFields::default()),
            PartOfSpeech::Pronoun => Self::Pronoun(PronounFields::default()),
            PartOfSpeech::Article => Self::Article(ArticleFields::default()),
            PartOfSpeech::Adverb => Self::Adverb(AdverbFields::default()),
            PartOfSpeech::Conjunction => Self::Conjunction(ConjunctionFields::default()),
            PartOfSpeech::Preposition => Self::Preposition(PrepositionFields::default()),
            PartOfSpeech::Interjection => Self::Interjection(InterjectionFields::default()),
        }
    }

    pub fn pos(&self) -> PartOfSpeech {
        match self {
            Self::Noun(_) => PartOfSpeech::Noun,
            Self::Verb(_) => PartOfSpeech::Verb,
            Self::Adjective(_) => PartOfSpeech::Adjective,
            Self::Pronoun(_) => PartOfSpeech::Pronoun,
            Self::Article(_) => PartOfSpeech::Article,
            Self::Adverb(_) => PartOfSpeech::Adverb,
            Self::Conjunction(_) => PartOfSpeech::Conjunction,
            Self::Preposition(_) => PartOfSpeech::Preposition,
            Self::Interjection(_) => PartOfSpeech::Interjection,
        }
    }

    fn slot(&self, key: &str) -> Option<&Option<String>> {
        match self {
            Self::Noun(fields) => fields.slot(key),
            Self::Verb(fields) => fields.slot(key),
            Self::Adjective(fields) => fields.slot(key),
            Self::Pronoun(fields) => fields.slot(key),
            Self::Article(fields) => fields.slot(key),
            Self::Adverb(fields) => fields.slot(key),
            Self::Conjunction(fields) => fields.slot(key),
            Self::Preposition(fields) => fields.slot(key),
            Self::Interjection(fields) => fields.slot(key),
        }
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        match self {
            Self::Noun(fields) => fields.slot_mut(key),
            Self::Verb(fields) => fields.slot_mut(key),
            Self::Adjective(fields) => fields.slot_mut(key),
            Self::Pronoun(fields) => fields.slot_mut(key),
            Self::Article(fields) => fields.slot_mut(key),
            Self::Adverb(fields) => fields.slot_mut(key),
            Self::Conjunction(fields) => fields.slot_mut(key),
            Self::Preposition(fields) => fields.slot_mut(key),
            Self::Interjection(fields) => fields.slot_mut(key),
        }
    }

    /// Reads one field value.
    pub fn get(&self, key: &str) -> Result<Option<&str>, InvalidFieldError> {
        self.slot(key)
            .map(|value| value.as_deref())
            .ok_or_else(|| InvalidFieldError {
                pos: self.pos(),
                field: key.to_string(),
            })
    }

    /// Writes one field value. Blank values are stored as unset.
    pub fn set(&mut self, key: &str, value: Option<String>) -> Result<(), InvalidFieldError> {
        let pos = self.pos();
        let slot = self.slot_mut(key).ok_or_else(|| InvalidFieldError {
            pos,
            field: key.to_string(),
        })?;
        *slot = value.and_then(normalize_value);
        Ok(())
    }

    /// Returns only the populated fields, keyed by field name.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.pos()
            .field_keys()
            .iter()
            .filter_map(|key| {
                self.slot(key)
                    .and_then(|value| value.clone())
                    .map(|value| (key.to_string(), value))
            })
            .collect()
    }

    /// Builds a field set from a key/value map, rejecting unknown keys.
    pub fn from_map(
        pos: PartOfSpeech,
        values: &BTreeMap<String, String>,
    ) -> Result<Self, InvalidFieldError> {
        let mut fields = Self::empty(pos);
        for (key, value) in values {
            fields.set(key, Some(value.clone()))?;
        }
        Ok(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.pos()
            .field_keys()
            .iter()
            .all(|key| matches!(self.slot(key), Some(None)))
    }
}

/// Stored annotation for one token.
///
/// `fields == None` means no part of speech has been chosen yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub fields: Option<PosFields>,
    /// Annotator is unsure about this analysis.
    pub uncertain: bool,
    /// Free-text alternative analyses.
    pub alternatives: Option<String>,
    /// Confidence percentage, `0..=100`.
    pub confidence: Option<u8>,
    /// Flagged for later review.
    pub todo: bool,
    /// Modern English meaning.
    pub gloss: Option<String>,
    /// Root (dictionary) form.
    pub root: Option<String>,
}

impl Annotation {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn pos(&self) -> Option<PartOfSpeech> {
        self.fields.as_ref().map(PosFields::pos)
    }

    /// Whether the annotation carries no information at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_none()
            && !self.uncertain
            && self.alternatives.is_none()
            && self.confidence.is_none()
            && !self.todo
            && self.gloss.is_none()
            && self.root.is_none()
    }
}

/// Sparse edit of one value.
///
/// `Keep` leaves the prior value untouched, `Clear` explicitly unsets it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldPatch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> FieldPatch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    /// Applies the patch to an optional slot.
    pub fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Clear => *slot = None,
            Self::Set(value) => *slot = Some(value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FieldPatch<U> {
        match self {
            Self::Keep => FieldPatch::Keep,
            Self::Clear => FieldPatch::Clear,
            Self::Set(value) => FieldPatch::Set(f(value)),
        }
    }
}

/// Partial annotation submitted by the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationInput {
    pub pos: PartOfSpeech,
    /// Grammatical field edits keyed by field name. Absent keys mean `Keep`.
    pub fields: BTreeMap<String, FieldPatch<String>>,
    pub uncertain: Option<bool>,
    pub todo: Option<bool>,
    pub alternatives: FieldPatch<String>,
    /// Raw confidence; clamped to `0..=100` when applied.
    pub confidence: FieldPatch<i64>,
    pub gloss: FieldPatch<String>,
    pub root: FieldPatch<String>,
}

impl AnnotationInput {
    /// Creates an input that only selects a part of speech.
    pub fn new(pos: PartOfSpeech) -> Self {
        Self {
            pos,
            fields: BTreeMap::new(),
            uncertain: None,
            todo: None,
            alternatives: FieldPatch::Keep,
            confidence: FieldPatch::Keep,
            gloss: FieldPatch::Keep,
            root: FieldPatch::Keep,
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .insert(key.into(), FieldPatch::Set(value.into()));
        self
    }

    pub fn clear(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key.into(), FieldPatch::Clear);
        self
    }

    pub fn with_confidence(mut self, confidence: i64) -> Self {
        self.confidence = FieldPatch::Set(confidence);
        self
    }

    pub fn with_gloss(mut self, gloss: impl Into<String>) -> Self {
        self.gloss = FieldPatch::Set(gloss.into());
        self
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = FieldPatch::Set(root.into());
        self
    }

    pub fn with_uncertain(mut self, uncertain: bool) -> Self {
        self.uncertain = Some(uncertain);
        self
    }

    pub fn with_todo(mut self, todo: bool) -> Self {
        self.todo = Some(todo);
        self
    }

    /// Checks every field key against the part of speech.
    pub fn validate(&self) -> Result<(), InvalidFieldError> {
        match self
            .fields
            .keys()
            .find(|key| !self.pos.accepts_field(key.as_str()))
        {
            Some(key) => Err(InvalidFieldError {
                pos: self.pos,
                field: key.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Clamps a raw confidence value into the stored percentage range.
pub fn clamp_confidence(value: i64) -> u8 {
    // Lossless: the clamp bounds fit in u8.
    value.clamp(0, 100) as u8
}

fn normalize_value(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
