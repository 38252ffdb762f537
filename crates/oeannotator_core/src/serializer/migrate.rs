//! Document migration chain.
//!
//! # Responsibility
//! - Upgrade exported documents from older schema versions to the current
//!   one through an ordered list of pure, single-step transforms.
//!
//! # Invariants
//! - Steps are keyed by source version and form one connected chain from
//!   `OLDEST_SUPPORTED_VERSION` to the current store version.
//! - `upgrade(doc, v)` equals applying each step from `v` in order.
//! - Every step stamps `migration_version = from + 1` on its output.
//! - Documents outside `[oldest, current]` are rejected, never guessed at.

use super::ImportError;
use crate::model::annotation::PartOfSpeech;
use log::debug;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Oldest document schema that can still be upgraded.
pub const OLDEST_SUPPORTED_VERSION: u32 = 1;

/// One transform failed because the document does not have the shape its
/// source version requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError(pub String);

impl Display for TransformError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for TransformError {}

/// The registered steps do not form a single connected chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    Gap { expected_from: u32, found_from: u32 },
    Incomplete { reaches: u32, current: u32 },
}

impl Display for ChainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gap {
                expected_from,
                found_from,
            } => write!(
                f,
                "migration chain gap: expected step from {expected_from}, found {found_from}"
            ),
            Self::Incomplete { reaches, current } => write!(
                f,
                "migration chain stops at version {reaches}, current is {current}"
            ),
        }
    }
}

impl Error for ChainError {}

pub type Transform = fn(Value) -> Result<Value, TransformError>;

/// Transform from `from` to `from + 1`.
#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    pub from: u32,
    pub name: &'static str,
    pub transform: Transform,
}

#[derive(Debug, Clone)]
pub struct MigrationChain {
    oldest: u32,
    current: u32,
    steps: Vec<MigrationStep>,
}

impl MigrationChain {
    /// Builds a chain, checking that `steps` lead from `oldest` to `current`
    /// one version at a time.
    pub fn new(oldest: u32, current: u32, steps: Vec<MigrationStep>) -> Result<Self, ChainError> {
        let mut reaches = oldest;
        for step in &steps {
            if step.from != reaches {
                return Err(ChainError::Gap {
                    expected_from: reaches,
                    found_from: step.from,
                });
            }
            reaches += 1;
        }
        if reaches != current {
            return Err(ChainError::Incomplete { reaches, current });
        }
        Ok(Self {
            oldest,
            current,
            steps,
        })
    }

    /// The chain shipped with this binary.
    pub fn builtin() -> Result<Self, ChainError> {
        Self::new(
            OLDEST_SUPPORTED_VERSION,
            crate::db::latest_version(),
            vec![
                MigrationStep {
                    from: 1,
                    name: "rename_positions",
                    transform: rename_positions,
                },
                MigrationStep {
                    from: 2,
                    name: "structured_annotations",
                    transform: structured_annotations,
                },
            ],
        )
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn oldest(&self) -> u32 {
        self.oldest
    }

    /// Upgrades `doc` from version `from` to the current version.
    pub fn upgrade(&self, doc: Value, from: u32) -> Result<Value, ImportError> {
        self.upgrade_range(doc, from, self.current)
    }

    /// Applies the steps that lead from `from` to `to`.
    ///
    /// # Errors
    /// - `IncompatibleVersion` when `from` is newer than current or older
    ///   than the oldest supported version.
    /// - `CorruptDocument` when a step rejects the document shape.
    pub fn upgrade_range(&self, mut doc: Value, from: u32, to: u32) -> Result<Value, ImportError> {
        if from > self.current || from < self.oldest {
            return Err(ImportError::IncompatibleVersion {
                required: from,
                available: self.current,
            });
        }
        let to = to.clamp(from, self.current);
        for step in self.steps.iter().filter(|step| step.from >= from && step.from < to) {
            doc = (step.transform)(doc)?;
            let object = as_object_mut(&mut doc, "document")?;
            object.insert("migration_version".to_string(), Value::from(step.from + 1));
            debug!(
                "event=document_migrate module=serializer status=ok step={} from_version={} to_version={}",
                step.name,
                step.from,
                step.from + 1
            );
        }
        Ok(doc)
    }
}

/// Checks that the shipped chain is connected.
pub fn validate_builtin_chain() -> Result<(), ChainError> {
    MigrationChain::builtin().map(|_| ())
}

/// v1 → v2: positional and text columns get their current names and
/// sentence display orders (1-based in legacy stores) become 0-based ranks.
fn rename_positions(mut doc: Value) -> Result<Value, TransformError> {
    let sentences = sentences_mut(&mut doc)?;
    for sentence in sentences.iter_mut() {
        let sentence = as_object_mut(sentence, "sentence")?;
        rename_key(sentence, "display_order", "position");
        rename_key(sentence, "text_oe", "text");
        rename_key(sentence, "text_modern", "translation");

        for token in array_mut(sentence, "tokens")? {
            let token = as_object_mut(token, "token")?;
            rename_key(token, "order_index", "position");
            rename_key(token, "surface", "text");
            if let Some(Value::Object(annotation)) = token.get_mut("annotation") {
                rename_key(annotation, "alternatives_json", "alternatives");
            }
        }
        for note in array_mut(sentence, "notes")? {
            let note = as_object_mut(note, "note")?;
            rename_key(note, "start_token", "start");
            rename_key(note, "end_token", "end");
            rename_key(note, "note_text_md", "text");
        }
    }
    rank_sentence_positions(sentences);
    Ok(doc)
}

/// Replaces distinct sentence positions by their rank. Duplicate or missing
/// positions are left for structural validation to reject.
fn rank_sentence_positions(sentences: &mut [Value]) {
    let mut order = Vec::with_capacity(sentences.len());
    for (index, sentence) in sentences.iter().enumerate() {
        let Some(position) = sentence.get("position").and_then(Value::as_u64) else {
            return;
        };
        order.push((position, index));
    }
    order.sort_unstable();
    if order.windows(2).any(|pair| pair[0].0 == pair[1].0) {
        return;
    }
    for (rank, (_, index)) in order.into_iter().enumerate() {
        if let Some(sentence) = sentences[index].as_object_mut() {
            sentence.insert("position".to_string(), Value::from(rank));
        }
    }
}

/// Legacy flat annotation columns: `(column, owning part of speech, field
/// key)`. Shared columns have no owner and apply to any part of speech that
/// defines the key.
const LEGACY_FIELD_KEYS: &[(&str, Option<PartOfSpeech>, &str)] = &[
    ("gender", None, "gender"),
    ("number", None, "number"),
    ("case", None, "case"),
    ("declension", None, "declension"),
    ("verb_class", Some(PartOfSpeech::Verb), "verb_class"),
    ("verb_tense", Some(PartOfSpeech::Verb), "tense"),
    ("verb_mood", Some(PartOfSpeech::Verb), "mood"),
    ("verb_person", Some(PartOfSpeech::Verb), "person"),
    ("verb_number", Some(PartOfSpeech::Verb), "number"),
    ("verb_aspect", Some(PartOfSpeech::Verb), "aspect"),
    ("verb_form", Some(PartOfSpeech::Verb), "form"),
    ("adjective_degree", Some(PartOfSpeech::Adjective), "degree"),
    ("adjective_inflection", Some(PartOfSpeech::Adjective), "inflection"),
    ("adjective_gender", Some(PartOfSpeech::Adjective), "gender"),
    ("adjective_number", Some(PartOfSpeech::Adjective), "number"),
    ("adjective_case", Some(PartOfSpeech::Adjective), "case"),
    ("pronoun_type", Some(PartOfSpeech::Pronoun), "pronoun_type"),
    ("pronoun_gender", Some(PartOfSpeech::Pronoun), "gender"),
    ("pronoun_number", Some(PartOfSpeech::Pronoun), "number"),
    ("pronoun_case", Some(PartOfSpeech::Pronoun), "case"),
    ("article_type", Some(PartOfSpeech::Article), "article_type"),
    ("article_gender", Some(PartOfSpeech::Article), "gender"),
    ("article_number", Some(PartOfSpeech::Article), "number"),
    ("article_case", Some(PartOfSpeech::Article), "case"),
    ("adverb_degree", Some(PartOfSpeech::Adverb), "degree"),
    ("conjunction_type", Some(PartOfSpeech::Conjunction), "conj_type"),
    ("prep_case", Some(PartOfSpeech::Preposition), "prep_case"),
    ("interjection_type", Some(PartOfSpeech::Interjection), "interjection_type"),
];

/// v2 → v3: flat annotations become `{pos, fields, ...}`, the gloss gets its
/// current name and notes without a number are numbered in reading order.
fn structured_annotations(mut doc: Value) -> Result<Value, TransformError> {
    for sentence in sentences_mut(&mut doc)? {
        let sentence = as_object_mut(sentence, "sentence")?;
        for token in array_mut(sentence, "tokens")? {
            let token = as_object_mut(token, "token")?;
            let restructured = match token.remove("annotation") {
                None | Some(Value::Null) => Value::Null,
                Some(Value::Object(flat)) => restructure_annotation(flat)?,
                Some(other) => {
                    return Err(TransformError(format!(
                        "annotation must be an object or null, found {other}"
                    )))
                }
            };
            token.insert("annotation".to_string(), restructured);
        }
        number_notes(array_mut(sentence, "notes")?)?;
    }
    Ok(doc)
}

fn restructure_annotation(mut flat: Map<String, Value>) -> Result<Value, TransformError> {
    let pos = match flat.remove("pos") {
        None | Some(Value::Null) => None,
        Some(Value::String(code)) => Some(
            PartOfSpeech::parse(&code)
                .ok_or_else(|| TransformError(format!("unknown part of speech `{code}`")))?,
        ),
        Some(other) => {
            return Err(TransformError(format!(
                "part of speech must be a string, found {other}"
            )))
        }
    };

    // Shared columns first so a column owned by the chosen part of speech
    // overrides them. Columns owned by another part of speech are dropped.
    let mut fields = Map::new();
    let (shared, owned): (Vec<_>, Vec<_>) = LEGACY_FIELD_KEYS
        .iter()
        .partition(|(_, owner, _)| owner.is_none());
    for (legacy, owner, key) in shared.into_iter().chain(owned) {
        let Some(value) = flat.remove(legacy).and_then(scalar_to_string) else {
            continue;
        };
        let applies = match (pos, owner) {
            (Some(pos), None) => pos.accepts_field(key),
            (Some(pos), Some(owner)) => pos == owner,
            (None, _) => false,
        };
        if applies {
            fields.insert((*key).to_string(), Value::String(value));
        }
    }

    let mut structured = Map::new();
    structured.insert(
        "pos".to_string(),
        pos.map_or(Value::Null, |pos| Value::String(pos.as_str().to_string())),
    );
    structured.insert("fields".to_string(), Value::Object(fields));
    structured.insert(
        "uncertain".to_string(),
        flat.remove("uncertain").unwrap_or(Value::Bool(false)),
    );
    structured.insert(
        "alternatives".to_string(),
        flat.remove("alternatives").unwrap_or(Value::Null),
    );
    structured.insert(
        "confidence".to_string(),
        flat.remove("confidence").unwrap_or(Value::Null),
    );
    structured.insert(
        "todo".to_string(),
        flat.remove("todo").unwrap_or(Value::Bool(false)),
    );
    structured.insert(
        "gloss".to_string(),
        flat.remove("modern_english_meaning")
            .or_else(|| flat.remove("gloss"))
            .unwrap_or(Value::Null),
    );
    structured.insert(
        "root".to_string(),
        flat.remove("root").unwrap_or(Value::Null),
    );
    Ok(Value::Object(structured))
}

fn number_notes(notes: &mut [Value]) -> Result<(), TransformError> {
    let needs_numbers = notes
        .iter()
        .any(|note| note.get("number").map_or(true, Value::is_null));
    if !needs_numbers {
        return Ok(());
    }

    let mut order = Vec::with_capacity(notes.len());
    for (index, note) in notes.iter().enumerate() {
        let start = note
            .get("start")
            .and_then(Value::as_u64)
            .ok_or_else(|| TransformError("note start must be a non-negative integer".into()))?;
        order.push((start, index));
    }
    order.sort_unstable();
    for (number, (_, index)) in order.into_iter().enumerate() {
        let note = as_object_mut(&mut notes[index], "note")?;
        note.insert("number".to_string(), Value::from(number + 1));
    }
    Ok(())
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn rename_key(object: &mut Map<String, Value>, from: &str, to: &str) {
    if object.contains_key(to) {
        return;
    }
    if let Some(value) = object.remove(from) {
        object.insert(to.to_string(), value);
    }
}

fn as_object_mut<'a>(
    value: &'a mut Value,
    what: &str,
) -> Result<&'a mut Map<String, Value>, TransformError> {
    value
        .as_object_mut()
        .ok_or_else(|| TransformError(format!("{what} must be an object")))
}

fn sentences_mut(doc: &mut Value) -> Result<&mut Vec<Value>, TransformError> {
    array_mut(as_object_mut(doc, "document")?, "sentences")
}

fn array_mut<'a>(
    object: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Vec<Value>, TransformError> {
    object
        .get_mut(key)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| TransformError(format!("missing array `{key}`")))
}

#[cfg(test)]
mod tests {
    use super::{MigrationChain, MigrationStep, TransformError};
    use serde_json::{json, Value};

    fn identity(doc: Value) -> Result<Value, TransformError> {
        Ok(doc)
    }

    #[test]
    fn builtin_chain_is_connected() {
        let chain = MigrationChain::builtin().unwrap();
        assert_eq!(chain.oldest(), 1);
        assert_eq!(chain.current(), crate::db::latest_version());
    }

    #[test]
    fn chain_with_gap_is_rejected() {
        let steps = vec![MigrationStep {
            from: 2,
            name: "skip",
            transform: identity,
        }];
        assert!(MigrationChain::new(1, 3, steps).is_err());
    }

    #[test]
    fn flat_annotation_is_restructured() {
        let v2 = json!({
            "export_version": 1,
            "migration_version": 2,
            "project": {"name": "p", "created_at": "2024-01-01T00:00:00Z"},
            "sentences": [{
                "position": 0,
                "text": "he cwæþ",
                "translation": "",
                "tokens": [
                    {"position": 0, "text": "he", "annotation": null},
                    {"position": 1, "text": "cwæþ", "annotation": {
                        "pos": "V",
                        "verb_tense": "p",
                        "verb_person": 3,
                        "gender": null,
                        "case": "n",
                        "modern_english_meaning": "said",
                        "last_inferred_json": "{}"
                    }}
                ],
                "notes": [
                    {"start": 1, "end": 1, "text": "b"},
                    {"start": 0, "end": 0, "text": "a"}
                ]
            }]
        });
        let v3 = MigrationChain::builtin().unwrap().upgrade(v2, 2).unwrap();
        assert_eq!(v3["migration_version"], 3);
        let annotation = &v3["sentences"][0]["tokens"][1]["annotation"];
        assert_eq!(annotation["pos"], "verb");
        assert_eq!(annotation["fields"], json!({"tense": "p", "person": "3"}));
        assert_eq!(annotation["gloss"], "said");
        assert_eq!(annotation["todo"], false);
        assert!(annotation.get("last_inferred_json").is_none());
        let notes = &v3["sentences"][0]["notes"];
        assert_eq!((notes[0]["number"].clone(), notes[1]["number"].clone()), (json!(2), json!(1)));
    }

    fn v2_with_annotation(annotation: Value) -> Value {
        json!({
            "export_version": 1,
            "migration_version": 2,
            "project": {"name": "p", "created_at": "2024-01-01T00:00:00Z"},
            "sentences": [{
                "position": 0,
                "text": "cyning",
                "translation": "",
                "tokens": [{"position": 0, "text": "cyning", "annotation": annotation}],
                "notes": []
            }]
        })
    }

    #[test]
    fn stale_columns_of_other_pos_do_not_override_shared_ones() {
        let v2 = v2_with_annotation(json!({
            "pos": "N",
            "gender": "m",
            "case": "n",
            "adjective_gender": "f",
            "adjective_case": "d",
            "verb_number": "p"
        }));
        let v3 = MigrationChain::builtin().unwrap().upgrade(v2, 2).unwrap();
        let annotation = &v3["sentences"][0]["tokens"][0]["annotation"];
        assert_eq!(annotation["fields"], json!({"gender": "m", "case": "n"}));
    }

    #[test]
    fn owned_columns_override_shared_ones_for_their_pos() {
        let v2 = v2_with_annotation(json!({
            "pos": "A",
            "gender": "m",
            "number": "s",
            "adjective_gender": "f",
            "pronoun_case": "g"
        }));
        let v3 = MigrationChain::builtin().unwrap().upgrade(v2, 2).unwrap();
        let annotation = &v3["sentences"][0]["tokens"][0]["annotation"];
        assert_eq!(annotation["fields"], json!({"gender": "f", "number": "s"}));
    }
}
