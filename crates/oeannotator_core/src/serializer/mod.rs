//! Project export/import documents.
//!
//! # Responsibility
//! - Convert an in-memory project to a versioned, self-describing document.
//! - Convert a document of any supported version back into a project,
//!   upgrading older documents through the migration chain.
//!
//! # Invariants
//! - Import never touches storage; it either yields a complete, validated
//!   project or an error.
//! - `import(export(p))` is content-equal to `p` (identifiers aside).
//! - Unknown keys in a current-version document are rejected.
//!
//! # See also
//! - crate::service::transfer

pub mod migrate;

use crate::db::latest_version;
use crate::model::annotation::{clamp_confidence, Annotation, PartOfSpeech, PosFields};
use crate::model::project::{Note, Project, Sentence, Token};
use crate::ranges::{renumber, validate_range};
use chrono::{DateTime, Utc};
use log::info;
use migrate::{ChainError, MigrationChain, TransformError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Layout version of the document envelope itself.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

pub type ImportResult<T> = Result<T, ImportError>;

#[derive(Debug)]
pub enum ImportError {
    /// No transform chain reaches the current version from `required`.
    IncompatibleVersion { required: u32, available: u32 },
    /// Malformed JSON, missing keys or structurally invalid content.
    CorruptDocument(String),
    BrokenChain(ChainError),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncompatibleVersion {
                required,
                available,
            } => write!(
                f,
                "document version {required} cannot be imported, this build supports up to {available}"
            ),
            Self::CorruptDocument(message) => write!(f, "corrupt document: {message}"),
            Self::BrokenChain(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::BrokenChain(err) => Some(err),
            Self::IncompatibleVersion { .. } | Self::CorruptDocument(_) => None,
        }
    }
}

impl From<TransformError> for ImportError {
    fn from(value: TransformError) -> Self {
        Self::CorruptDocument(value.0)
    }
}

impl From<ChainError> for ImportError {
    fn from(value: ChainError) -> Self {
        Self::BrokenChain(value)
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(value: serde_json::Error) -> Self {
        Self::CorruptDocument(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectDocument {
    pub export_version: u32,
    pub migration_version: u32,
    pub project: ProjectHeader,
    pub sentences: Vec<SentenceDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectHeader {
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SentenceDocument {
    pub position: usize,
    pub text: String,
    #[serde(default)]
    pub translation: String,
    pub tokens: Vec<TokenDocument>,
    #[serde(default)]
    pub notes: Vec<NoteDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenDocument {
    pub position: usize,
    pub text: String,
    pub annotation: Option<AnnotationDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotationDocument {
    #[serde(default)]
    pub pos: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub uncertain: bool,
    #[serde(default)]
    pub alternatives: Option<String>,
    #[serde(default)]
    pub confidence: Option<i64>,
    #[serde(default)]
    pub todo: bool,
    #[serde(default)]
    pub gloss: Option<String>,
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoteDocument {
    pub number: u32,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A decoded project plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedProject {
    /// Fresh project with a newly generated id.
    pub project: Project,
    /// Version the document was written at.
    pub source_version: u32,
}

impl ImportedProject {
    pub fn was_migrated(&self) -> bool {
        self.source_version != latest_version()
    }
}

/// Builds the export document for `project`.
///
/// `migration_version` is the schema version of the store the project was
/// read from.
pub fn export_project(project: &Project, migration_version: u32) -> ProjectDocument {
    ProjectDocument {
        export_version: EXPORT_FORMAT_VERSION,
        migration_version,
        project: ProjectHeader {
            name: project.name.clone(),
            created_at: project.created_at,
            updated_at: Some(project.updated_at),
        },
        sentences: project.sentences.iter().map(export_sentence).collect(),
    }
}

fn export_sentence(sentence: &Sentence) -> SentenceDocument {
    SentenceDocument {
        position: sentence.position,
        text: sentence.text.clone(),
        translation: sentence.translation.clone(),
        tokens: sentence
            .tokens
            .iter()
            .map(|token| TokenDocument {
                position: token.position,
                text: token.text.clone(),
                annotation: (!token.annotation.is_empty())
                    .then(|| export_annotation(&token.annotation)),
            })
            .collect(),
        notes: sentence
            .notes
            .iter()
            .map(|note| NoteDocument {
                number: note.number,
                start: note.start,
                end: note.end,
                text: note.text.clone(),
            })
            .collect(),
    }
}

fn export_annotation(annotation: &Annotation) -> AnnotationDocument {
    AnnotationDocument {
        pos: annotation.pos().map(|pos| pos.as_str().to_string()),
        fields: annotation
            .fields
            .as_ref()
            .map(PosFields::to_map)
            .unwrap_or_default(),
        uncertain: annotation.uncertain,
        alternatives: annotation.alternatives.clone(),
        confidence: annotation.confidence.map(i64::from),
        todo: annotation.todo,
        gloss: annotation.gloss.clone(),
        root: annotation.root.clone(),
    }
}

/// Serializes a document as pretty-printed JSON.
pub fn to_json_string(document: &ProjectDocument) -> ImportResult<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Parses document text without interpreting it.
pub fn parse_document(text: &str) -> ImportResult<Value> {
    Ok(serde_json::from_str(text)?)
}

/// Decodes a document of any supported version into a project.
///
/// Order: version gate, transform chain, typed decode, structural checks.
///
/// # Errors
/// - `IncompatibleVersion` for documents newer than this build or older than
///   the oldest supported version; nothing is decoded.
/// - `CorruptDocument` for malformed or structurally invalid content.
pub fn import_document(document: Value) -> ImportResult<ImportedProject> {
    let export_version = read_version(&document, "export_version")?;
    if export_version > EXPORT_FORMAT_VERSION {
        return Err(ImportError::IncompatibleVersion {
            required: export_version,
            available: EXPORT_FORMAT_VERSION,
        });
    }
    let source_version = read_version(&document, "migration_version")?;

    let chain = MigrationChain::builtin()?;
    let upgraded = chain.upgrade(document, source_version)?;
    let decoded: ProjectDocument = serde_json::from_value(upgraded)?;
    let project = decode_project(decoded)?;

    info!(
        "event=document_import module=serializer status=ok source_version={} sentences={} tokens={}",
        source_version,
        project.sentences.len(),
        project.token_count()
    );
    Ok(ImportedProject {
        project,
        source_version,
    })
}

fn read_version(document: &Value, key: &str) -> ImportResult<u32> {
    let raw = document
        .get(key)
        .ok_or_else(|| ImportError::CorruptDocument(format!("missing `{key}`")))?;
    raw.as_u64()
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| ImportError::CorruptDocument(format!("`{key}` must be an integer")))
}

fn decode_project(document: ProjectDocument) -> ImportResult<Project> {
    let mut sentences = document
        .sentences
        .into_iter()
        .map(decode_sentence)
        .collect::<ImportResult<Vec<_>>>()?;
    sentences.sort_by_key(|sentence| sentence.position);
    if let Some((index, sentence)) = sentences
        .iter()
        .enumerate()
        .find(|(index, sentence)| sentence.position != *index)
    {
        return Err(ImportError::CorruptDocument(format!(
            "sentence positions are not dense at {index} (found {})",
            sentence.position
        )));
    }

    let created_at = document.project.created_at;
    Ok(Project {
        id: Uuid::new_v4(),
        name: document.project.name,
        created_at,
        updated_at: document.project.updated_at.unwrap_or(created_at),
        sentences,
    })
}

fn decode_sentence(document: SentenceDocument) -> ImportResult<Sentence> {
    let position = document.position;
    let mut token_documents = document.tokens;
    token_documents.sort_by_key(|token| token.position);
    let tokens = token_documents
        .into_iter()
        .enumerate()
        .map(|(index, token)| {
            if token.position != index {
                return Err(ImportError::CorruptDocument(format!(
                    "token positions in sentence {position} are not dense at {index}"
                )));
            }
            Ok(Token {
                position: index,
                text: token.text,
                annotation: match token.annotation {
                    Some(annotation) => decode_annotation(annotation)?,
                    None => Annotation::empty(),
                },
            })
        })
        .collect::<ImportResult<Vec<_>>>()?;

    let mut note_documents = document.notes;
    note_documents.sort_by_key(|note| note.number);
    let mut numbers = BTreeSet::new();
    let mut notes = Vec::with_capacity(note_documents.len());
    for (index, note) in note_documents.into_iter().enumerate() {
        if !numbers.insert(note.number) {
            return Err(ImportError::CorruptDocument(format!(
                "duplicate note number {} in sentence {position}",
                note.number
            )));
        }
        let range = validate_range(note.start, note.end, tokens.len()).map_err(|err| {
            ImportError::CorruptDocument(format!("sentence {position}: {err}"))
        })?;
        notes.push(Note {
            id: index as u64 + 1,
            number: note.number,
            start: range.start,
            end: range.end,
            text: note.text,
        });
    }
    renumber(&mut notes);

    Ok(Sentence {
        position,
        text: document.text,
        translation: document.translation,
        tokens,
        next_note_id: notes.len() as u64 + 1,
        notes,
    })
}

fn decode_annotation(document: AnnotationDocument) -> ImportResult<Annotation> {
    let fields = match document.pos.as_deref() {
        Some(name) => {
            let pos = PartOfSpeech::parse(name).ok_or_else(|| {
                ImportError::CorruptDocument(format!("unknown part of speech `{name}`"))
            })?;
            Some(
                PosFields::from_map(pos, &document.fields)
                    .map_err(|err| ImportError::CorruptDocument(err.to_string()))?,
            )
        }
        None if document.fields.is_empty() => None,
        None => {
            return Err(ImportError::CorruptDocument(
                "annotation fields given without a part of speech".to_string(),
            ))
        }
    };

    Ok(Annotation {
        fields,
        uncertain: document.uncertain,
        alternatives: document.alternatives,
        confidence: document.confidence.map(clamp_confidence),
        todo: document.todo,
        gloss: document.gloss,
        root: document.root,
    })
}
