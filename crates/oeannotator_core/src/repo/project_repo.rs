//! Project repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist whole projects (sentences, tokens, annotations, notes).
//! - Resolve import name collisions inside the inserting transaction.
//!
//! # Invariants
//! - Every multi-row write runs in one IMMEDIATE transaction; a partially
//!   written project is never visible to readers.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Project names are unique.

use crate::db::{latest_version, schema_version, DbError};
use crate::model::annotation::{Annotation, PartOfSpeech, PosFields};
use crate::model::project::{Note, Project, ProjectId, Sentence, Token};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for project persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(ProjectId),
    NameTaken(String),
    /// Connection schema does not match this binary; open it through `db`.
    SchemaNotReady { found: u32, expected: u32 },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "project not found: {id}"),
            Self::NameTaken(name) => write!(f, "project name already exists: {name}"),
            Self::SchemaNotReady { found, expected } => write!(
                f,
                "connection schema version {found} does not match expected {expected}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted project data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_)
            | Self::NameTaken(_)
            | Self::SchemaNotReady { .. }
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// List row for project pickers and backup metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    pub token_count: u64,
}

/// Result of inserting an imported project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedProject {
    pub id: ProjectId,
    /// Final stored name, possibly suffixed with ` (n)`.
    pub name: String,
    pub renamed: bool,
}

/// Repository interface for project persistence.
pub trait ProjectRepository {
    /// Creates a project from raw text, splitting it into sentences and tokens.
    fn create_project(&mut self, name: &str, text: &str) -> RepoResult<Project>;
    /// Replaces the stored content of an existing project.
    fn save_project(&mut self, project: &Project) -> RepoResult<()>;
    fn load_project(&self, id: ProjectId) -> RepoResult<Option<Project>>;
    /// Lists projects sorted by name.
    fn list_projects(&self) -> RepoResult<Vec<ProjectSummary>>;
    fn delete_project(&mut self, id: ProjectId) -> RepoResult<()>;
    fn project_names(&self) -> RepoResult<Vec<String>>;
    fn find_project_by_name(&self, name: &str) -> RepoResult<Option<ProjectId>>;
    /// Inserts `project` under a collision-free name.
    ///
    /// The name check and the insert share one IMMEDIATE transaction, so two
    /// concurrent imports of the same name never receive the same suffix.
    fn insert_imported(&mut self, project: &Project) -> RepoResult<InsertedProject>;
}

/// SQLite-backed project repository.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        let found = schema_version(conn)?;
        let expected = latest_version();
        if found != expected {
            return Err(RepoError::SchemaNotReady { found, expected });
        }
        Ok(Self { conn })
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(&mut self, name: &str, text: &str) -> RepoResult<Project> {
        let project = Project::from_text(name, text);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if find_by_name(&tx, name)?.is_some() {
            return Err(RepoError::NameTaken(name.to_string()));
        }
        insert_project_row(&tx, &project, &project.name)?;
        insert_sentences(&tx, &project)?;
        tx.commit()?;

        info!(
            "event=project_create module=repo status=ok project_id={} sentences={} tokens={}",
            project.id,
            project.sentences.len(),
            project.token_count()
        );
        Ok(project)
    }

    fn save_project(&mut self, project: &Project) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE projects SET name = ?2, updated_at = ?3 WHERE id = ?1;",
            params![
                project.id.to_string(),
                project.name.as_str(),
                format_timestamp(&project.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(project.id));
        }
        tx.execute(
            "DELETE FROM sentences WHERE project_id = ?1;",
            [project.id.to_string()],
        )?;
        insert_sentences(&tx, project)?;
        tx.commit()?;
        Ok(())
    }

    fn load_project(&self, id: ProjectId) -> RepoResult<Option<Project>> {
        let header = self
            .conn
            .query_row(
                "SELECT name, created_at, updated_at FROM projects WHERE id = ?1;",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((name, created_at, updated_at)) = header else {
            return Ok(None);
        };

        Ok(Some(Project {
            id,
            name,
            created_at: parse_timestamp(&created_at, "projects.created_at")?,
            updated_at: parse_timestamp(&updated_at, "projects.updated_at")?,
            sentences: load_sentences(self.conn, id)?,
        }))
    }

    fn list_projects(&self) -> RepoResult<Vec<ProjectSummary>> {
        list_project_summaries(self.conn)
    }

    fn delete_project(&mut self, id: ProjectId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        info!("event=project_delete module=repo status=ok project_id={id}");
        Ok(())
    }

    fn project_names(&self) -> RepoResult<Vec<String>> {
        Ok(all_names(self.conn)?.into_iter().collect())
    }

    fn find_project_by_name(&self, name: &str) -> RepoResult<Option<ProjectId>> {
        find_by_name(self.conn, name)
    }

    fn insert_imported(&mut self, project: &Project) -> RepoResult<InsertedProject> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = all_names(&tx)?;
        let name = unique_name(&project.name, &existing);
        insert_project_row(&tx, project, &name)?;
        insert_sentences(&tx, project)?;
        tx.commit()?;

        Ok(InsertedProject {
            id: project.id,
            renamed: name != project.name,
            name,
        })
    }
}

/// Returns `base` if unused, else `base (n)` with the lowest free `n >= 1`.
pub fn unique_name(base: &str, existing: &BTreeSet<String>) -> String {
    if !existing.contains(base) {
        return base.to_string();
    }
    (1u64..)
        .map(|n| format!("{base} ({n})"))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Reads project summaries with token counts.
///
/// Only touches columns present in every store schema version, so it also
/// works on a store that is about to be migrated.
pub fn list_project_summaries(conn: &Connection) -> RepoResult<Vec<ProjectSummary>> {
    let mut stmt = conn.prepare(
        "SELECT
            p.id,
            p.name,
            p.updated_at,
            (SELECT COUNT(*)
             FROM tokens t
             JOIN sentences s ON s.id = t.sentence_id
             WHERE s.project_id = p.id) AS token_count
         FROM projects p
         ORDER BY p.name;",
    )?;
    let mut rows = stmt.query([])?;
    let mut summaries = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get("id")?;
        let updated_at: String = row.get("updated_at")?;
        summaries.push(ProjectSummary {
            id: parse_uuid(&id_text)?,
            name: row.get("name")?,
            updated_at: parse_timestamp(&updated_at, "projects.updated_at")?,
            token_count: u64::try_from(row.get::<_, i64>("token_count")?).unwrap_or(0),
        });
    }
    Ok(summaries)
}

fn all_names(conn: &Connection) -> RepoResult<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM projects;")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(names)
}

fn find_by_name(conn: &Connection, name: &str) -> RepoResult<Option<ProjectId>> {
    let id_text = conn
        .query_row(
            "SELECT id FROM projects WHERE name = ?1;",
            [name],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    id_text.as_deref().map(parse_uuid).transpose()
}

fn insert_project_row(tx: &Transaction<'_>, project: &Project, name: &str) -> RepoResult<()> {
    tx.execute(
        "INSERT INTO projects (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4);",
        params![
            project.id.to_string(),
            name,
            format_timestamp(&project.created_at),
            format_timestamp(&project.updated_at),
        ],
    )?;
    Ok(())
}

fn insert_sentences(tx: &Transaction<'_>, project: &Project) -> RepoResult<()> {
    let project_id = project.id.to_string();
    let mut sentence_stmt = tx.prepare(
        "INSERT INTO sentences (project_id, position, text, translation) VALUES (?1, ?2, ?3, ?4);",
    )?;
    let mut token_stmt =
        tx.prepare("INSERT INTO tokens (sentence_id, position, text) VALUES (?1, ?2, ?3);")?;
    let mut annotation_stmt = tx.prepare(
        "INSERT INTO annotations (
            token_id,
            pos,
            fields_json,
            uncertain,
            alternatives,
            confidence,
            gloss,
            root,
            todo
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
    )?;
    let mut note_stmt = tx.prepare(
        "INSERT INTO notes (
            sentence_id,
            created_seq,
            number,
            start_position,
            end_position,
            body
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
    )?;

    for sentence in &project.sentences {
        sentence_stmt.execute(params![
            project_id.as_str(),
            to_db_index(sentence.position)?,
            sentence.text.as_str(),
            sentence.translation.as_str(),
        ])?;
        let sentence_id = tx.last_insert_rowid();

        for token in &sentence.tokens {
            token_stmt.execute(params![
                sentence_id,
                to_db_index(token.position)?,
                token.text.as_str()
            ])?;
            if token.annotation.is_empty() {
                continue;
            }
            let token_id = tx.last_insert_rowid();
            let annotation = &token.annotation;
            let fields_json = serde_json::to_string(
                &annotation
                    .fields
                    .as_ref()
                    .map(PosFields::to_map)
                    .unwrap_or_default(),
            )
            .map_err(|err| RepoError::InvalidData(format!("annotation fields: {err}")))?;
            annotation_stmt.execute(params![
                token_id,
                annotation.pos().map(PartOfSpeech::as_str),
                fields_json,
                bool_to_int(annotation.uncertain),
                annotation.alternatives.as_deref(),
                annotation.confidence,
                annotation.gloss.as_deref(),
                annotation.root.as_deref(),
                bool_to_int(annotation.todo),
            ])?;
        }

        for note in &sentence.notes {
            note_stmt.execute(params![
                sentence_id,
                i64::try_from(note.id).map_err(|_| {
                    RepoError::InvalidData(format!("note id {} out of range", note.id))
                })?,
                note.number,
                to_db_index(note.start)?,
                to_db_index(note.end)?,
                note.text.as_str(),
            ])?;
        }
    }
    Ok(())
}

fn load_sentences(conn: &Connection, project_id: ProjectId) -> RepoResult<Vec<Sentence>> {
    let mut stmt = conn.prepare(
        "SELECT id, position, text, translation
         FROM sentences
         WHERE project_id = ?1
         ORDER BY position;",
    )?;
    let mut rows = stmt.query([project_id.to_string()])?;
    let mut sentences = Vec::new();
    while let Some(row) = rows.next()? {
        let sentence_id: i64 = row.get("id")?;
        let tokens = load_tokens(conn, sentence_id)?;
        let notes = load_notes(conn, sentence_id)?;
        let next_note_id = notes.iter().map(|note| note.id).max().unwrap_or(0) + 1;
        sentences.push(Sentence {
            position: from_db_index(row.get("position")?, "sentences.position")?,
            text: row.get("text")?,
            translation: row.get("translation")?,
            tokens,
            notes,
            next_note_id,
        });
    }
    Ok(sentences)
}

fn load_tokens(conn: &Connection, sentence_id: i64) -> RepoResult<Vec<Token>> {
    let mut stmt = conn.prepare(
        "SELECT
            t.position,
            t.text,
            a.token_id AS annotated,
            a.pos,
            a.fields_json,
            a.uncertain,
            a.alternatives,
            a.confidence,
            a.gloss,
            a.root,
            a.todo
         FROM tokens t
         LEFT JOIN annotations a ON a.token_id = t.id
         WHERE t.sentence_id = ?1
         ORDER BY t.position;",
    )?;
    let mut rows = stmt.query([sentence_id])?;
    let mut tokens = Vec::new();
    while let Some(row) = rows.next()? {
        let position = from_db_index(row.get("position")?, "tokens.position")?;
        if position != tokens.len() {
            return Err(RepoError::InvalidData(format!(
                "token positions are not dense in sentence {sentence_id}"
            )));
        }
        let annotation = match row.get::<_, Option<i64>>("annotated")? {
            Some(_) => parse_annotation_row(row)?,
            None => Annotation::empty(),
        };
        tokens.push(Token {
            position,
            text: row.get("text")?,
            annotation,
        });
    }
    Ok(tokens)
}

fn parse_annotation_row(row: &Row<'_>) -> RepoResult<Annotation> {
    let fields = match row.get::<_, Option<String>>("pos")? {
        Some(pos_text) => {
            let pos = PartOfSpeech::parse(&pos_text).ok_or_else(|| {
                RepoError::InvalidData(format!("invalid pos `{pos_text}` in annotations.pos"))
            })?;
            let fields_json: String = row.get("fields_json")?;
            let values: BTreeMap<String, String> = serde_json::from_str(&fields_json)
                .map_err(|err| {
                    RepoError::InvalidData(format!("invalid annotations.fields_json: {err}"))
                })?;
            Some(
                PosFields::from_map(pos, &values)
                    .map_err(|err| RepoError::InvalidData(err.to_string()))?,
            )
        }
        None => None,
    };

    let confidence = match row.get::<_, Option<i64>>("confidence")? {
        Some(value) => Some(u8::try_from(value).ok().filter(|v| *v <= 100).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid confidence `{value}` in annotations.confidence"
            ))
        })?),
        None => None,
    };

    Ok(Annotation {
        fields,
        uncertain: int_to_bool(row.get("uncertain")?, "annotations.uncertain")?,
        alternatives: row.get("alternatives")?,
        confidence,
        todo: int_to_bool(row.get("todo")?, "annotations.todo")?,
        gloss: row.get("gloss")?,
        root: row.get("root")?,
    })
}

fn load_notes(conn: &Connection, sentence_id: i64) -> RepoResult<Vec<Note>> {
    let mut stmt = conn.prepare(
        "SELECT created_seq, number, start_position, end_position, body
         FROM notes
         WHERE sentence_id = ?1
         ORDER BY number;",
    )?;
    let mut rows = stmt.query([sentence_id])?;
    let mut notes = Vec::new();
    while let Some(row) = rows.next()? {
        let created_seq: i64 = row.get("created_seq")?;
        notes.push(Note {
            id: u64::try_from(created_seq).map_err(|_| {
                RepoError::InvalidData(format!("invalid notes.created_seq `{created_seq}`"))
            })?,
            number: row.get("number")?,
            start: from_db_index(row.get("start_position")?, "notes.start_position")?,
            end: from_db_index(row.get("end_position")?, "notes.end_position")?,
            text: row.get("body")?,
        });
    }
    Ok(notes)
}

fn parse_uuid(value: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in projects.id")))
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn parse_timestamp(value: &str, column: &str) -> RepoResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| RepoError::InvalidData(format!("invalid timestamp `{value}` in {column}")))
}

fn to_db_index(value: usize) -> RepoResult<i64> {
    i64::try_from(value).map_err(|_| RepoError::InvalidData(format!("index {value} out of range")))
}

fn from_db_index(value: i64, column: &str) -> RepoResult<usize> {
    usize::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid index `{value}` in {column}")))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::unique_name;
    use std::collections::BTreeSet;

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn unique_name_keeps_unused_name() {
        assert_eq!(unique_name("Beowulf", &names(&["Judith"])), "Beowulf");
    }

    #[test]
    fn unique_name_picks_lowest_free_suffix() {
        let existing = names(&["Beowulf", "Beowulf (1)", "Beowulf (3)"]);
        assert_eq!(unique_name("Beowulf", &existing), "Beowulf (2)");
    }
}
