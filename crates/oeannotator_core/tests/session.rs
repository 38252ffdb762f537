use oeannotator_core::backup::BackupScheduler;
use oeannotator_core::db::{open_db, open_db_in_memory};
use oeannotator_core::repo::{ProjectRepository, SqliteProjectRepository};
use oeannotator_core::settings::Settings;
use oeannotator_core::{
    AnnotationInput, EditingSession, InvalidRangeError, PartOfSpeech, PosFilter, Project,
    ProjectId, SessionError, TokenFilter,
};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TEXT: &str = "Hwæt we Gardena in geardagum þeodcyninga þrym gefrunon.";

fn settings(debounce_ms: u64) -> Settings {
    Settings {
        autosave_debounce_ms: debounce_ms,
        ..Settings::default()
    }
}

fn seeded() -> (Arc<Mutex<Connection>>, ProjectId) {
    seeded_with(TEXT)
}

fn seeded_with(text: &str) -> (Arc<Mutex<Connection>>, ProjectId) {
    let mut conn = open_db_in_memory().unwrap();
    let project = SqliteProjectRepository::try_new(&mut conn)
        .unwrap()
        .create_project("Beowulf", text)
        .unwrap();
    (Arc::new(Mutex::new(conn)), project.id)
}

fn stored(conn: &Arc<Mutex<Connection>>, id: ProjectId) -> Project {
    let mut guard = conn.lock();
    SqliteProjectRepository::try_new(&mut guard)
        .unwrap()
        .load_project(id)
        .unwrap()
        .unwrap()
}

#[test]
fn mutations_are_persisted_after_quiet_period() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(Arc::clone(&conn), id, &settings(50)).unwrap();

    session
        .apply_annotation(
            0,
            2,
            &AnnotationInput::new(PartOfSpeech::Noun).set("case", "gen"),
        )
        .unwrap();
    session.add_note(0, 2, 4, "spear-Danes").unwrap();
    assert!(session.has_pending_save());

    thread::sleep(Duration::from_millis(400));

    assert!(!session.has_pending_save());
    let persisted = stored(&conn, id);
    assert_eq!(
        persisted.sentences[0].tokens[2].annotation.pos(),
        Some(PartOfSpeech::Noun)
    );
    assert_eq!(persisted.sentences[0].notes.len(), 1);
    assert!(persisted.updated_at >= persisted.created_at);
}

#[test]
fn rejected_mutations_trigger_nothing() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(conn, id, &settings(10_000)).unwrap();

    let err = session.add_note(0, 5, 2, "backwards").unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidRange(InvalidRangeError::Reversed { start: 5, end: 2 })
    ));
    let err = session
        .apply_annotation(0, 0, &AnnotationInput::new(PartOfSpeech::Adverb).set("case", "x"))
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidField(_)));
    assert!(matches!(
        session.clear_annotation(3, 0),
        Err(SessionError::SentenceNotFound(3))
    ));
    assert!(matches!(
        session.clear_annotation(0, 99),
        Err(SessionError::TokenNotFound { sentence: 0, token: 99 })
    ));

    assert!(!session.has_pending_save());
    assert!(session.project().sentences[0].notes.is_empty());
}

#[test]
fn field_memory_spans_tokens_within_session() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(conn, id, &settings(10_000)).unwrap();

    session
        .apply_annotation(
            0,
            2,
            &AnnotationInput::new(PartOfSpeech::Noun)
                .set("gender", "m")
                .set("number", "pl"),
        )
        .unwrap();
    let prefilled = session
        .apply_annotation(0, 5, &AnnotationInput::new(PartOfSpeech::Noun).set("case", "gen"))
        .unwrap();

    let fields = prefilled.fields.unwrap();
    assert_eq!(fields.get("gender").unwrap(), Some("m"));
    assert_eq!(fields.get("number").unwrap(), Some("pl"));
    assert_eq!(fields.get("case").unwrap(), Some("gen"));
    assert!(session.field_memory().recall(PartOfSpeech::Noun).is_some());
}

#[test]
fn export_saves_first_and_reads_store() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(conn, id, &settings(10_000)).unwrap();

    session.update_translation(0, "Lo, we have heard").unwrap();
    let document = session.export_project().unwrap();

    assert!(!session.has_pending_save());
    assert_eq!(document.sentences[0].translation, "Lo, we have heard");
}

#[test]
fn sentence_edit_keeps_annotations_and_notes_in_step() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(Arc::clone(&conn), id, &settings(10_000)).unwrap();

    session
        .apply_annotation(0, 7, &AnnotationInput::new(PartOfSpeech::Verb).set("tense", "past"))
        .unwrap();
    let note = session.add_note(0, 5, 7, "kings' glory").unwrap();

    session
        .update_sentence_text(0, "Hwæt we Gardena in geardagum þrym gefrunon.")
        .unwrap();
    session.update_note_text(0, note.id, "glory").unwrap();
    session.close().unwrap();

    let persisted = stored(&conn, id);
    let sentence = &persisted.sentences[0];
    assert_eq!(sentence.tokens.len(), 7);
    assert_eq!(sentence.tokens[6].text, "gefrunon");
    assert_eq!(sentence.tokens[6].annotation.pos(), Some(PartOfSpeech::Verb));
    assert_eq!(sentence.notes[0].start, 5);
    assert_eq!(sentence.notes[0].end, 6);
    assert_eq!(sentence.notes[0].text, "glory");
}

#[test]
fn delete_note_renumbers_and_unknown_note_fails() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(conn, id, &settings(10_000)).unwrap();

    let first = session.add_note(0, 0, 0, "a").unwrap();
    let second = session.add_note(0, 3, 4, "b").unwrap();
    session.delete_note(0, first.id).unwrap();

    let notes = session.project().sentences[0].notes.clone();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, second.id);
    assert_eq!(notes[0].number, 1);
    assert!(matches!(
        session.delete_note(0, first.id),
        Err(SessionError::InvalidRange(InvalidRangeError::NoteNotFound(_)))
    ));
}

#[test]
fn import_from_session_renames_collision() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(conn, id, &settings(10_000)).unwrap();
    session
        .apply_annotation(0, 0, &AnnotationInput::new(PartOfSpeech::Interjection))
        .unwrap();

    let document = session.export_project().unwrap();
    let json = serde_json::to_string(&document).unwrap();
    let outcome = session.import_project(&json).unwrap();

    assert_eq!(outcome.name, "Beowulf (1)");
    assert!(!outcome.migrated);
    assert_ne!(outcome.project_id, id);
}

#[test]
fn configure_backup_requires_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let mut conn = open_db(&path).unwrap();
    let project = SqliteProjectRepository::try_new(&mut conn)
        .unwrap()
        .create_project("Beowulf", TEXT)
        .unwrap();
    let conn = Arc::new(Mutex::new(conn));
    let app_settings = settings(10_000);

    let bare = EditingSession::open(Arc::clone(&conn), project.id, &app_settings).unwrap();
    assert!(matches!(
        bare.configure_backup(60, 3),
        Err(SessionError::BackupNotConfigured)
    ));
    drop(bare);

    let scheduler = Arc::new(Mutex::new(
        BackupScheduler::new(&path, &app_settings.backup).unwrap(),
    ));
    let session = EditingSession::open(conn, project.id, &app_settings)
        .unwrap()
        .with_backup(Arc::clone(&scheduler));
    session.configure_backup(60, 3).unwrap();
    assert!(matches!(
        session.configure_backup(60, 0),
        Err(SessionError::Backup(_))
    ));

    assert_eq!(scheduler.lock().retention(), 3);
}

#[test]
fn opening_unknown_project_fails() {
    let (conn, _) = seeded();
    let missing = ProjectId::new_v4();

    let err = match EditingSession::open(conn, missing, &settings(50)) {
        Ok(_) => panic!("unknown project opened"),
        Err(err) => err,
    };

    assert!(matches!(err, SessionError::ProjectNotFound(id) if id == missing));
}

#[test]
fn undo_and_redo_replay_annotation_and_note_edits() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(Arc::clone(&conn), id, &settings(10_000)).unwrap();
    let initial = session.project();

    session
        .apply_annotation(0, 2, &AnnotationInput::new(PartOfSpeech::Noun).set("case", "gen"))
        .unwrap();
    let note = session.add_note(0, 2, 4, "spear-Danes").unwrap();
    session.update_note_text(0, note.id, "Spear-Danes").unwrap();
    let edited = session.project();
    assert_eq!(
        session.undo_description().as_deref(),
        Some("update_note in sentence 0")
    );

    for _ in 0..3 {
        assert!(session.undo().unwrap());
    }
    assert!(!session.undo().unwrap());
    assert_eq!(session.project().sentences, initial.sentences);

    for _ in 0..3 {
        assert!(session.redo().unwrap());
    }
    assert!(!session.can_redo());
    assert_eq!(session.project().sentences, edited.sentences);

    session.undo().unwrap();
    session.close().unwrap();
    let persisted = stored(&conn, id);
    assert_eq!(persisted.sentences[0].notes[0].text, "spear-Danes");
}

#[test]
fn new_edit_after_undo_discards_redo() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(conn, id, &settings(10_000)).unwrap();

    session.update_translation(0, "Lo").unwrap();
    session.undo().unwrap();
    assert!(session.can_redo());

    session.clear_annotation(0, 0).unwrap();
    assert!(!session.can_redo());
    assert!(!session.redo().unwrap());
}

#[test]
fn rejected_mutations_are_not_recorded() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(conn, id, &settings(10_000)).unwrap();

    assert!(session.add_note(0, 4, 1, "backwards").is_err());
    assert!(session.merge_sentences(0).is_err());

    assert!(!session.can_undo());
}

#[test]
fn merge_sentences_is_undoable() {
    let (conn, id) = seeded_with("Hwæt we Gardena. In geardagum þeodcyninga. Þrym gefrunon.");
    let mut session = EditingSession::open(conn, id, &settings(10_000)).unwrap();
    session
        .apply_annotation(1, 1, &AnnotationInput::new(PartOfSpeech::Noun).set("case", "dat"))
        .unwrap();
    session.add_note(1, 0, 1, "in days of yore").unwrap();
    let before = session.project();

    session.merge_sentences(0).unwrap();

    let merged = session.project();
    assert_eq!(merged.sentences.len(), 2);
    assert_eq!(merged.sentences[0].tokens.len(), 6);
    assert_eq!(
        merged.sentences[0].tokens[4].annotation.pos(),
        Some(PartOfSpeech::Noun)
    );
    assert_eq!(
        (merged.sentences[0].notes[0].start, merged.sentences[0].notes[0].end),
        (3, 4)
    );
    assert_eq!(merged.sentences[1].position, 1);
    assert!(matches!(
        session.merge_sentences(1),
        Err(SessionError::SentenceNotFound(2))
    ));

    session.undo().unwrap();
    assert_eq!(session.project().sentences, before.sentences);
    session.redo().unwrap();
    assert_eq!(session.project().sentences, merged.sentences);
}

#[test]
fn history_respects_configured_limit() {
    let (conn, id) = seeded();
    let limited = Settings {
        undo_limit: 2,
        ..settings(10_000)
    };
    let mut session = EditingSession::open(conn, id, &limited).unwrap();

    for text in ["a", "b", "c"] {
        session.update_translation(0, text).unwrap();
    }
    assert!(session.undo().unwrap());
    assert!(session.undo().unwrap());
    assert!(!session.undo().unwrap());
    assert_eq!(session.project().sentences[0].translation, "a");
}

#[test]
fn queries_read_the_in_memory_project() {
    let (conn, id) = seeded();
    let mut session = EditingSession::open(conn, id, &settings(10_000)).unwrap();
    session
        .apply_annotation(0, 2, &AnnotationInput::new(PartOfSpeech::Noun).set("case", "gen"))
        .unwrap();

    let nouns = session.find_tokens(&TokenFilter {
        pos: PosFilter::Only(PartOfSpeech::Noun),
        incomplete: true,
        ..TokenFilter::default()
    });
    assert_eq!(nouns.len(), 1);
    assert_eq!(nouns[0].text, "Gardena");

    let stats = session.statistics();
    assert_eq!(stats.total_tokens, 8);
    assert_eq!(stats.annotated_tokens, 1);
    assert_eq!(stats.incomplete_count, 1);
}
